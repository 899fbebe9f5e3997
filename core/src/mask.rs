use image::GrayImage;
use rayon::prelude::*;

/// Intersection of two 0/255 masks.
pub fn mask_and(a: &GrayImage, b: &GrayImage) -> GrayImage {
    assert_eq!(a.dimensions(), b.dimensions(), "masks must share one size");
    let mut out = GrayImage::new(a.width(), a.height());
    out.as_mut()
        .par_iter_mut()
        .zip(a.as_raw().par_iter().zip(b.as_raw().par_iter()))
        .for_each(|(o, (&va, &vb))| {
            *o = if va != 0 && vb != 0 { 255 } else { 0 };
        });
    out
}

/// Union of two 0/255 masks.
pub fn mask_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    assert_eq!(a.dimensions(), b.dimensions(), "masks must share one size");
    let mut out = GrayImage::new(a.width(), a.height());
    out.as_mut()
        .par_iter_mut()
        .zip(a.as_raw().par_iter().zip(b.as_raw().par_iter()))
        .for_each(|(o, (&va, &vb))| {
            *o = if va != 0 || vb != 0 { 255 } else { 0 };
        });
    out
}

/// In-place union, used when folding many masks into one coverage mask.
pub fn mask_or_assign(acc: &mut GrayImage, m: &GrayImage) {
    assert_eq!(acc.dimensions(), m.dimensions(), "masks must share one size");
    acc.as_mut()
        .par_iter_mut()
        .zip(m.as_raw().par_iter())
        .for_each(|(a, &v)| {
            if v != 0 {
                *a = 255;
            }
        });
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().par_iter().filter(|&&v| v != 0).count()
}

/// Mean of the image over the non-zero pixels of `mask`; 0 for an empty mask.
pub fn masked_mean(image: &GrayImage, mask: &GrayImage) -> f64 {
    assert_eq!(
        image.dimensions(),
        mask.dimensions(),
        "mask must match image size"
    );
    let (sum, count) = image
        .as_raw()
        .iter()
        .zip(mask.as_raw())
        .filter(|&(_, &m)| m != 0)
        .fold((0u64, 0u64), |(s, c), (&v, _)| (s + v as u64, c + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Per-channel means of an RGB image over the non-zero pixels of `mask`.
pub fn masked_mean_rgb(image: &image::RgbImage, mask: &GrayImage) -> [f64; 3] {
    assert_eq!(
        image.dimensions(),
        mask.dimensions(),
        "mask must match image size"
    );
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for (px, &m) in image.as_raw().chunks_exact(3).zip(mask.as_raw()) {
        if m != 0 {
            sums[0] += px[0] as u64;
            sums[1] += px[1] as u64;
            sums[2] += px[2] as u64;
            count += 1;
        }
    }
    if count == 0 {
        [0.0; 3]
    } else {
        [
            sums[0] as f64 / count as f64,
            sums[1] as f64 / count as f64,
            sums[2] as f64 / count as f64,
        ]
    }
}

/// Mask of pixels whose value lies in `[lo_inc, hi_exc)`, used to exclude
/// clipped samples from photometric statistics.
pub fn values_in_range(image: &GrayImage, lo_inc: u8, hi_exc: u8) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    out.as_mut()
        .par_iter_mut()
        .zip(image.as_raw().par_iter())
        .for_each(|(o, &v)| {
            *o = if v >= lo_inc && v < hi_exc { 255 } else { 0 };
        });
    out
}

/// Grows a 0/255 mask outward by `radius` pixels (Chebyshev metric),
/// implemented as two separable 1-D distance sweeps.
pub fn grow_mask(mask: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = mask.dimensions();
    if radius == 0 {
        return mask.clone();
    }
    let pass1 = dilate_rows(mask.as_raw(), w as usize, h as usize, radius);
    let t = transpose(&pass1, w as usize, h as usize);
    let pass2 = dilate_rows(&t, h as usize, w as usize, radius);
    let out = transpose(&pass2, h as usize, w as usize);
    GrayImage::from_raw(w, h, out).unwrap()
}

fn dilate_rows(data: &[u8], width: usize, height: usize, radius: u32) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    out.par_chunks_mut(width)
        .zip(data.par_chunks(width))
        .for_each(|(out_row, row)| {
            let far = u32::MAX - 1;
            let mut dist = vec![far; width];
            let mut last = far;
            for (x, &v) in row.iter().enumerate() {
                last = if v != 0 { 0 } else { last.saturating_add(1) };
                dist[x] = last;
            }
            last = far;
            for (x, &v) in row.iter().enumerate().rev() {
                last = if v != 0 { 0 } else { last.saturating_add(1) };
                dist[x] = dist[x].min(last);
            }
            for (o, d) in out_row.iter_mut().zip(&dist) {
                *o = if *d <= radius { 255 } else { 0 };
            }
        });
    out
}

fn transpose(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn single_pixel_mask(w: u32, h: u32, x: u32, y: u32) -> GrayImage {
        let mut m = GrayImage::new(w, h);
        m.put_pixel(x, y, Luma([255]));
        m
    }

    #[test]
    fn and_or_count() {
        let a = single_pixel_mask(4, 4, 1, 1);
        let mut b = single_pixel_mask(4, 4, 1, 1);
        b.put_pixel(2, 2, Luma([255]));

        assert_eq!(count_nonzero(&mask_and(&a, &b)), 1);
        assert_eq!(count_nonzero(&mask_or(&a, &b)), 2);
    }

    #[test]
    fn masked_mean_ignores_unmasked_pixels() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([200]));
        let mask = single_pixel_mask(2, 1, 1, 0);
        assert_eq!(masked_mean(&img, &mask), 200.0);
    }

    #[test]
    fn masked_mean_of_empty_mask_is_zero() {
        let img = GrayImage::new(3, 3);
        let mask = GrayImage::new(3, 3);
        assert_eq!(masked_mean(&img, &mask), 0.0);
    }

    #[test]
    fn values_in_range_is_half_open() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(0, 0, Luma([15]));
        img.put_pixel(1, 0, Luma([16]));
        img.put_pixel(2, 0, Luma([239]));
        img.put_pixel(3, 0, Luma([240]));
        let m = values_in_range(&img, 16, 240);
        assert_eq!(m.as_raw(), &[0, 255, 255, 0]);
    }

    #[test]
    fn grow_mask_expands_by_radius() {
        let m = single_pixel_mask(9, 9, 4, 4);
        let grown = grow_mask(&m, 2);
        assert_eq!(grown.get_pixel(2, 2)[0], 255);
        assert_eq!(grown.get_pixel(6, 6)[0], 255);
        assert_eq!(grown.get_pixel(1, 4)[0], 0);
        assert_eq!(grown.get_pixel(4, 1)[0], 0);
        assert_eq!(count_nonzero(&grown), 25);
    }

    #[test]
    fn grow_mask_zero_radius_is_identity() {
        let m = single_pixel_mask(5, 5, 2, 2);
        let grown = grow_mask(&m, 0);
        assert_eq!(grown.as_raw(), m.as_raw());
    }
}
