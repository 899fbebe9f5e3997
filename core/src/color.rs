use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Converts an RGB image to its luma channel using the BT.601 weights
/// 0.299 R + 0.587 G + 0.114 B.
pub fn rgb_to_luma(rgb: &RgbImage) -> GrayImage {
    rgb_to_luma_in_pool(rgb, None)
}

pub fn rgb_to_luma_in_pool(rgb: &RgbImage, pool: Option<&ThreadPool>) -> GrayImage {
    let run = || {
        let (w, h) = rgb.dimensions();
        let count = (w * h) as usize;
        let mut gray_data = vec![0u8; count];
        let rgb_data = rgb.as_raw();

        gray_data
            .par_iter_mut()
            .zip(rgb_data.par_chunks(3))
            .for_each(|(g, px)| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                *g = (y + 0.5) as u8;
            });

        GrayImage::from_raw(w, h, gray_data).unwrap()
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luma_of_gray_pixel_is_itself() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let gray = rgb_to_luma(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 100);
        assert_eq!(gray.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn luma_weights_green_heaviest() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));
        let gray = rgb_to_luma(&img);
        let r = gray.get_pixel(0, 0)[0];
        let g = gray.get_pixel(1, 0)[0];
        let b = gray.get_pixel(2, 0)[0];
        assert!(g > r && r > b);
    }
}
