//! Uniform gain compensation across a panorama.
//!
//! Estimates one multiplicative gain per image from the seam-band
//! overlaps, converts each gain to a clip-safe tone curve, and applies
//! it. The per-channel variant solves three independent gain systems
//! and corrects white balance along with exposure.

use crate::adjust::{apply_tone_curve_rgb, apply_tone_curves_rgb};
use crate::gain::{
    mean_matrices, rescale, solve_gains_accurate, solve_gains_accurate_rgb, solve_gains_from_means,
    GainParams,
};
use crate::tone_curve::ToneCurve;
use image::{GrayImage, RgbImage};
use pano_core::{
    assert_same_size, check_same_size, grow_mask, mask_and, mask_or_assign, rgb_to_luma, Error,
    Result,
};
use rayon::prelude::*;
use tracing::debug;

/// Radius by which raw masks are widened before intersecting, so gains
/// are estimated over the seam band rather than the thin geometric
/// overlap alone.
const SEAM_RADIUS: u32 = 100;

/// For each image, the union of its widened overlaps with every other
/// widened mask. Gains estimated over these regions reflect exactly the
/// pixels where a brightness mismatch would show in the final blend.
fn seam_band_masks(masks: &[GrayImage]) -> Vec<GrayImage> {
    let grown: Vec<GrayImage> = masks.par_iter().map(|m| grow_mask(m, SEAM_RADIUS)).collect();
    let n = grown.len();
    (0..n)
        .into_par_iter()
        .map(|i| {
            let (w, h) = grown[i].dimensions();
            let mut band = GrayImage::new(w, h);
            for j in 0..n {
                if j != i {
                    mask_or_assign(&mut band, &mask_and(&grown[i], &grown[j]));
                }
            }
            band
        })
        .collect()
}

fn log_gain_ranking(gains: &[f64]) {
    let mut ranking: Vec<(f64, usize)> = gains.iter().copied().zip(0..).collect();
    ranking.sort_by(|a, b| a.0.total_cmp(&b.0));
    debug!(?ranking, "gain ranking (low to high)");
}

/// Gain-compensates every image in place of its seam-band overlaps:
/// solves the pixel-accurate gain system, realizes each gain as a tone
/// curve, and returns the corrected images in input order.
pub fn compensate(images: &[RgbImage], masks: &[GrayImage], params: &GainParams) -> Vec<RgbImage> {
    assert_same_size(images, masks);
    let lumas: Vec<GrayImage> = images.par_iter().map(rgb_to_luma).collect();
    let bands = seam_band_masks(masks);

    let gains = solve_gains_accurate(&lumas, &bands, params);
    log_gain_ranking(&gains);

    images
        .par_iter()
        .zip(&gains)
        .map(|(image, &g)| apply_tone_curve_rgb(image, &ToneCurve::from_gain(g)))
        .collect()
}

/// Per-channel variant of [`compensate`]: three independent gain
/// systems, one tone curve per channel per image.
pub fn compensate_rgb(
    images: &[RgbImage],
    masks: &[GrayImage],
    params: &GainParams,
) -> Vec<RgbImage> {
    assert_same_size(images, masks);
    let bands = seam_band_masks(masks);

    let gains = solve_gains_accurate_rgb(images, &bands, params);
    for (i, triple) in gains.iter().enumerate() {
        debug!(image = i, gains = ?triple, "per-channel gains");
    }

    images
        .par_iter()
        .zip(&gains)
        .map(|(image, g)| {
            let curves = [
                ToneCurve::from_gain(g[0]),
                ToneCurve::from_gain(g[1]),
                ToneCurve::from_gain(g[2]),
            ];
            apply_tone_curves_rgb(image, &curves)
        })
        .collect()
}

/// Mean-based gain compensation split into a prepare step (statistics
/// and solve, done once) and an apply step (LUT application, repeatable
/// on restitched frames of the same layout).
#[derive(Debug, Clone)]
pub struct GainCompensator {
    gains: Vec<f64>,
    luts: Vec<ToneCurve>,
    reference: usize,
    width: u32,
    height: u32,
}

impl GainCompensator {
    /// Solves the mean-based gain system over the given layout and
    /// rescales so the brightest image is passed through unchanged.
    pub fn prepare(
        images: &[RgbImage],
        masks: &[GrayImage],
        params: &GainParams,
    ) -> Result<Self> {
        check_same_size(images, masks)?;
        let lumas: Vec<GrayImage> = images.par_iter().map(rgb_to_luma).collect();
        let (counts, means) = mean_matrices(&lumas, masks);
        let (mut gains, reference) = solve_gains_from_means(&counts, &means, params);
        rescale(&mut gains, reference);
        debug!(reference, ?gains, "prepared gain compensator");

        let luts = gains.iter().map(|&g| ToneCurve::from_gain(g)).collect();
        let (width, height) = images[0].dimensions();
        Ok(Self {
            gains,
            luts,
            reference,
            width,
            height,
        })
    }

    pub fn gains(&self) -> &[f64] {
        &self.gains
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    /// Applies the prepared curves. The image set must match the
    /// prepared layout in count and size; the reference image is cloned
    /// through untouched.
    pub fn apply(&self, images: &[RgbImage]) -> Result<Vec<RgbImage>> {
        if images.len() != self.gains.len() {
            return Err(Error::InvalidInput(format!(
                "prepared for {} images, got {}",
                self.gains.len(),
                images.len()
            )));
        }
        for (i, image) in images.iter().enumerate() {
            if image.dimensions() != (self.width, self.height) {
                return Err(Error::DimensionMismatch(format!(
                    "image {i} does not match prepared {}x{}",
                    self.width, self.height
                )));
            }
        }

        Ok(images
            .par_iter()
            .enumerate()
            .map(|(i, image)| {
                if i == self.reference {
                    image.clone()
                } else {
                    apply_tone_curve_rgb(image, &self.luts[i])
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use pano_core::masked_mean;

    fn flat(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    fn full(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    #[test]
    fn compensation_narrows_the_overlap_gap() {
        let images = vec![flat(40, 40, 100), flat(40, 40, 150)];
        let masks = vec![full(40, 40), full(40, 40)];
        let out = compensate(&images, &masks, &GainParams::default());

        let cover = full(40, 40);
        let m0 = masked_mean(&rgb_to_luma(&out[0]), &cover);
        let m1 = masked_mean(&rgb_to_luma(&out[1]), &cover);
        // The unit-gain prior and the clip-safe curve both hold some of
        // the original 50-level gap back; half is the contract.
        assert!((m0 - m1).abs() < 25.0, "means {m0} vs {m1}");
        assert!(m0 > 100.0, "dim image must brighten, mean {m0}");
        assert!(m1 < 150.0, "bright image must darken, mean {m1}");
    }

    #[test]
    fn prepared_compensator_keeps_reference_untouched() {
        let images = vec![flat(16, 16, 110), flat(16, 16, 180)];
        let masks = vec![full(16, 16), full(16, 16)];
        let comp = GainCompensator::prepare(&images, &masks, &GainParams::default()).unwrap();

        assert_eq!(comp.reference(), 1);
        assert!((comp.gains()[comp.reference()] - 1.0).abs() < 1e-12);

        let out = comp.apply(&images).unwrap();
        assert_eq!(out[1].as_raw(), images[1].as_raw());
    }

    #[test]
    fn apply_rejects_mismatched_layout() {
        let images = vec![flat(16, 16, 110), flat(16, 16, 180)];
        let masks = vec![full(16, 16), full(16, 16)];
        let comp = GainCompensator::prepare(&images, &masks, &GainParams::default()).unwrap();

        assert!(comp.apply(&images[..1]).is_err());
        let wrong = vec![flat(8, 8, 110), flat(8, 8, 180)];
        assert!(comp.apply(&wrong).is_err());
    }

    #[test]
    fn rgb_compensation_produces_same_count() {
        let images = vec![flat(24, 24, 100), flat(24, 24, 140)];
        let masks = vec![full(24, 24), full(24, 24)];
        let out = compensate_rgb(&images, &masks, &GainParams::default());
        assert_eq!(out.len(), 2);
    }
}
