//! Tone-curve application to whole images.

use crate::tone_curve::ToneCurve;
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use rayon::ThreadPool;

pub fn apply_tone_curve(src: &GrayImage, curve: &ToneCurve) -> GrayImage {
    apply_tone_curve_in_pool(src, curve, None)
}

pub fn apply_tone_curve_in_pool(
    src: &GrayImage,
    curve: &ToneCurve,
    pool: Option<&ThreadPool>,
) -> GrayImage {
    let run = || {
        let mut output = src.clone();
        output.as_mut().par_iter_mut().for_each(|p| {
            *p = curve.map(*p);
        });
        output
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}

/// Applies one shared curve to all three channels.
pub fn apply_tone_curve_rgb(src: &RgbImage, curve: &ToneCurve) -> RgbImage {
    apply_tone_curve_rgb_in_pool(src, curve, None)
}

pub fn apply_tone_curve_rgb_in_pool(
    src: &RgbImage,
    curve: &ToneCurve,
    pool: Option<&ThreadPool>,
) -> RgbImage {
    let run = || {
        let mut output = src.clone();
        output.as_mut().par_iter_mut().for_each(|p| {
            *p = curve.map(*p);
        });
        output
    };

    if let Some(p) = pool {
        p.install(run)
    } else {
        run()
    }
}

/// Applies an independent curve per channel, ordered R, G, B.
pub fn apply_tone_curves_rgb(src: &RgbImage, curves: &[ToneCurve; 3]) -> RgbImage {
    apply_tone_curves_rgb_in_pool(src, curves, None)
}

pub fn apply_tone_curves_rgb_in_pool(
    src: &RgbImage,
    curves: &[ToneCurve; 3],
    pool: Option<&ThreadPool>,
) -> RgbImage {
    let run = || {
        let mut output = src.clone();
        output.as_mut().par_chunks_mut(3).for_each(|px| {
            px[0] = curves[0].map(px[0]);
            px[1] = curves[1].map(px[1]);
            px[2] = curves[2].map(px[2]);
        });
        output
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
    fn identity_curve_leaves_image_untouched() {
        let mut src = RgbImage::new(16, 16);
        for (i, p) in src.as_mut().iter_mut().enumerate() {
            *p = (i % 256) as u8;
        }
        let out = apply_tone_curve_rgb(&src, &ToneCurve::identity());
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn per_channel_curves_act_independently() {
        let src = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let curves = [
            ToneCurve::from_gain(1.5),
            ToneCurve::identity(),
            ToneCurve::from_gain(0.5),
        ];
        let out = apply_tone_curves_rgb(&src, &curves);
        let px = out.get_pixel(0, 0);
        assert!(px[0] > 100);
        assert_eq!(px[1], 100);
        assert!(px[2] < 100);
    }

    #[test]
    fn gray_application_matches_table() {
        let curve = ToneCurve::from_gain(0.8);
        let src = GrayImage::from_pixel(3, 3, image::Luma([200]));
        let out = apply_tone_curve(&src, &curve);
        assert_eq!(out.get_pixel(0, 0)[0], curve.map(200));
    }
}
