//! Outlier exposure and tint correction.
//!
//! Unlike uniform gain compensation, which nudges every image, these
//! policies leave the consistent majority untouched: they detect the
//! few images that disagree with their neighbors, build a blended
//! reference from the trusted set, and regress a tone curve that maps
//! each outlier onto that reference.

use crate::adjust::{apply_tone_curve_rgb, apply_tone_curves_rgb};
use crate::blend::Blender;
use crate::outlier::{pick_almost_small, pick_almost_small_rgb, pick_color_inconsistent, OutlierParams};
use crate::overlap::{collect_stats, StatsParams};
use crate::tone_curve::{fit_slope_through_origin, ToneCurve};
use image::{GrayImage, RgbImage};
use pano_core::{mask_or_assign, rgb_to_luma, Error, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

/// Reference samples darker than this are dominated by noise and black
/// borders; brighter ones are at risk of clipping. Both bounds are
/// exclusive.
const REF_LO: u8 = 15;
const REF_HI: u8 = 240;

const MIN_SAMPLES: usize = 3;

/// Regresses the curve mapping `luma` onto `base` over the pixels both
/// masks cover, keeping only samples whose reference value lies
/// strictly inside the usable window. Returns the identity curve when
/// the overlap yields too few usable samples or a degenerate slope.
pub fn calc_transform(
    luma: &GrayImage,
    mask: &GrayImage,
    base: &GrayImage,
    base_mask: &GrayImage,
) -> ToneCurve {
    let points: Vec<(f64, f64)> = luma
        .as_raw()
        .iter()
        .zip(mask.as_raw())
        .zip(base.as_raw().iter().zip(base_mask.as_raw()))
        .filter_map(|((&v, &m), (&bv, &bm))| {
            if m != 0 && bm != 0 && bv > REF_LO && bv < REF_HI {
                Some((v as f64, bv as f64))
            } else {
                None
            }
        })
        .collect();

    if points.len() < MIN_SAMPLES {
        warn!(samples = points.len(), "too few reference samples, keeping identity");
        return ToneCurve::identity();
    }
    let slope = fit_slope_through_origin(&points);
    debug!(samples = points.len(), slope, "fitted correction slope");
    if slope <= 0.0 {
        return ToneCurve::identity();
    }
    ToneCurve::from_gain(slope)
}

/// Per-channel variant of [`calc_transform`]; each channel's samples
/// are windowed on the reference value of that same channel.
pub fn calc_transform_rgb(
    image: &RgbImage,
    mask: &GrayImage,
    base: &RgbImage,
    base_mask: &GrayImage,
) -> [ToneCurve; 3] {
    let mut points: [Vec<(f64, f64)>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for ((px, &m), (bpx, &bm)) in image
        .as_raw()
        .chunks_exact(3)
        .zip(mask.as_raw())
        .zip(base.as_raw().chunks_exact(3).zip(base_mask.as_raw()))
    {
        if m == 0 || bm == 0 {
            continue;
        }
        for c in 0..3 {
            if bpx[c] > REF_LO && bpx[c] < REF_HI {
                points[c].push((px[c] as f64, bpx[c] as f64));
            }
        }
    }

    points.map(|pts| {
        if pts.len() < MIN_SAMPLES {
            return ToneCurve::identity();
        }
        let slope = fit_slope_through_origin(&pts);
        if slope <= 0.0 {
            ToneCurve::identity()
        } else {
            ToneCurve::from_gain(slope)
        }
    })
}

/// Correction plan from an outlier-detection pass: one curve per image
/// (identity for trusted images) and the outlier flags.
#[derive(Debug, Clone)]
pub struct ExposureCorrection {
    pub curves: Vec<ToneCurve>,
    pub flagged: Vec<bool>,
}

impl ExposureCorrection {
    pub fn apply(&self, images: &[RgbImage]) -> Vec<RgbImage> {
        images
            .par_iter()
            .zip(&self.curves)
            .map(|(image, curve)| {
                if curve.is_identity() {
                    image.clone()
                } else {
                    apply_tone_curve_rgb(image, curve)
                }
            })
            .collect()
    }
}

/// Like [`ExposureCorrection`] but with independent per-channel curves,
/// produced by the tint-aware policies.
#[derive(Debug, Clone)]
pub struct TintCorrection {
    pub curves: Vec<[ToneCurve; 3]>,
    pub flagged: Vec<bool>,
}

impl TintCorrection {
    pub fn apply(&self, images: &[RgbImage]) -> Vec<RgbImage> {
        images
            .par_iter()
            .zip(&self.curves)
            .map(|(image, curves)| {
                if curves.iter().all(ToneCurve::is_identity) {
                    image.clone()
                } else {
                    apply_tone_curves_rgb(image, curves)
                }
            })
            .collect()
    }
}

fn flags_from(indexes: &[usize], n: usize) -> Vec<bool> {
    let mut flagged = vec![false; n];
    for &i in indexes {
        flagged[i] = true;
    }
    flagged
}

/// Detects persistently dark images and plans a luma regression of each
/// onto a blend of the trusted rest.
///
/// Errors if every image is flagged: with no trusted image there is
/// nothing to regress against.
pub fn exposure_correct(
    images: &[RgbImage],
    masks: &[GrayImage],
    blender: &dyn Blender,
    params: &OutlierParams,
) -> Result<ExposureCorrection> {
    let n = images.len();
    let (stats, pairs) = collect_stats(images, masks, &StatsParams::default());
    let outliers = pick_almost_small(&pairs, params.luma_thresh);
    debug!(?outliers, "exposure outliers");

    let flagged = flags_from(&outliers, n);
    if outliers.is_empty() {
        return Ok(ExposureCorrection {
            curves: vec![ToneCurve::identity(); n],
            flagged,
        });
    }
    if outliers.len() == n {
        return Err(Error::InvalidInput(
            "every image flagged as outlier, no trusted reference".into(),
        ));
    }

    let (base, base_mask) = blend_trusted(images, &stats, &flagged, blender)?;
    let base_luma = rgb_to_luma(&base);

    let curves = (0..n)
        .map(|i| {
            if flagged[i] {
                calc_transform(&stats[i].luma, &stats[i].full_mask, &base_luma, &base_mask)
            } else {
                ToneCurve::identity()
            }
        })
        .collect();
    Ok(ExposureCorrection { curves, flagged })
}

/// Per-channel exposure correction: outliers are detected with
/// per-channel votes and regressed channel by channel, so a single
/// shifted channel is corrected without disturbing the others.
pub fn exposure_correct_rgb(
    images: &[RgbImage],
    masks: &[GrayImage],
    blender: &dyn Blender,
    params: &OutlierParams,
) -> Result<TintCorrection> {
    let (stats, pairs) = collect_stats(images, masks, &StatsParams::default());
    let outliers = pick_almost_small_rgb(&pairs, params.luma_thresh);
    debug!(?outliers, "per-channel exposure outliers");
    plan_rgb_correction(images, &stats, &outliers, blender)
}

/// Detects white-balance outliers by seam chroma ratios and plans a
/// per-channel regression of each onto a blend of the trusted rest.
pub fn tint_correct(
    images: &[RgbImage],
    masks: &[GrayImage],
    blender: &dyn Blender,
    params: &OutlierParams,
) -> Result<TintCorrection> {
    let (stats, pairs) = collect_stats(images, masks, &StatsParams::default());
    let outliers = pick_color_inconsistent(&pairs, params.color_ratio_thresh);
    debug!(?outliers, "tint outliers");
    plan_rgb_correction(images, &stats, &outliers, blender)
}

fn plan_rgb_correction(
    images: &[RgbImage],
    stats: &[crate::overlap::ImageStats],
    outliers: &[usize],
    blender: &dyn Blender,
) -> Result<TintCorrection> {
    let n = images.len();
    let flagged = flags_from(outliers, n);
    let identity = || [ToneCurve::identity(), ToneCurve::identity(), ToneCurve::identity()];

    if outliers.is_empty() {
        return Ok(TintCorrection {
            curves: (0..n).map(|_| identity()).collect(),
            flagged,
        });
    }
    if outliers.len() == n {
        return Err(Error::InvalidInput(
            "every image flagged as outlier, no trusted reference".into(),
        ));
    }

    let (base, base_mask) = blend_trusted(images, stats, &flagged, blender)?;

    let curves = (0..n)
        .map(|i| {
            if flagged[i] {
                calc_transform_rgb(&images[i], &stats[i].full_mask, &base, &base_mask)
            } else {
                identity()
            }
        })
        .collect();
    Ok(TintCorrection { curves, flagged })
}

/// Blends the unflagged images into the reference, paired with the
/// union of their raw masks. Regressions must sample valid pixels
/// only; outside the masks the warp leaves residue that would skew
/// the fitted slope.
fn blend_trusted(
    images: &[RgbImage],
    stats: &[crate::overlap::ImageStats],
    flagged: &[bool],
    blender: &dyn Blender,
) -> Result<(RgbImage, GrayImage)> {
    let trusted_images: Vec<RgbImage> = images
        .iter()
        .zip(flagged)
        .filter(|(_, &f)| !f)
        .map(|(img, _)| img.clone())
        .collect();
    let trusted_masks: Vec<GrayImage> = stats
        .iter()
        .zip(flagged)
        .filter(|(_, &f)| !f)
        .map(|(s, _)| s.full_mask.clone())
        .collect();
    let base = blender.blend(&trusted_images, &trusted_masks)?;

    let (w, h) = images[0].dimensions();
    let mut base_mask = GrayImage::new(w, h);
    for (s, &f) in stats.iter().zip(flagged) {
        if !f {
            mask_or_assign(&mut base_mask, &s.full_mask);
        }
    }
    Ok((base, base_mask))
}
