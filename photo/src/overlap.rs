//! Overlap statistics collection.
//!
//! For every image and every overlapping image pair, computes pixel
//! counts and masked intensity means over three mask variants: the raw
//! geometric mask, a "core" mask excluding clipped samples, and a
//! widened "seam" mask covering the border band where stitching
//! artifacts are most visible.

use image::{GrayImage, RgbImage};
use pano_core::{
    assert_same_size, count_nonzero, grow_mask, mask_and, masked_mean, masked_mean_rgb,
    rgb_to_luma, values_in_range,
};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct StatsParams {
    /// Inclusive lower bound of the core-mask intensity window.
    pub core_lo: u8,
    /// Exclusive upper bound of the core-mask intensity window.
    pub core_hi: u8,
    /// Radius by which raw masks are grown into seam masks.
    pub seam_radius: u32,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            core_lo: 16,
            core_hi: 240,
            seam_radius: 100,
        }
    }
}

/// Per-image masks and means over each mask variant.
#[derive(Debug, Clone)]
pub struct ImageStats {
    pub index: usize,
    pub luma: GrayImage,
    pub full_mask: GrayImage,
    pub core_mask: GrayImage,
    pub seam_mask: GrayImage,
    pub full_mean: f64,
    pub core_mean: f64,
    pub seam_mean: f64,
}

/// Overlap statistics for one unordered image pair.
///
/// Mean fields hold `[mean of image i, mean of image j]` over the same
/// region; the two differ because the region is shared but the pixel
/// data is not. Records exist only for pairs whose raw masks actually
/// intersect — a zero-count record is never inserted.
#[derive(Debug, Clone)]
pub struct PairOverlap {
    pub i: usize,
    pub j: usize,
    pub full_count: usize,
    pub core_count: usize,
    pub seam_count: usize,
    pub full_mean: [f64; 2],
    pub core_mean: [f64; 2],
    pub seam_mean: [f64; 2],
    pub seam_mean_rgb: [[f64; 3]; 2],
}

impl PairOverlap {
    pub fn involves(&self, k: usize) -> bool {
        self.i == k || self.j == k
    }

    /// Seam-band luma means ordered as (this image, the neighbor).
    pub fn seam_means_for(&self, k: usize) -> (f64, f64) {
        if self.i == k {
            (self.seam_mean[0], self.seam_mean[1])
        } else {
            (self.seam_mean[1], self.seam_mean[0])
        }
    }

    /// Seam-band channel means ordered as (this image, the neighbor).
    pub fn seam_rgb_means_for(&self, k: usize) -> ([f64; 3], [f64; 3]) {
        if self.i == k {
            (self.seam_mean_rgb[0], self.seam_mean_rgb[1])
        } else {
            (self.seam_mean_rgb[1], self.seam_mean_rgb[0])
        }
    }
}

/// Computes per-image stats and a `PairOverlap` record for every pair
/// of images whose raw masks intersect. Pure; pair records are built in
/// parallel with per-pair storage.
pub fn collect_stats(
    images: &[RgbImage],
    masks: &[GrayImage],
    params: &StatsParams,
) -> (Vec<ImageStats>, Vec<PairOverlap>) {
    assert_same_size(images, masks);
    let n = images.len();

    let image_stats: Vec<ImageStats> = (0..n)
        .into_par_iter()
        .map(|i| {
            let luma = rgb_to_luma(&images[i]);
            let full_mask = masks[i].clone();
            let clip_free = values_in_range(&luma, params.core_lo, params.core_hi);
            let core_mask = mask_and(&full_mask, &clip_free);
            let seam_mask = grow_mask(&full_mask, params.seam_radius);
            let full_mean = masked_mean(&luma, &full_mask);
            let core_mean = masked_mean(&luma, &core_mask);
            let seam_mean = masked_mean(&luma, &seam_mask);
            ImageStats {
                index: i,
                luma,
                full_mask,
                core_mask,
                seam_mask,
                full_mean,
                core_mean,
                seam_mean,
            }
        })
        .collect();

    let pair_indexes: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect();

    let pairs: Vec<PairOverlap> = pair_indexes
        .par_iter()
        .filter_map(|&(i, j)| {
            let si = &image_stats[i];
            let sj = &image_stats[j];

            let full = mask_and(&si.full_mask, &sj.full_mask);
            let full_count = count_nonzero(&full);
            if full_count == 0 {
                return None;
            }

            let core = mask_and(&si.core_mask, &sj.core_mask);
            let seam = mask_and(&si.seam_mask, &sj.seam_mask);

            Some(PairOverlap {
                i,
                j,
                full_count,
                core_count: count_nonzero(&core),
                seam_count: count_nonzero(&seam),
                full_mean: [masked_mean(&si.luma, &full), masked_mean(&sj.luma, &full)],
                core_mean: [masked_mean(&si.luma, &core), masked_mean(&sj.luma, &core)],
                seam_mean: [masked_mean(&si.luma, &seam), masked_mean(&sj.luma, &seam)],
                seam_mean_rgb: [
                    masked_mean_rgb(&images[i], &seam),
                    masked_mean_rgb(&images[j], &seam),
                ],
            })
        })
        .collect();

    (image_stats, pairs)
}
