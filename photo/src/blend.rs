//! Reference-image blending.
//!
//! Exposure and tint correction need a composite reference built from
//! the trusted images; the blender seam is a trait so callers can plug
//! in their production compositor.

use image::{GrayImage, RgbImage};
use pano_core::{check_same_size, Result};
use rayon::prelude::*;

pub trait Blender {
    /// Composites the masked images into a single image covering the
    /// union of the masks.
    fn blend(&self, images: &[RgbImage], masks: &[GrayImage]) -> Result<RgbImage>;
}

/// Unweighted per-pixel average over every image whose mask covers the
/// pixel. Pixels covered by no mask stay black.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanBlender;

impl Blender for MeanBlender {
    fn blend(&self, images: &[RgbImage], masks: &[GrayImage]) -> Result<RgbImage> {
        check_same_size(images, masks)?;
        let (w, h) = images[0].dimensions();
        let count = (w * h) as usize;
        let mut out_data = vec![0u8; count * 3];

        out_data
            .par_chunks_mut(3)
            .enumerate()
            .for_each(|(idx, out_px)| {
                let mut sum = [0u32; 3];
                let mut cover = 0u32;
                for (img, mask) in images.iter().zip(masks) {
                    if mask.as_raw()[idx] == 0 {
                        continue;
                    }
                    let px = &img.as_raw()[idx * 3..idx * 3 + 3];
                    sum[0] += px[0] as u32;
                    sum[1] += px[1] as u32;
                    sum[2] += px[2] as u32;
                    cover += 1;
                }
                if cover > 0 {
                    out_px[0] = ((sum[0] + cover / 2) / cover) as u8;
                    out_px[1] = ((sum[1] + cover / 2) / cover) as u8;
                    out_px[2] = ((sum[2] + cover / 2) / cover) as u8;
                }
            });

        Ok(RgbImage::from_raw(w, h, out_data).unwrap())
    }
}
