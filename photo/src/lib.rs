//! Photometric compensation for panorama stitching.
//!
//! Equalizes brightness, color, and tone across a set of overlapping,
//! already-warped camera views so that the stitched panorama shows no
//! visible seam from differing exposure, white balance, or vignette.
//!
//! # Components
//!
//! - [`overlap`]: pixel counts and masked intensity means for every
//!   image and every overlapping image pair
//! - [`gain`]: regularized weighted least-squares solve for per-image
//!   gains (mean-based, pixel-accurate, and per-channel variants)
//! - [`tone_curve`]: 256-entry lookup tables built from a gain via a
//!   clip-safe quadratic Bezier
//! - [`outlier`]: vote-based detection of persistently dark, bright, or
//!   color-shifted images, plus consistency grouping
//! - [`adjust`]: LUT application to whole images
//! - [`compensate`] / [`correct`]: the orchestrated correction policies
//!
//! # Example: uniform gain compensation
//!
//! ```no_run
//! use pano_photo::{compensate, GainParams};
//! # let images: Vec<image::RgbImage> = vec![];
//! # let masks: Vec<image::GrayImage> = vec![];
//! let corrected = compensate(&images, &masks, &GainParams::default());
//! ```

pub use pano_core::{Error, Result};

pub mod adjust;
pub mod blend;
pub mod compensate;
pub mod correct;
pub mod gain;
pub mod outlier;
pub mod overlap;
pub mod tone_curve;

pub use adjust::*;
pub use blend::*;
pub use compensate::*;
pub use correct::*;
pub use gain::*;
pub use outlier::*;
pub use overlap::*;
pub use tone_curve::*;
