pub mod color;
pub mod mask;

pub use color::*;
pub use mask::*;

pub use image::{GrayImage, RgbImage};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Blend error: {0}")]
    Blend(String),
}

/// Checks that every image/mask pair shares one common size and that the
/// sets are parallel and non-empty. Violations are programming errors.
pub fn assert_same_size(images: &[RgbImage], masks: &[GrayImage]) {
    assert!(!images.is_empty(), "image set must not be empty");
    assert_eq!(
        images.len(),
        masks.len(),
        "image and mask sets must be parallel"
    );
    let (w, h) = images[0].dimensions();
    for (image, mask) in images.iter().zip(masks) {
        assert_eq!(image.dimensions(), (w, h), "images must share one size");
        assert_eq!(mask.dimensions(), (w, h), "masks must match image size");
    }
}

/// Non-panicking variant of [`assert_same_size`] for prepared-state APIs
/// that report shape mismatches to the caller instead of aborting.
pub fn check_same_size(images: &[RgbImage], masks: &[GrayImage]) -> Result<()> {
    if images.is_empty() {
        return Err(Error::InvalidInput("image set must not be empty".into()));
    }
    if images.len() != masks.len() {
        return Err(Error::DimensionMismatch(format!(
            "{} images but {} masks",
            images.len(),
            masks.len()
        )));
    }
    let (w, h) = images[0].dimensions();
    for (i, (image, mask)) in images.iter().zip(masks).enumerate() {
        if image.dimensions() != (w, h) || mask.dimensions() != (w, h) {
            return Err(Error::DimensionMismatch(format!(
                "entry {i} does not match {w}x{h}"
            )));
        }
    }
    Ok(())
}
