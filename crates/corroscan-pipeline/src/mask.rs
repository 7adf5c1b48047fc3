//! Binary rust masks and mask union.
//!
//! A [`Mask`] marks each pixel as "rust" (`true`) or "not rust" (`false`).
//! Internally it is a binary [`GrayImage`] (0 / 255) so that it can be fed
//! straight into `imageproc` morphology, but the public API is boolean.
//!
//! [`union`] combines the per-range masks produced by the thresholder into
//! a single mask. This is step 3 in the pipeline, between thresholding and
//! morphological cleanup.

use image::{GrayImage, Luma};

use crate::types::{Dimensions, PipelineError};

/// Pixel value used for `true` cells in the underlying raster.
pub const MASK_ON: u8 = 255;

/// Pixel value used for `false` cells in the underlying raster.
pub const MASK_OFF: u8 = 0;

/// A per-pixel boolean classification grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Create an all-`false` mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Create a mask by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { MASK_ON } else { MASK_OFF }])
        }))
    }

    /// Binarize a grayscale image: any non-zero pixel becomes `true`.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            image.get_pixel(x, y).0[0] != MASK_OFF
        })
    }

    /// Wrap a raster that is already known to contain only
    /// [`MASK_ON`] / [`MASK_OFF`] values.
    pub(crate) const fn from_binary(image: GrayImage) -> Self {
        Self(image)
    }

    /// Borrow the underlying binary raster (0 / 255).
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the underlying binary raster.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Total number of cells (`width * height`).
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.dimensions().pixel_count()
    }

    /// Returns the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds, like [`GrayImage::get_pixel`].
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] != MASK_OFF
    }

    /// Sets the cell at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds, like [`GrayImage::put_pixel`].
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.0
            .put_pixel(x, y, Luma([if value { MASK_ON } else { MASK_OFF }]));
    }

    /// Number of `true` cells.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0
            .pixels()
            .map(|p| u64::from(p.0[0] != MASK_OFF))
            .sum()
    }

    /// Iterate over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.pixels().map(|p| p.0[0] != MASK_OFF)
    }

    /// Pairwise union (logical OR).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedInput`] if the dimensions differ.
    pub fn union(&self, other: &Self) -> Result<Self, PipelineError> {
        union(&[self.clone(), other.clone()])
    }

    /// Check that `other` has the same dimensions as `self`.
    pub(crate) fn ensure_same_dimensions(&self, other: Dimensions) -> Result<(), PipelineError> {
        let own = self.dimensions();
        if own == other {
            Ok(())
        } else {
            Err(PipelineError::MalformedInput(format!(
                "mask is {}x{} but expected {}x{}",
                own.width, own.height, other.width, other.height,
            )))
        }
    }
}

/// Union (logical OR) of one or more masks of identical dimensions.
///
/// The result is independent of input order. A single mask is returned
/// unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `masks` is empty.
/// Returns [`PipelineError::MalformedInput`] if the masks differ in size.
pub fn union(masks: &[Mask]) -> Result<Mask, PipelineError> {
    let (first, rest) = masks.split_first().ok_or_else(|| {
        PipelineError::InvalidConfig("mask union requires at least one mask".to_string())
    })?;

    let mut combined = first.0.clone();
    for mask in rest {
        mask.ensure_same_dimensions(first.dimensions())?;
        for (out, p) in combined.pixels_mut().zip(mask.0.pixels()) {
            out.0[0] |= p.0[0];
        }
    }
    Ok(Mask(combined))
}
