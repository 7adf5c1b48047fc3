//! Morphological cleanup of the rust mask.
//!
//! Opening (erode then dilate) removes isolated rust pixels and thin
//! spurs smaller than the neighborhood; closing (dilate then erode) then
//! fills small gaps inside rust regions. Both use the same square
//! neighborhood of odd side `kernel_size`.
//!
//! Erosion and dilation are delegated to [`imageproc::morphology`] with
//! the L-infinity norm, whose radius-`k` ball is exactly a
//! `(2k + 1) x (2k + 1)` square.
//!
//! This is step 4 in the pipeline, between mask union and measurement.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::mask::Mask;
use crate::types::PipelineError;

/// How neighbors outside the image are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderPolicy {
    /// Out-of-bounds neighbors are `false`. Opening therefore drops rust
    /// thinner than the kernel along the image edge, while closing keeps
    /// every rust pixel.
    #[default]
    Background,
    /// Out-of-bounds neighbors are skipped; only in-image pixels vote.
    Ignore,
}

impl std::fmt::Display for BorderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// Morphological filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MorphologyConfig {
    /// Side length of the square neighborhood. Must be odd.
    pub kernel_size: u32,
    /// Border handling for erosion and dilation.
    #[serde(default)]
    pub border: BorderPolicy,
}

impl MorphologyConfig {
    /// Default neighborhood side length.
    pub const DEFAULT_KERNEL_SIZE: u32 = 5;

    /// Largest supported side length (radius 254).
    ///
    /// `imageproc` stores distances as `u8` with 255 meaning "farther
    /// than representable", so the radius must stay below 255.
    pub const MAX_KERNEL_SIZE: u32 = 509;

    /// Settings with the given side length and the default border policy.
    #[must_use]
    pub const fn with_kernel_size(kernel_size: u32) -> Self {
        Self {
            kernel_size,
            border: BorderPolicy::Background,
        }
    }

    /// Check the kernel size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `kernel_size` is even,
    /// zero, or above [`Self::MAX_KERNEL_SIZE`].
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.kernel_size % 2 == 0 || self.kernel_size > Self::MAX_KERNEL_SIZE {
            return Err(PipelineError::InvalidConfig(format!(
                "morphology kernel size must be odd and within 1..={}, got {}",
                Self::MAX_KERNEL_SIZE,
                self.kernel_size,
            )));
        }
        Ok(())
    }

    /// Neighborhood radius (`kernel_size / 2`).
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    #[must_use]
    pub fn radius(&self) -> u8 {
        u8::try_from(self.kernel_size / 2).unwrap_or(u8::MAX)
    }
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self::with_kernel_size(Self::DEFAULT_KERNEL_SIZE)
    }
}

/// Erode: a cell stays `true` only if its whole neighborhood is `true`.
#[must_use = "returns the eroded mask"]
pub fn erode(mask: &Mask, radius: u8, border: BorderPolicy) -> Mask {
    let count = mask.count();
    if radius == 0 || count == 0 {
        return mask.clone();
    }
    match border {
        // With no background pixel at all, imageproc falls back to a
        // distance of `width + height`, which tiny images can undercut.
        BorderPolicy::Ignore if count == mask.pixel_count() => mask.clone(),
        BorderPolicy::Ignore => Mask::from_binary(imageproc::morphology::erode(
            mask.as_gray(),
            Norm::LInf,
            radius,
        )),
        BorderPolicy::Background => {
            // imageproc ignores out-of-bounds pixels, so surround the mask
            // with explicit background before eroding.
            let r = u32::from(radius);
            let padded = pad_with_background(mask.as_gray(), r);
            let eroded = imageproc::morphology::erode(&padded, Norm::LInf, radius);
            Mask::from_binary(
                image::imageops::crop_imm(&eroded, r, r, mask.width(), mask.height()).to_image(),
            )
        }
    }
}

/// Dilate: a cell becomes `true` if any cell in its neighborhood is `true`.
///
/// Out-of-bounds neighbors never contribute, so both border policies
/// give the same result.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &Mask, radius: u8) -> Mask {
    if radius == 0 || mask.count() == 0 {
        return mask.clone();
    }
    Mask::from_binary(imageproc::morphology::dilate(
        mask.as_gray(),
        Norm::LInf,
        radius,
    ))
}

/// Opening: erosion followed by dilation.
#[must_use = "returns the opened mask"]
pub fn open(mask: &Mask, config: &MorphologyConfig) -> Mask {
    let radius = config.radius();
    dilate(&erode(mask, radius, config.border), radius)
}

/// Closing: dilation followed by erosion.
///
/// Never clears a `true` pixel. Under [`BorderPolicy::Background`] the
/// mask is padded first, so the dilation can spill past the edge and the
/// erosion only pulls back what it added.
#[must_use = "returns the closed mask"]
pub fn close(mask: &Mask, config: &MorphologyConfig) -> Mask {
    let radius = config.radius();
    if radius == 0 || mask.count() == 0 {
        return mask.clone();
    }
    match config.border {
        BorderPolicy::Background => {
            let r = u32::from(radius);
            let padded = Mask::from_binary(pad_with_background(mask.as_gray(), r));
            let closed = erode(&dilate(&padded, radius), radius, BorderPolicy::Ignore);
            Mask::from_binary(
                image::imageops::crop_imm(closed.as_gray(), r, r, mask.width(), mask.height())
                    .to_image(),
            )
        }
        BorderPolicy::Ignore => erode(&dilate(mask, radius), radius, BorderPolicy::Ignore),
    }
}

/// Opening then closing: suppress noise, then fill small holes.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the kernel size is invalid.
pub fn clean(mask: &Mask, config: &MorphologyConfig) -> Result<Mask, PipelineError> {
    config.validate()?;
    Ok(close(&open(mask, config), config))
}

fn pad_with_background(image: &GrayImage, margin: u32) -> GrayImage {
    let mut padded = GrayImage::new(image.width() + 2 * margin, image.height() + 2 * margin);
    image::imageops::replace(&mut padded, image, i64::from(margin), i64::from(margin));
    padded
}
