//! HSV range thresholding.
//!
//! A [`ChannelRange`] is an inclusive window on each of the H, S and V
//! channels. [`in_range`] marks every pixel whose three channels all fall
//! inside their window.
//!
//! Hue is circular, but a single range is always a plain interval: a red
//! band straddling 179/0 is expressed as two ranges whose masks are
//! unioned afterwards. A range with `hue_min > hue_max` is rejected rather
//! than reinterpreted.

use serde::{Deserialize, Serialize};

use crate::hsv::{HUE_LIMIT, HsvImage};
use crate::mask::{MASK_OFF, MASK_ON, Mask};
use crate::types::PipelineError;

/// Inclusive per-channel bounds used to classify a pixel as rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRange {
    /// Lowest accepted hue (`0..=179`).
    pub hue_min: u8,
    /// Highest accepted hue (`0..=179`).
    pub hue_max: u8,
    /// Lowest accepted saturation.
    pub saturation_min: u8,
    /// Highest accepted saturation (usually 255).
    pub saturation_max: u8,
    /// Lowest accepted value (brightness).
    pub value_min: u8,
    /// Highest accepted value (usually 255).
    pub value_max: u8,
}

impl ChannelRange {
    /// Build a range from `(min, max)` pairs for hue, saturation and value.
    #[must_use]
    pub const fn new(hue: (u8, u8), saturation: (u8, u8), value: (u8, u8)) -> Self {
        Self {
            hue_min: hue.0,
            hue_max: hue.1,
            saturation_min: saturation.0,
            saturation_max: saturation.1,
            value_min: value.0,
            value_max: value.1,
        }
    }

    /// A hue window with saturation and value floors, both capped at 255.
    #[must_use]
    pub const fn with_floors(hue: (u8, u8), saturation_min: u8, value_min: u8) -> Self {
        Self::new(hue, (saturation_min, u8::MAX), (value_min, u8::MAX))
    }

    /// Split a possibly wrapping hue window into plain ranges.
    ///
    /// `hue_min <= hue_max` yields one range. `hue_min > hue_max` yields
    /// `[hue_min, 179]` and `[0, hue_max]`, sharing the saturation and
    /// value bounds. This is the explicit way to ask for wraparound.
    #[must_use]
    pub fn split_hue_wraparound(
        hue_min: u8,
        hue_max: u8,
        saturation: (u8, u8),
        value: (u8, u8),
    ) -> Vec<Self> {
        if hue_min <= hue_max {
            vec![Self::new((hue_min, hue_max), saturation, value)]
        } else {
            vec![
                Self::new((hue_min, HUE_LIMIT), saturation, value),
                Self::new((0, hue_max), saturation, value),
            ]
        }
    }

    /// Whether an `[h, s, v]` pixel lies inside all three bounds.
    #[must_use]
    pub const fn contains(&self, [h, s, v]: [u8; 3]) -> bool {
        h >= self.hue_min
            && h <= self.hue_max
            && s >= self.saturation_min
            && s <= self.saturation_max
            && v >= self.value_min
            && v <= self.value_max
    }

    /// Check the range before any pixel is processed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if any minimum exceeds its
    /// maximum (including a single wrapping hue window) or a hue bound
    /// is above 179.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.hue_max > HUE_LIMIT || self.hue_min > HUE_LIMIT {
            return Err(PipelineError::InvalidConfig(format!(
                "hue bounds must be within 0..={HUE_LIMIT}, got {}..={}",
                self.hue_min, self.hue_max,
            )));
        }
        if self.hue_min > self.hue_max {
            return Err(PipelineError::InvalidConfig(format!(
                "hue_min {} exceeds hue_max {}; split wrapping hue windows into two ranges",
                self.hue_min, self.hue_max,
            )));
        }
        if self.saturation_min > self.saturation_max {
            return Err(PipelineError::InvalidConfig(format!(
                "saturation_min {} exceeds saturation_max {}",
                self.saturation_min, self.saturation_max,
            )));
        }
        if self.value_min > self.value_max {
            return Err(PipelineError::InvalidConfig(format!(
                "value_min {} exceeds value_max {}",
                self.value_min, self.value_max,
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "H[{}-{}] S[{}-{}] V[{}-{}]",
            self.hue_min,
            self.hue_max,
            self.saturation_min,
            self.saturation_max,
            self.value_min,
            self.value_max,
        )
    }
}

/// Mark every pixel of `hsv` that lies inside `range`.
///
/// Callers are expected to have validated `range`; an unvalidated range
/// with `min > max` simply matches nothing on that channel.
#[must_use = "returns the threshold mask"]
pub fn in_range(hsv: &HsvImage, range: &ChannelRange) -> Mask {
    let (width, height) = (hsv.width(), hsv.height());
    let mut out = image::GrayImage::new(width, height);

    crate::rows::zip_rows(
        &mut out,
        width as usize,
        hsv.as_raw(),
        width as usize * 3,
        |dst, src| {
            for (d, p) in dst.iter_mut().zip(src.chunks_exact(3)) {
                *d = if range.contains([p[0], p[1], p[2]]) {
                    MASK_ON
                } else {
                    MASK_OFF
                };
            }
        },
    );

    Mask::from_binary(out)
}

/// Validate every range, then threshold `hsv` once per range.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `ranges` is empty or any
/// range is invalid. No pixel is processed in that case.
pub fn in_ranges(hsv: &HsvImage, ranges: &[ChannelRange]) -> Result<Vec<Mask>, PipelineError> {
    if ranges.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one channel range is required".to_string(),
        ));
    }
    for range in ranges {
        range.validate()?;
    }
    Ok(ranges.iter().map(|r| in_range(hsv, r)).collect())
}
