//! Covered-area measurement.
//!
//! Counts rust cells in the final mask and reports them as a percentage of
//! the whole image. This is the primary output of the analysis.

use serde::{Deserialize, Serialize};

use crate::mask::Mask;
use crate::types::PipelineError;

/// Rust coverage of one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaMetric {
    /// Number of pixels classified as rust.
    pub rust_pixel_count: u64,
    /// Total number of pixels (`width * height`), never zero.
    pub total_pixel_count: u64,
    /// `100 * rust_pixel_count / total_pixel_count`, within `[0, 100]`.
    pub ratio_percent: f64,
}

impl AreaMetric {
    /// Build a metric from counts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DivisionUndefined`] if `total_pixel_count`
    /// is zero, and [`PipelineError::MalformedInput`] if `rust_pixel_count`
    /// exceeds it.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(rust_pixel_count: u64, total_pixel_count: u64) -> Result<Self, PipelineError> {
        if total_pixel_count == 0 {
            return Err(PipelineError::DivisionUndefined);
        }
        if rust_pixel_count > total_pixel_count {
            return Err(PipelineError::MalformedInput(format!(
                "rust pixel count {rust_pixel_count} exceeds total {total_pixel_count}",
            )));
        }
        let ratio_percent = 100.0 * rust_pixel_count as f64 / total_pixel_count as f64;
        Ok(Self {
            rust_pixel_count,
            total_pixel_count,
            ratio_percent,
        })
    }

    /// The ratio formatted with two decimals, e.g. `"12.34%"`.
    #[must_use]
    pub fn ratio_label(&self) -> String {
        format!("{:.2}%", self.ratio_percent)
    }
}

/// Measure the rust coverage of `mask`.
///
/// # Errors
///
/// Returns [`PipelineError::DivisionUndefined`] for a zero-area mask.
pub fn measure(mask: &Mask) -> Result<AreaMetric, PipelineError> {
    AreaMetric::from_counts(mask.count(), mask.pixel_count())
}
