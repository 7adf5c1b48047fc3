//! Pipeline diagnostics: timing, counts, and coverage for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning and kernel-size experiments. The core stays sans-IO:
//! time is read through the [`Clock`] trait, which the caller supplies
//! (the CLI uses `std::time::Instant`; tests use a fake clock).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{ColorModel, PipelineConfig, PipelineError, StagedResult};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// The filter stage is `None` when morphology is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: RGB to HSV conversion.
    pub convert: StageDiagnostics,
    /// Stage 3: per-range thresholding.
    pub threshold: StageDiagnostics,
    /// Stage 4: mask union.
    pub combine: StageDiagnostics,
    /// Stage 5: opening and closing (only when morphology is enabled).
    pub filter: Option<StageDiagnostics>,
    /// Stage 6: coverage measurement.
    pub measure: StageDiagnostics,
    /// Stage 7: overlay rendering.
    pub render: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes (`0` for pre-decoded input).
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Color-space conversion metrics.
    Convert {
        /// Output color model.
        model: ColorModel,
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Thresholding metrics.
    Threshold {
        /// Each range, formatted as `H[a-b] S[c-d] V[e-f]`.
        ranges: Vec<String>,
        /// Matched pixels per range, in the same order.
        matched_pixels: Vec<u64>,
    },
    /// Mask union metrics.
    Combine {
        /// Number of masks combined.
        input_masks: usize,
        /// Rust pixels in the union.
        rust_pixel_count: u64,
        /// Union coverage in percent.
        coverage_percent: f64,
    },
    /// Morphology metrics.
    Filter {
        /// Neighborhood side length.
        kernel_size: u32,
        /// Border policy name.
        border: String,
        /// Rust pixels before filtering.
        pixels_before: u64,
        /// Rust pixels after filtering.
        pixels_after: u64,
        /// Coverage before filtering, in percent.
        coverage_before: f64,
        /// Coverage after filtering, in percent.
        coverage_after: f64,
    },
    /// Measurement metrics.
    Measure {
        /// Rust pixels in the final mask.
        rust_pixel_count: u64,
        /// Total pixels.
        total_pixel_count: u64,
        /// Final coverage in percent.
        ratio_percent: f64,
    },
    /// Overlay metrics.
    Render {
        /// Pixels painted with the highlight color.
        highlighted_pixels: u64,
        /// Burned-in label text, if any.
        label: Option<String>,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of configured ranges.
    pub range_count: usize,
    /// Rust pixels in the final mask.
    pub rust_pixel_count: u64,
    /// Final coverage in percent.
    pub ratio_percent: f64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages: Vec<(&str, &StageDiagnostics)> = vec![
            ("Decode", &self.decode),
            ("Convert", &self.convert),
            ("Threshold", &self.threshold),
            ("Combine", &self.combine),
        ];
        if let Some(ref f) = self.filter {
            stages.push(("Filter", f));
        }
        stages.push(("Measure", &self.measure));
        stages.push(("Render", &self.render));

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Ranges: {}  |  Rust pixels: {}  |  Coverage: {:.2}%",
            self.summary.range_count, self.summary.rust_pixel_count, self.summary.ratio_percent,
        ));

        lines.join("\n")
    }
}

/// Run the whole pipeline on `image_bytes`, timing every stage with
/// `clock`.
///
/// # Errors
///
/// Returns any [`PipelineError`] the pipeline stages produce.
#[tracing::instrument(skip_all, fields(bytes = image_bytes.len()))]
pub fn process_staged_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let pipeline_start = clock.now();

    let start = clock.now();
    let decoded = Pipeline::new(image_bytes.to_vec(), config.clone()).decode()?;
    let decode = timed(clock, &start, decoded.stage_metrics());

    let start = clock.now();
    let converted = decoded.convert();
    let convert = timed(clock, &start, converted.stage_metrics());

    let start = clock.now();
    let thresholded = converted.threshold()?;
    let threshold = timed(clock, &start, thresholded.stage_metrics());

    let start = clock.now();
    let combined = thresholded.combine()?;
    let combine = timed(clock, &start, combined.stage_metrics());

    let start = clock.now();
    let filtered = combined.filter()?;
    let filter_duration = clock.elapsed(&start);
    let filter = filtered.metrics().map(|metrics| StageDiagnostics {
        duration: filter_duration,
        metrics,
    });

    let start = clock.now();
    let measured = filtered.measure()?;
    let measure = timed(clock, &start, measured.stage_metrics());

    let start = clock.now();
    let rendered = measured.render()?;
    let render = timed(clock, &start, rendered.stage_metrics());

    let total_duration = clock.elapsed(&pipeline_start);
    let staged = rendered.into_result();

    let summary = PipelineSummary {
        image_width: staged.dimensions.width,
        image_height: staged.dimensions.height,
        pixel_count: staged.dimensions.pixel_count(),
        range_count: staged.range_masks.len(),
        rust_pixel_count: staged.metric.rust_pixel_count,
        ratio_percent: staged.metric.ratio_percent,
    };
    tracing::info!(
        ratio = %staged.metric.ratio_label(),
        total_ms = duration_ms(total_duration),
        "analysis complete",
    );

    Ok((
        staged,
        PipelineDiagnostics {
            decode,
            convert,
            threshold,
            combine,
            filter,
            measure,
            render,
            total_duration,
            summary,
        },
    ))
}

/// Close a stage's timing window and pair it with the stage's metrics.
fn timed<C: Clock>(clock: &C, start: &C::Instant, metrics: StageMetrics) -> StageDiagnostics {
    StageDiagnostics {
        duration: clock.elapsed(start),
        metrics,
    }
}

/// `100 * part / total`, or `0.0` for an empty image.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn coverage_percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Convert {
            model,
            width,
            height,
        } => format!("{width}x{height} -> {model}"),
        StageMetrics::Threshold {
            ranges,
            matched_pixels,
        } => ranges
            .iter()
            .zip(matched_pixels)
            .map(|(range, matched)| format!("{range}: {matched}"))
            .collect::<Vec<_>>()
            .join(", "),
        StageMetrics::Combine {
            input_masks,
            rust_pixel_count,
            coverage_percent,
        } => format!("{input_masks} masks -> {rust_pixel_count} px ({coverage_percent:.2}%)"),
        StageMetrics::Filter {
            kernel_size,
            border,
            pixels_before,
            pixels_after,
            coverage_before,
            coverage_after,
        } => format!(
            "k={kernel_size} border={border} {pixels_before}->{pixels_after} px ({coverage_before:.2}% -> {coverage_after:.2}%)",
        ),
        StageMetrics::Measure {
            rust_pixel_count,
            total_pixel_count,
            ratio_percent,
        } => format!("{rust_pixel_count}/{total_pixel_count} px = {ratio_percent:.2}%"),
        StageMetrics::Render {
            highlighted_pixels,
            label,
        } => match label {
            Some(text) => format!("{highlighted_pixels} px highlighted, label {text:?}"),
            None => format!("{highlighted_pixels} px highlighted, no label"),
        },
    }
}
