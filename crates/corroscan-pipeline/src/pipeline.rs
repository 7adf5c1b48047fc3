//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire analysis in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use corroscan_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::new(png, config)
//!     .decode()?
//!     .convert()
//!     .threshold()?
//!     .combine()?
//!     .filter()?
//!     .measure()?
//!     .render()?;
//!
//! println!("{}", pipeline.metric().ratio_label());
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The caller can inspect the current stage's output via
//! accessor methods at any point.
//!
//! The configuration is validated once, when the pipeline leaves
//! [`Pending`] (or is entered through [`Pipeline::from_image`]), so no
//! pixel is touched under an invalid configuration.
//!
//! # Memory
//!
//! Every stage keeps the original RGB image, the HSV image and all masks
//! produced so far. For a 4000x3000 photograph that is roughly 72 MB
//! plus 12 MB per mask. Callers that only need the ratio and overlay
//! should prefer [`crate::analyze`], which returns just the final mask.

use crate::area::AreaMetric;
use crate::diagnostics::{StageMetrics, coverage_percent};
use crate::hsv::HsvImage;
use crate::mask::Mask;
use crate::types::{Dimensions, PipelineConfig, PipelineError, RgbImage, StagedResult};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and config are stored but not yet touched.
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// The configuration this pipeline will run with.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the configuration, decode the source image and advance
    /// to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// invalid (checked before the bytes are looked at).
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let source_len = self.source.len();
        let original = crate::decode::decode_rgb(&self.source)?;
        tracing::debug!(
            stage = "decode",
            bytes = source_len,
            width = original.width(),
            height = original.height(),
        );
        Ok(Decoded::new(self.config, original, source_len))
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
///
/// Call [`convert`](Self::convert) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .convert() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    original: RgbImage,
    source_len: usize,
    dimensions: Dimensions,
}

impl Decoded {
    fn new(config: PipelineConfig, original: RgbImage, source_len: usize) -> Self {
        let dimensions = Dimensions {
            width: original.width(),
            height: original.height(),
        };
        Self {
            config,
            original,
            source_len,
            dimensions,
        }
    }

    /// The original decoded RGB image.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Advance to the color-space conversion stage.
    pub fn convert(self) -> Converted {
        let hsv = crate::hsv::rgb_to_hsv(&self.original);
        tracing::debug!(stage = "convert", model = %HsvImage::MODEL);
        Converted {
            config: self.config,
            original: self.original,
            hsv,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Converted ────────────────────────

/// Pipeline state after RGB to HSV conversion.
///
/// Call [`threshold`](Self::threshold) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .threshold() to continue"]
pub struct Converted {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    dimensions: Dimensions,
}

impl Converted {
    /// The HSV image.
    #[must_use]
    pub const fn hsv(&self) -> &HsvImage {
        &self.hsv
    }

    /// Advance to the thresholding stage: one mask per configured range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the range list is
    /// empty or a range is invalid. Unreachable for a pipeline that
    /// passed validation on entry.
    pub fn threshold(self) -> Result<Thresholded, PipelineError> {
        let range_masks = crate::threshold::in_ranges(&self.hsv, &self.config.ranges)?;
        tracing::debug!(
            stage = "threshold",
            ranges = range_masks.len(),
            matched = ?range_masks.iter().map(Mask::count).collect::<Vec<_>>(),
        );
        Ok(Thresholded {
            config: self.config,
            original: self.original,
            hsv: self.hsv,
            range_masks,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 3: Thresholded ──────────────────────

/// Pipeline state after per-range thresholding.
///
/// Call [`combine`](Self::combine) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .combine() to continue"]
pub struct Thresholded {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    range_masks: Vec<Mask>,
    dimensions: Dimensions,
}

impl Thresholded {
    /// One mask per configured range, in configuration order.
    #[must_use]
    pub fn range_masks(&self) -> &[Mask] {
        &self.range_masks
    }

    /// Advance to the mask union stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if there are no masks or
    /// [`PipelineError::MalformedInput`] if their dimensions differ.
    /// Neither happens for masks produced by [`Converted::threshold`].
    pub fn combine(self) -> Result<Combined, PipelineError> {
        let combined = crate::mask::union(&self.range_masks)?;
        tracing::debug!(stage = "combine", rust_pixels = combined.count());
        Ok(Combined {
            config: self.config,
            original: self.original,
            hsv: self.hsv,
            range_masks: self.range_masks,
            combined,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 4: Combined ─────────────────────────

/// Pipeline state after the union of all range masks.
///
/// Call [`filter`](Self::filter) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .filter() to continue"]
pub struct Combined {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    range_masks: Vec<Mask>,
    combined: Mask,
    dimensions: Dimensions,
}

impl Combined {
    /// The combined (unfiltered) rust mask.
    #[must_use]
    pub const fn combined(&self) -> &Mask {
        &self.combined
    }

    /// Advance to the morphology stage.
    ///
    /// When `config.morphology` is `None`, this is a pass-through and
    /// [`Filtered::filtered`] returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid kernel
    /// size. Unreachable for a pipeline that passed validation on entry.
    pub fn filter(self) -> Result<Filtered, PipelineError> {
        let filtered = self
            .config
            .morphology
            .as_ref()
            .map(|morphology| crate::morphology::clean(&self.combined, morphology))
            .transpose()?;
        if let Some(mask) = &filtered {
            tracing::debug!(
                stage = "filter",
                before = self.combined.count(),
                after = mask.count(),
            );
        } else {
            tracing::debug!(stage = "filter", "morphology disabled");
        }
        Ok(Filtered {
            config: self.config,
            original: self.original,
            hsv: self.hsv,
            range_masks: self.range_masks,
            combined: self.combined,
            filtered,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 5: Filtered ─────────────────────────

/// Pipeline state after optional morphological cleanup.
///
/// Call [`measure`](Self::measure) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .measure() to continue"]
pub struct Filtered {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    range_masks: Vec<Mask>,
    combined: Mask,
    filtered: Option<Mask>,
    dimensions: Dimensions,
}

impl Filtered {
    /// The cleaned mask, or `None` if morphology was disabled.
    #[must_use]
    pub const fn filtered(&self) -> Option<&Mask> {
        self.filtered.as_ref()
    }

    /// The mask the next stages consume.
    #[must_use]
    pub fn final_mask(&self) -> &Mask {
        self.filtered.as_ref().unwrap_or(&self.combined)
    }

    /// Advance to the measurement stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DivisionUndefined`] if the image has no
    /// pixels.
    pub fn measure(self) -> Result<Measured, PipelineError> {
        let metric = crate::area::measure(self.final_mask())?;
        tracing::debug!(
            stage = "measure",
            rust_pixels = metric.rust_pixel_count,
            total_pixels = metric.total_pixel_count,
            ratio = %metric.ratio_label(),
        );
        Ok(Measured {
            config: self.config,
            original: self.original,
            hsv: self.hsv,
            range_masks: self.range_masks,
            combined: self.combined,
            filtered: self.filtered,
            metric,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 6: Measured ─────────────────────────

/// Pipeline state after measuring the rust coverage.
///
/// Call [`render`](Self::render) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .render() to continue"]
pub struct Measured {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    range_masks: Vec<Mask>,
    combined: Mask,
    filtered: Option<Mask>,
    metric: AreaMetric,
    dimensions: Dimensions,
}

impl Measured {
    /// The rust coverage.
    #[must_use]
    pub const fn metric(&self) -> &AreaMetric {
        &self.metric
    }

    /// Advance to the overlay stage, the final pipeline step.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid label
    /// style. Unreachable for a pipeline that passed validation on entry.
    pub fn render(self) -> Result<Rendered, PipelineError> {
        let mask = self.filtered.as_ref().unwrap_or(&self.combined);
        let overlay = crate::overlay::render_with_label(
            &self.original,
            mask,
            &self.config.overlay,
            &self.metric,
        )?;
        tracing::debug!(stage = "render", labelled = self.config.overlay.label.is_some());
        Ok(Rendered {
            config: self.config,
            original: self.original,
            hsv: self.hsv,
            range_masks: self.range_masks,
            combined: self.combined,
            filtered: self.filtered,
            metric: self.metric,
            overlay,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 7: Rendered ─────────────────────────

/// Pipeline state after rendering the overlay, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Rendered {
    config: PipelineConfig,
    original: RgbImage,
    hsv: HsvImage,
    range_masks: Vec<Mask>,
    combined: Mask,
    filtered: Option<Mask>,
    metric: AreaMetric,
    overlay: RgbImage,
    dimensions: Dimensions,
}

impl Rendered {
    /// The overlay image.
    #[must_use]
    pub const fn overlay(&self) -> &RgbImage {
        &self.overlay
    }

    /// The rust coverage.
    #[must_use]
    pub const fn metric(&self) -> &AreaMetric {
        &self.metric
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            hsv: self.hsv,
            range_masks: self.range_masks,
            combined: self.combined,
            filtered: self.filtered,
            metric: self.metric,
            overlay: self.overlay,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 8;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded RGB image.
    Decoded {
        /// The original image.
        original: &'a RgbImage,
    },
    /// HSV conversion result.
    Converted {
        /// The HSV image.
        hsv: &'a HsvImage,
    },
    /// Per-range threshold masks.
    Thresholded {
        /// One mask per range.
        range_masks: &'a [Mask],
    },
    /// Union of the range masks.
    Combined {
        /// The combined mask.
        combined: &'a Mask,
    },
    /// Morphology result.
    Filtered {
        /// The cleaned mask, or `None` if morphology was disabled.
        filtered: Option<&'a Mask>,
    },
    /// Coverage measurement.
    Measured {
        /// The rust coverage.
        metric: &'a AreaMetric,
    },
    /// Overlay rendering result.
    Rendered {
        /// The overlay image.
        overlay: &'a RgbImage,
        /// Image dimensions.
        dimensions: Dimensions,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Both the typed API (individual stage structs) and the dynamic API
/// ([`Stage`] enum) are available. This trait bridges the two: each
/// stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
///
/// # Loop pattern
///
/// ```rust
/// # use corroscan_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # use corroscan_pipeline::pipeline::{Stage, PipelineStage, Advance};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"filter"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `7` for
    /// Rendered).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for the initial [`Pending`] stage and for the
    /// filter stage when morphology is disabled.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at
    /// the final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the transition fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion and return the final
    /// [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Decoded(self.decode()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.decode()?.complete()
    }
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            original: &self.original,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Converted(self.convert())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.convert().complete()
    }
}

impl PipelineStage for Converted {
    const NAME: &str = "convert";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Converted { hsv: &self.hsv }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Thresholded(self.threshold()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.threshold()?.complete()
    }
}

impl PipelineStage for Thresholded {
    const NAME: &str = "threshold";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Thresholded {
            range_masks: &self.range_masks,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Combined(self.combine()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.combine()?.complete()
    }
}

impl PipelineStage for Combined {
    const NAME: &str = "combine";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Combined {
            combined: &self.combined,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Filtered(self.filter()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.filter()?.complete()
    }
}

impl PipelineStage for Filtered {
    const NAME: &str = "filter";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Filtered {
            filtered: self.filtered.as_ref(),
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let morphology = self.config.morphology.as_ref()?;
        let filtered = self.filtered.as_ref()?;
        let total = self.dimensions.pixel_count();
        let pixels_before = self.combined.count();
        let pixels_after = filtered.count();
        Some(StageMetrics::Filter {
            kernel_size: morphology.kernel_size,
            border: morphology.border.to_string(),
            pixels_before,
            pixels_after,
            coverage_before: coverage_percent(pixels_before, total),
            coverage_after: coverage_percent(pixels_after, total),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Measured(self.measure()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.measure()?.complete()
    }
}

impl PipelineStage for Measured {
    const NAME: &str = "measure";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Measured {
            metric: &self.metric,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Rendered(self.render()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.render()?.into_result())
    }
}

impl PipelineStage for Rendered {
    const NAME: &str = "render";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Rendered {
            overlay: &self.overlay,
            dimensions: self.dimensions,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

impl Decoded {
    /// Metrics for the decode stage. Every stage except `Pending` and
    /// `Filtered` always has metrics; those two report through
    /// [`PipelineStage::metrics`] only.
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl Converted {
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Convert {
            model: HsvImage::MODEL,
            width: self.dimensions.width,
            height: self.dimensions.height,
        }
    }
}

impl Thresholded {
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Threshold {
            ranges: self.config.ranges.iter().map(ToString::to_string).collect(),
            matched_pixels: self.range_masks.iter().map(Mask::count).collect(),
        }
    }
}

impl Combined {
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let rust_pixel_count = self.combined.count();
        StageMetrics::Combine {
            input_masks: self.range_masks.len(),
            rust_pixel_count,
            coverage_percent: coverage_percent(rust_pixel_count, self.dimensions.pixel_count()),
        }
    }
}

impl Measured {
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Measure {
            rust_pixel_count: self.metric.rust_pixel_count,
            total_pixel_count: self.metric.total_pixel_count,
            ratio_percent: self.metric.ratio_percent,
        }
    }
}

impl Rendered {
    pub(crate) fn stage_metrics(&self) -> StageMetrics {
        let mask = self.filtered.as_ref().unwrap_or(&self.combined);
        StageMetrics::Render {
            highlighted_pixels: mask.count(),
            label: self
                .config
                .overlay
                .label
                .map(|_| crate::overlay::label_text(&self.metric)),
        }
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Decoded`].
    Decoded(Decoded),
    /// See [`Converted`].
    Converted(Converted),
    /// See [`Thresholded`].
    Thresholded(Thresholded),
    /// See [`Combined`].
    Combined(Combined),
    /// See [`Filtered`].
    Filtered(Filtered),
    /// See [`Measured`].
    Measured(Measured),
    /// See [`Rendered`].
    Rendered(Rendered),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Converted(_)
        | Stage::Thresholded(_)
        | Stage::Combined(_)
        | Stage::Filtered(_)
        | Stage::Measured(_)
        | Stage::Rendered(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage; returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Converted(s) => s.$method($($arg),*),
            Self::Thresholded(s) => s.$method($($arg),*),
            Self::Combined(s) => s.$method($($arg),*),
            Self::Filtered(s) => s.$method($($arg),*),
            Self::Measured(s) => s.$method($($arg),*),
            Self::Rendered(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(next_stage))` on success, `Ok(None)` if
    /// already complete (the `Rendered` value is consumed), or `Err` if
    /// the transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        Ok(match self {
            Self::Pending(s) => Advance::Next(Self::Decoded(s.decode()?)),
            Self::Decoded(s) => Advance::Next(Self::Converted(s.convert())),
            Self::Converted(s) => Advance::Next(Self::Thresholded(s.threshold()?)),
            Self::Thresholded(s) => Advance::Next(Self::Combined(s.combine()?)),
            Self::Combined(s) => Advance::Next(Self::Filtered(s.filter()?)),
            Self::Filtered(s) => Advance::Next(Self::Measured(s.measure()?)),
            Self::Measured(s) => Advance::Next(Self::Rendered(s.render()?)),
            Self::Rendered(s) => Advance::Complete(Self::Rendered(s)),
        })
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// Lets the macro call `.name()` and `.index()` on `&self`; associated
// constants aren't reachable as `self.NAME`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

macro_rules! impl_from_stage {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Stage {
                fn from(s: $variant) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

impl_from_stage!(
    Pending,
    Decoded,
    Converted,
    Thresholded,
    Combined,
    Filtered,
    Measured,
    Rendered,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental rust-area analysis pipeline.
///
/// Created via [`Pipeline::new`], which stores the source image and
/// config without doing any processing, or via
/// [`Pipeline::from_image`] for pixels that are already decoded. Each
/// stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes and config.
    ///
    /// No processing is performed; the bytes and config are simply
    /// stored. Call [`.decode()`](Pending::decode) (or convert to a
    /// [`Stage`] and loop) to begin processing.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }

    /// Enter the pipeline with an already decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// invalid.
    pub fn from_image(image: RgbImage, config: PipelineConfig) -> Result<Decoded, PipelineError> {
        config.validate()?;
        Ok(Decoded::new(config, image, 0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::morphology::MorphologyConfig;

    const RUST_BROWN: [u8; 3] = [150, 75, 30];

    /// 20x20 neutral gray PNG with a 10x10 rust patch at (5, 5).
    fn rust_patch_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(20, 20, |x, y| {
            if (5..15).contains(&x) && (5..15).contains(&y) {
                image::Rgba([RUST_BROWN[0], RUST_BROWN[1], RUST_BROWN[2], 255])
            } else {
                image::Rgba([128, 128, 128, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    fn unlabelled() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.overlay.label = None;
        config
    }

    // ─────────── Typed API tests ─────────────────────────────────

    #[test]
    fn pending_exposes_source_bytes() {
        let png = rust_patch_png();
        let pending = Pipeline::new(png.clone(), PipelineConfig::default());
        assert_eq!(pending.source(), png.as_slice());
    }

    #[test]
    fn decode_empty_input_returns_error() {
        let result = Pipeline::new(vec![], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_corrupt_input_returns_error() {
        let result = Pipeline::new(vec![0xFF, 0x00], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn invalid_config_is_reported_before_decoding() {
        let config = PipelineConfig {
            ranges: vec![],
            ..PipelineConfig::default()
        };
        let result = Pipeline::new(vec![], config).decode();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn from_image_validates_config() {
        let config = PipelineConfig {
            morphology: Some(MorphologyConfig::with_kernel_size(2)),
            ..PipelineConfig::default()
        };
        let result = Pipeline::from_image(RgbImage::new(4, 4), config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn decoded_exposes_original() {
        let decoded = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .decode()
            .unwrap();
        assert_eq!(
            decoded.dimensions(),
            Dimensions {
                width: 20,
                height: 20
            }
        );
        assert_eq!(decoded.original().get_pixel(7, 7).0, RUST_BROWN);
    }

    #[test]
    fn converted_exposes_hsv() {
        let converted = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .decode()
            .unwrap()
            .convert();
        assert_eq!(converted.hsv().get_pixel(7, 7), [11, 204, 150]);
        assert_eq!(converted.hsv().get_pixel(0, 0), [0, 0, 128]);
    }

    #[test]
    fn thresholded_and_combined_expose_masks() {
        let combined = Pipeline::new(rust_patch_png(), PipelineConfig::split_red())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap();
        assert_eq!(combined.combined().count(), 100);
    }

    #[test]
    fn thresholded_keeps_one_mask_per_range() {
        let thresholded = Pipeline::new(rust_patch_png(), PipelineConfig::split_red())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap();
        let counts: Vec<u64> = thresholded.range_masks().iter().map(Mask::count).collect();
        assert_eq!(counts, vec![100, 0]);
    }

    #[test]
    fn filtered_with_morphology_enabled() {
        let filtered = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap();
        let mask = filtered.filtered().unwrap();
        assert_eq!(mask.count(), 100);
        assert_eq!(filtered.final_mask(), mask);
    }

    #[test]
    fn filtered_with_morphology_disabled() {
        let config = PipelineConfig {
            morphology: None,
            ..PipelineConfig::default()
        };
        let filtered = Pipeline::new(rust_patch_png(), config)
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap();
        assert!(filtered.filtered().is_none());
        assert_eq!(filtered.final_mask().count(), 100);
        assert!(Stage::from(filtered).metrics().is_none());
    }

    #[test]
    fn measured_exposes_metric() {
        let measured = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap()
            .measure()
            .unwrap();
        assert_eq!(measured.metric().rust_pixel_count, 100);
        assert_eq!(measured.metric().total_pixel_count, 400);
        assert_eq!(measured.metric().ratio_label(), "25.00%");
    }

    #[test]
    fn rendered_exposes_overlay() {
        let rendered = Pipeline::new(rust_patch_png(), unlabelled())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap()
            .measure()
            .unwrap()
            .render()
            .unwrap();
        assert_eq!(rendered.overlay().get_pixel(7, 7).0, [255, 0, 0]);
        assert_eq!(rendered.overlay().get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(rendered.dimensions().pixel_count(), 400);
    }

    #[test]
    fn zero_area_image_fails_at_measure() {
        let filtered = Pipeline::from_image(RgbImage::new(0, 3), PipelineConfig::default())
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap();
        assert!(matches!(
            filtered.measure(),
            Err(PipelineError::DivisionUndefined)
        ));
    }

    #[test]
    fn full_pipeline_produces_same_result_as_process_staged() {
        let png = rust_patch_png();
        let config = PipelineConfig::default();
        let incremental = Pipeline::new(png.clone(), config.clone())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap()
            .measure()
            .unwrap()
            .render()
            .unwrap()
            .into_result();
        let staged = crate::process_staged(&png, &config).unwrap();
        assert_eq!(incremental, staged);
    }

    // ─────────── PipelineStage trait + Stage enum tests ───────────

    #[test]
    fn stage_names_and_indices() {
        let mut stage: Stage = Pipeline::new(rust_patch_png(), PipelineConfig::default()).into();
        let mut seen = vec![(stage.name(), stage.index())];
        loop {
            match stage.advance().unwrap() {
                Advance::Next(next) => {
                    seen.push((next.name(), next.index()));
                    stage = next;
                }
                Advance::Complete(done) => {
                    stage = done;
                    break;
                }
            }
        }
        assert!(stage.is_complete());
        assert_eq!(seen.len(), STAGE_COUNT);
        assert_eq!(
            seen,
            vec![
                ("source", 0),
                ("decode", 1),
                ("convert", 2),
                ("threshold", 3),
                ("combine", 4),
                ("filter", 5),
                ("measure", 6),
                ("render", 7),
            ]
        );
    }

    #[test]
    fn stage_outputs_match_stage() {
        let stage: Stage = Pipeline::new(rust_patch_png(), PipelineConfig::default()).into();
        assert!(matches!(stage.output(), StageOutput::Source { .. }));
        let stage = stage.next().unwrap().unwrap();
        match stage.output() {
            StageOutput::Decoded { original } => assert_eq!(original.dimensions(), (20, 20)),
            _ => panic!("expected decoded output"),
        }
    }

    #[test]
    fn metrics_per_stage() {
        let pending: Stage = Pipeline::new(rust_patch_png(), PipelineConfig::default()).into();
        assert!(pending.metrics().is_none());

        let decoded = pending.next().unwrap().unwrap();
        match decoded.metrics() {
            Some(StageMetrics::Decode {
                width,
                height,
                pixel_count,
                ..
            }) => {
                assert_eq!((width, height, pixel_count), (20, 20, 400));
            }
            other => panic!("expected decode metrics, got {other:?}"),
        }

        let converted = decoded.next().unwrap().unwrap();
        let thresholded = converted.next().unwrap().unwrap();
        match thresholded.metrics() {
            Some(StageMetrics::Threshold { matched_pixels, .. }) => {
                assert_eq!(matched_pixels, vec![100]);
            }
            other => panic!("expected threshold metrics, got {other:?}"),
        }
    }

    #[test]
    fn complete_from_pending() {
        let result = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .complete()
            .unwrap();
        assert_eq!(result.metric.rust_pixel_count, 100);
    }

    #[test]
    fn complete_from_mid_stage() {
        let combined = Pipeline::new(rust_patch_png(), PipelineConfig::default())
            .decode()
            .unwrap()
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap();
        let result = Stage::from(combined).complete().unwrap();
        assert!(result.filtered.is_some());
        assert_eq!(result.final_mask().count(), 100);
    }

    #[test]
    fn complete_from_rendered_is_into_result() {
        let stage = Stage::from(
            Pipeline::new(rust_patch_png(), unlabelled())
                .decode()
                .unwrap()
                .convert()
                .threshold()
                .unwrap()
                .combine()
                .unwrap()
                .filter()
                .unwrap()
                .measure()
                .unwrap()
                .render()
                .unwrap(),
        );
        assert!(stage.is_complete());
        assert!(matches!(stage.advance(), Ok(Advance::Complete(_))));
    }

    #[test]
    fn next_from_rendered_is_none() {
        let rendered = Pipeline::from_image(RgbImage::new(3, 3), unlabelled())
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(rendered.metric.rust_pixel_count, 0);

        let stage = Stage::from(
            Pipeline::from_image(RgbImage::new(3, 3), unlabelled())
                .unwrap()
                .convert()
                .threshold()
                .unwrap()
                .combine()
                .unwrap()
                .filter()
                .unwrap()
                .measure()
                .unwrap()
                .render()
                .unwrap(),
        );
        assert!(stage.next().unwrap().is_none());
    }

    #[test]
    fn advance_reports_stage_failures_unchanged() {
        let mut stage: Stage = Pipeline::from_image(RgbImage::new(0, 0), unlabelled())
            .unwrap()
            .into();
        let err = loop {
            match stage.advance() {
                Ok(Advance::Next(next)) => stage = next,
                Ok(Advance::Complete(_)) => panic!("a zero-area image cannot reach render"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, PipelineError::DivisionUndefined));
    }

    #[test]
    fn trait_metrics_agree_with_stage_metrics() {
        let decoded = Pipeline::new(rust_patch_png(), unlabelled()).decode().unwrap();
        assert_eq!(decoded.metrics(), Some(decoded.stage_metrics()));

        let measured = decoded
            .convert()
            .threshold()
            .unwrap()
            .combine()
            .unwrap()
            .filter()
            .unwrap()
            .measure()
            .unwrap();
        assert_eq!(measured.metrics(), Some(measured.stage_metrics()));

        let rendered = measured.render().unwrap();
        assert_eq!(rendered.metrics(), Some(rendered.stage_metrics()));
    }
}
