//! Shared types for the corroscan analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::area::AreaMetric;
use crate::hsv::HsvImage;
use crate::mask::Mask;
use crate::morphology::MorphologyConfig;
use crate::overlay::{LabelStyle, OverlayConfig};
use crate::threshold::ChannelRange;

/// Re-export `GrayImage` so downstream crates can reference mask rasters
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can build inputs and read
/// overlays without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels. Zero if either side is zero.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color model of a three-channel pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorModel {
    /// Red, green, blue; each `0..=255`.
    Rgb,
    /// Hue `0..=179`, saturation and value `0..=255`.
    Hsv,
}

impl std::fmt::Display for ColorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rgb => write!(f, "RGB"),
            Self::Hsv => write!(f, "HSV"),
        }
    }
}

/// Configuration for one analysis.
///
/// Immutable once built; every analysis receives it explicitly.
/// [`validate`](Self::validate) runs before any pixel is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rust color windows. A pixel is rust if it lies in any of them.
    pub ranges: Vec<ChannelRange>,
    /// Opening/closing cleanup, or `None` to measure the raw union.
    pub morphology: Option<MorphologyConfig>,
    /// Overlay highlight and label.
    pub overlay: OverlayConfig,
}

impl PipelineConfig {
    /// Default lowest rust hue.
    pub const DEFAULT_HUE_MIN: u8 = 0;
    /// Default highest rust hue.
    pub const DEFAULT_HUE_MAX: u8 = 25;
    /// Default saturation floor.
    pub const DEFAULT_SATURATION_MIN: u8 = 50;
    /// Default saturation ceiling.
    pub const DEFAULT_SATURATION_MAX: u8 = 255;
    /// Default value floor.
    pub const DEFAULT_VALUE_MIN: u8 = 50;
    /// Default value ceiling.
    pub const DEFAULT_VALUE_MAX: u8 = 255;
    /// Default morphology kernel side.
    pub const DEFAULT_KERNEL_SIZE: u32 = MorphologyConfig::DEFAULT_KERNEL_SIZE;
    /// Default label scale.
    pub const DEFAULT_LABEL_SCALE: f32 = LabelStyle::DEFAULT_SCALE;

    /// The default single rust range, H[0-25] S[50-255] V[50-255].
    #[must_use]
    pub const fn default_range() -> ChannelRange {
        ChannelRange::new(
            (Self::DEFAULT_HUE_MIN, Self::DEFAULT_HUE_MAX),
            (Self::DEFAULT_SATURATION_MIN, Self::DEFAULT_SATURATION_MAX),
            (Self::DEFAULT_VALUE_MIN, Self::DEFAULT_VALUE_MAX),
        )
    }

    /// Two-range red preset: H[0-20] and H[170-179], S and V at least 50.
    ///
    /// Catches the reddish hues on both sides of the hue wrap.
    #[must_use]
    pub fn split_red() -> Self {
        Self {
            ranges: vec![
                ChannelRange::with_floors((0, 20), 50, 50),
                ChannelRange::with_floors((170, 179), 50, 50),
            ],
            ..Self::default()
        }
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if there are no ranges, any
    /// range is invalid, the kernel size is invalid, or the label style is
    /// invalid.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ranges.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one channel range is required".to_string(),
            ));
        }
        for range in &self.ranges {
            range.validate()?;
        }
        if let Some(morphology) = &self.morphology {
            morphology.validate()?;
        }
        if let Some(label) = &self.overlay.label {
            label.validate()?;
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ranges: vec![Self::default_range()],
            morphology: Some(MorphologyConfig::default()),
            overlay: OverlayConfig::default(),
        }
    }
}

/// Output of [`analyze`](crate::analyze).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Rust coverage.
    pub metric: AreaMetric,
    /// The mask the metric was measured on.
    pub mask: Mask,
    /// Original image with rust highlighted (and labelled, if configured).
    pub overlay: RgbImage,
    /// Source image dimensions.
    pub dimensions: Dimensions,
}

/// All intermediate results from a pipeline run.
///
/// Used to inspect every stage (e.g. to show why a region was or was not
/// counted).
#[derive(Debug, Clone, PartialEq)]
pub struct StagedResult {
    /// Stage 0: decoded RGB input.
    pub original: RgbImage,
    /// Stage 1: HSV conversion.
    pub hsv: HsvImage,
    /// Stage 2: one threshold mask per configured range.
    pub range_masks: Vec<Mask>,
    /// Stage 3: union of the range masks.
    pub combined: Mask,
    /// Stage 4: cleaned mask (`Some` only when morphology is enabled).
    pub filtered: Option<Mask>,
    /// Stage 5: coverage of the final mask.
    pub metric: AreaMetric,
    /// Stage 6: overlay.
    pub overlay: RgbImage,
    /// Source image dimensions.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// Returns the mask that was measured: filtered if morphology is
    /// enabled, otherwise the combined mask.
    #[must_use]
    pub fn final_mask(&self) -> &Mask {
        self.filtered.as_ref().unwrap_or(&self.combined)
    }

    /// Drop the intermediates.
    #[must_use]
    pub fn into_analysis(self) -> AnalysisResult {
        let mask = match self.filtered {
            Some(filtered) => filtered,
            None => self.combined,
        };
        AnalysisResult {
            metric: self.metric,
            mask,
            overlay: self.overlay,
            dimensions: self.dimensions,
        }
    }
}

/// Errors that can occur during analysis.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pixel buffer or mask dimensions do not agree.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The image has no pixels, so no ratio exists.
    #[error("coverage ratio is undefined for an image with zero pixels")]
    DivisionUndefined,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// A deserialized `ImageDecode` comes back as `InvalidConfig` carrying
/// the original message, since the typed `image::ImageError` cannot be
/// rebuilt.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    MalformedInput(String),
    DivisionUndefined,
    InvalidConfig(String),
    EmptyInput,
    ImageDecode(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::MalformedInput(s) => PipelineErrorProxy::MalformedInput(s.clone()),
            Self::DivisionUndefined => PipelineErrorProxy::DivisionUndefined,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::MalformedInput(s) => Self::MalformedInput(s),
            PipelineErrorProxy::DivisionUndefined => Self::DivisionUndefined,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::morphology::BorderPolicy;

    // --- Dimensions tests ---

    #[test]
    fn dimensions_pixel_count() {
        let dims = Dimensions {
            width: 640,
            height: 480,
        };
        assert_eq!(dims.pixel_count(), 307_200);
        assert_eq!(dims.to_string(), "640x480");
    }

    #[test]
    fn dimensions_pixel_count_does_not_overflow() {
        let dims = Dimensions {
            width: u32::MAX,
            height: u32::MAX,
        };
        assert_eq!(dims.pixel_count(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn zero_sided_dimensions_have_no_pixels() {
        let dims = Dimensions {
            width: 0,
            height: 12,
        };
        assert_eq!(dims.pixel_count(), 0);
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.ranges,
            vec![ChannelRange::new((0, 25), (50, 255), (50, 255))]
        );
        let morphology = config.morphology.unwrap();
        assert_eq!(morphology.kernel_size, 5);
        assert_eq!(morphology.border, BorderPolicy::Background);
        assert_eq!(config.overlay.highlight, [255, 0, 0]);
        assert!(config.overlay.label.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn split_red_preset() {
        let config = PipelineConfig::split_red();
        assert_eq!(config.ranges.len(), 2);
        assert_eq!((config.ranges[0].hue_min, config.ranges[0].hue_max), (0, 20));
        assert_eq!((config.ranges[1].hue_min, config.ranges[1].hue_max), (170, 179));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_ranges() {
        let config = PipelineConfig {
            ranges: vec![],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_kernel_and_label() {
        let kernel = PipelineConfig {
            morphology: Some(MorphologyConfig::with_kernel_size(6)),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            kernel.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut label = PipelineConfig::default();
        label.overlay.label = Some(LabelStyle {
            thickness: -1.0,
            ..LabelStyle::default()
        });
        assert!(matches!(
            label.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_accepts_disabled_morphology_and_label() {
        let mut config = PipelineConfig {
            morphology: None,
            ..PipelineConfig::default()
        };
        config.overlay.label = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_json_uses_field_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"ranges":[{"hue_min":5,"hue_max":15,"saturation_min":60,"saturation_max":255,"value_min":40,"value_max":255}]}"#,
        )
        .unwrap();
        assert_eq!(config.ranges, vec![ChannelRange::new((5, 15), (60, 255), (40, 255))]);
        assert_eq!(config.morphology, Some(MorphologyConfig::default()));
        assert_eq!(config.overlay, OverlayConfig::default());
    }

    #[test]
    fn config_json_null_morphology_disables_filter() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"morphology":null,"overlay":{"highlight":[0,255,0],"label":null}}"#)
                .unwrap();
        assert!(config.morphology.is_none());
        assert!(config.overlay.label.is_none());
        assert_eq!(config.ranges, vec![PipelineConfig::default_range()]);
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig::split_red();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    // --- StagedResult tests ---

    #[test]
    fn final_mask_prefers_filtered() {
        let original = RgbImage::new(2, 1);
        let combined = Mask::from_fn(2, 1, |x, _| x == 0);
        let filtered = Mask::new(2, 1);
        let mut staged = StagedResult {
            hsv: crate::hsv::rgb_to_hsv(&original),
            original: original.clone(),
            range_masks: vec![combined.clone()],
            combined: combined.clone(),
            filtered: Some(filtered.clone()),
            metric: AreaMetric::from_counts(0, 2).unwrap(),
            overlay: original,
            dimensions: Dimensions {
                width: 2,
                height: 1,
            },
        };
        assert_eq!(staged.final_mask(), &filtered);

        staged.filtered = None;
        assert_eq!(staged.final_mask(), &combined);
        assert_eq!(staged.into_analysis().mask, combined);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display() {
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert_eq!(
            PipelineError::DivisionUndefined.to_string(),
            "coverage ratio is undefined for an image with zero pixels",
        );
        assert_eq!(
            PipelineError::InvalidConfig("hue_min > hue_max".to_string()).to_string(),
            "invalid pipeline configuration: hue_min > hue_max",
        );
        assert_eq!(
            PipelineError::MalformedInput("expected 12 bytes, got 11".to_string()).to_string(),
            "malformed input: expected 12 bytes, got 11",
        );
    }

    #[test]
    fn pipeline_error_serde_round_trip() {
        for err in [
            PipelineError::DivisionUndefined,
            PipelineError::EmptyInput,
            PipelineError::MalformedInput("size".to_string()),
        ] {
            let json = serde_json::to_string(&err).unwrap();
            let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
            assert_eq!(deserialized.to_string(), err.to_string());
        }
    }

    #[test]
    fn image_decode_error_deserializes_as_invalid_config() {
        let err = PipelineError::from(image::ImageError::IoError(std::io::Error::other("truncated")));
        let json = serde_json::to_string(&err).unwrap();
        let deserialized: PipelineError = serde_json::from_str(&json).unwrap();
        match deserialized {
            PipelineError::InvalidConfig(msg) => {
                assert!(msg.starts_with("image decode error:"), "{msg}");
                assert!(msg.contains("truncated"), "{msg}");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }
}
