//! corroscan-pipeline: rust-area estimation for photographs of metal
//! surfaces (sans-IO).
//!
//! Classifies every pixel as rust or not by HSV color thresholding and
//! reports the rust fraction of the image:
//! RGB -> HSV -> per-range threshold -> mask union -> opening/closing
//! -> area ratio, plus an overlay highlighting the rust pixels.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! pixel buffers (or encoded image bytes) and returns structured data.
//! Reading files and writing overlays lives in `corroscan-cli`. Progress
//! is reported through `tracing` events; install a subscriber to see them.
//!
//! ```rust
//! use corroscan_pipeline::{PipelineConfig, RgbImage, analyze};
//!
//! let plate = RgbImage::from_pixel(4, 4, image::Rgb([150, 75, 30]));
//! let config = PipelineConfig { morphology: None, ..PipelineConfig::default() };
//! let result = analyze(&plate, &config)?;
//! assert_eq!(result.metric.ratio_label(), "100.00%");
//! # Ok::<(), corroscan_pipeline::PipelineError>(())
//! ```

pub mod area;
pub mod decode;
pub mod diagnostics;
pub mod font;
pub mod hsv;
pub mod mask;
pub mod morphology;
pub mod overlay;
pub mod pipeline;
pub mod threshold;
pub mod types;

mod rows;

pub use area::AreaMetric;
pub use hsv::HsvImage;
pub use mask::Mask;
pub use morphology::{BorderPolicy, MorphologyConfig};
pub use overlay::{LabelStyle, OverlayConfig};
pub use pipeline::Pipeline;
pub use threshold::ChannelRange;
pub use types::{
    AnalysisResult, ColorModel, Dimensions, GrayImage, PipelineConfig, PipelineError, RgbImage,
    StagedResult,
};

/// Analyze an RGB image.
///
/// # Pipeline steps
///
/// 1. Validate the configuration (no pixel is touched if it is invalid)
/// 2. Convert RGB to HSV
/// 3. Threshold once per configured range
/// 4. Union the range masks
/// 5. Optional opening then closing
/// 6. Measure the rust fraction
/// 7. Render the overlay (with optional ratio label)
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an invalid configuration
/// and [`PipelineError::DivisionUndefined`] for an image with no pixels.
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn analyze(image: &RgbImage, config: &PipelineConfig) -> Result<AnalysisResult, PipelineError> {
    let staged = Pipeline::from_image(image.clone(), config.clone())?
        .convert()
        .threshold()?
        .combine()?
        .filter()?
        .measure()?
        .render()?
        .into_result();
    Ok(staged.into_analysis())
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) and analyze them.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the image format is unrecognized,
/// plus everything [`analyze`] can return.
pub fn process(image_bytes: &[u8], config: &PipelineConfig) -> Result<AnalysisResult, PipelineError> {
    process_staged(image_bytes, config).map(StagedResult::into_analysis)
}

/// Like [`process`], but keep every intermediate.
///
/// # Errors
///
/// Same as [`process`].
#[tracing::instrument(skip_all, fields(bytes = image_bytes.len()))]
pub fn process_staged(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .convert()
        .threshold()?
        .combine()?
        .filter()?
        .measure()?
        .render()?
        .into_result())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn raw_counts() -> PipelineConfig {
        PipelineConfig {
            ranges: vec![ChannelRange::with_floors((0, 20), 50, 50)],
            morphology: None,
            overlay: OverlayConfig {
                label: None,
                ..OverlayConfig::default()
            },
        }
    }

    #[test]
    fn black_image_is_zero_percent() {
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let config = PipelineConfig {
            ranges: vec![ChannelRange::new((0, 179), (0, 255), (50, 255))],
            ..raw_counts()
        };
        let result = analyze(&img, &config).unwrap();
        assert_eq!(result.metric.rust_pixel_count, 0);
        assert_eq!(result.metric.total_pixel_count, 4);
        assert_eq!(result.metric.ratio_label(), "0.00%");
        assert_eq!(result.overlay, img);
    }

    #[test]
    fn red_image_is_hundred_percent() {
        let img = RgbImage::from_pixel(2, 2, RED);
        let result = analyze(&img, &raw_counts()).unwrap();
        assert_eq!(result.metric.rust_pixel_count, 4);
        assert_eq!(result.metric.ratio_label(), "100.00%");
        assert!(result.overlay.pixels().all(|p| *p == RED));
    }

    #[test]
    fn half_red_half_blue_is_fifty_percent() {
        let img = RgbImage::from_fn(4, 4, |x, _| if x < 2 { RED } else { BLUE });
        let result = analyze(&img, &raw_counts()).unwrap();
        assert_eq!(result.metric.rust_pixel_count, 8);
        assert_eq!(result.metric.total_pixel_count, 16);
        assert_eq!(result.metric.ratio_label(), "50.00%");
        for y in 0..4 {
            for x in 0..4 {
                let expected = if x < 2 { RED } else { BLUE };
                assert_eq!(*result.overlay.get_pixel(x, y), expected);
            }
        }
    }

    #[test]
    fn checkerboard_is_fifty_percent_before_filtering() {
        let img = RgbImage::from_fn(4, 4, |x, y| if (x + y) % 2 == 0 { RED } else { BLUE });
        let result = analyze(&img, &raw_counts()).unwrap();
        assert_eq!(result.metric.ratio_label(), "50.00%");
    }

    #[test]
    fn zero_area_image_is_division_undefined() {
        for img in [RgbImage::new(0, 0), RgbImage::new(0, 5), RgbImage::new(5, 0)] {
            assert!(matches!(
                analyze(&img, &PipelineConfig::default()),
                Err(PipelineError::DivisionUndefined)
            ));
        }
    }

    #[test]
    fn invalid_config_fails_before_processing() {
        let config = PipelineConfig {
            ranges: vec![ChannelRange::with_floors((170, 10), 50, 50)],
            ..PipelineConfig::default()
        };
        // Zero-area input would otherwise fail with DivisionUndefined.
        assert!(matches!(
            analyze(&RgbImage::new(0, 0), &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn analyze_does_not_mutate_input() {
        let img = RgbImage::from_fn(6, 6, |x, _| if x < 3 { RED } else { BLUE });
        let before = img.clone();
        let _ = analyze(&img, &PipelineConfig::default()).unwrap();
        assert_eq!(img, before);
    }

    #[test]
    fn default_overlay_only_changes_masked_pixels() {
        let img = RgbImage::from_fn(120, 60, |x, y| {
            if (70..110).contains(&x) && (20..50).contains(&y) {
                Rgb([150, 75, 30])
            } else {
                Rgb([128, 128, 128])
            }
        });
        let result = analyze(&img, &PipelineConfig::default()).unwrap();
        assert_eq!(result.metric.rust_pixel_count, 40 * 30);
        for (x, y, px) in img.enumerate_pixels() {
            if result.mask.get(x, y) {
                assert_eq!(result.overlay.get_pixel(x, y).0, [255, 0, 0]);
            } else {
                assert_eq!(result.overlay.get_pixel(x, y), px, "pixel ({x}, {y})");
            }
        }

        let bare = RgbImage::from_pixel(120, 60, Rgb([128, 128, 128]));
        assert_eq!(analyze(&bare, &PipelineConfig::default()).unwrap().overlay, bare);
    }

    #[test]
    fn analyze_is_deterministic() {
        let img = RgbImage::from_fn(30, 20, |x, y| {
            if (x * 7 + y * 3) % 5 < 2 { RED } else { Rgb([90, 90, 90]) }
        });
        let config = PipelineConfig::default();
        assert_eq!(analyze(&img, &config).unwrap(), analyze(&img, &config).unwrap());
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn process_matches_analyze_on_decoded_pixels() {
        let img = image::RgbaImage::from_fn(12, 12, |x, y| {
            if (3..9).contains(&x) && (2..10).contains(&y) {
                image::Rgba([150, 75, 30, 255])
            } else {
                image::Rgba([200, 200, 200, 255])
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

        let config = PipelineConfig::default();
        let from_bytes = process(&buf, &config).unwrap();
        let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();
        assert_eq!(from_bytes, analyze(&rgb, &config).unwrap());
    }
}
