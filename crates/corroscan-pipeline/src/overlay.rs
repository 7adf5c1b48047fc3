//! Overlay rendering: show which pixels were classified as rust.
//!
//! The overlay is a fresh copy of the original image with every masked
//! pixel painted in a highlight color. Optionally the coverage ratio is
//! burned in at the top-left corner using the built-in bitmap face from
//! [`crate::font`], rasterised with `tiny-skia` so that fractional scales
//! and stroke thickness get proper anti-aliasing.
//!
//! The label is cosmetic: it never feeds back into the measurement.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::area::AreaMetric;
use crate::font;
use crate::mask::{MASK_OFF, Mask};
use crate::types::PipelineError;

/// Pure red, the default highlight for rust pixels.
pub const HIGHLIGHT_RED: [u8; 3] = [255, 0, 0];

/// Label anchor offset from the top-left corner, in font units.
const LABEL_MARGIN: f32 = 2.0;

/// Appearance of the burned-in ratio label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    /// Output pixels per font unit.
    pub scale: f32,
    /// Text color.
    pub color: [u8; 3],
    /// Extra stroke width around each glyph cell, in output pixels.
    /// `0.0` draws filled cells only.
    pub thickness: f32,
    /// Whether to anti-alias glyph edges.
    pub anti_alias: bool,
}

impl LabelStyle {
    /// Default pixels per font unit.
    pub const DEFAULT_SCALE: f32 = 3.0;
    /// Default stroke thickness.
    pub const DEFAULT_THICKNESS: f32 = 1.0;

    /// Check that scale and thickness are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `scale` is not a
    /// positive finite number or `thickness` is negative or not finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "label scale must be positive, got {}",
                self.scale,
            )));
        }
        if !(self.thickness.is_finite() && self.thickness >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "label thickness must be non-negative, got {}",
                self.thickness,
            )));
        }
        Ok(())
    }
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            scale: Self::DEFAULT_SCALE,
            color: [255, 255, 255],
            thickness: Self::DEFAULT_THICKNESS,
            anti_alias: true,
        }
    }
}

/// Overlay settings.
///
/// The label is off by default so that only masked pixels change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Color painted over rust pixels.
    pub highlight: [u8; 3],
    /// Ratio label style, or `None` for no label.
    pub label: Option<LabelStyle>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            highlight: HIGHLIGHT_RED,
            label: None,
        }
    }
}

impl OverlayConfig {
    /// Red highlight plus the default ratio label.
    #[must_use]
    pub fn labelled() -> Self {
        Self {
            label: Some(LabelStyle::default()),
            ..Self::default()
        }
    }
}

/// Copy `original` and paint every masked pixel with `highlight`.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedInput`] if the mask and image
/// dimensions differ.
pub fn render(original: &RgbImage, mask: &Mask, highlight: [u8; 3]) -> Result<RgbImage, PipelineError> {
    let (width, height) = original.dimensions();
    mask.ensure_same_dimensions(crate::types::Dimensions { width, height })?;

    let mut overlay = original.clone();
    crate::rows::zip_rows(
        &mut overlay,
        width as usize * 3,
        mask.as_gray().as_raw(),
        width as usize,
        |dst, cells| {
            for (px, &cell) in dst.chunks_exact_mut(3).zip(cells) {
                if cell != MASK_OFF {
                    px.copy_from_slice(&highlight);
                }
            }
        },
    );
    Ok(overlay)
}

/// Text of the ratio label, e.g. `"Rust: 12.34%"`.
#[must_use]
pub fn label_text(metric: &AreaMetric) -> String {
    format!("Rust: {}", metric.ratio_label())
}

/// Render the overlay and, if configured, burn in the ratio label.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedInput`] on a dimension mismatch and
/// [`PipelineError::InvalidConfig`] for an invalid label style.
pub fn render_with_label(
    original: &RgbImage,
    mask: &Mask,
    config: &OverlayConfig,
    metric: &AreaMetric,
) -> Result<RgbImage, PipelineError> {
    let mut overlay = render(original, mask, config.highlight)?;
    if let Some(style) = &config.label {
        style.validate()?;
        draw_label(&mut overlay, &label_text(metric), style);
    }
    Ok(overlay)
}

/// Burn `text` into `image` at the top-left anchor.
///
/// Text that runs past the image edge is clipped.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn draw_label(image: &mut RgbImage, text: &str, style: &LabelStyle) {
    let scale = style.scale;
    let origin = LABEL_MARGIN * scale;

    let mut pb = PathBuilder::new();
    for (i, c) in text.chars().enumerate() {
        let pen_x = (i as u32 * font::ADVANCE) as f32;
        for (col, row) in font::lit_cells(c) {
            let x = (pen_x + col as f32).mul_add(scale, origin);
            let y = (row as f32).mul_add(scale, origin);
            if let Some(rect) = Rect::from_xywh(x, y, scale, scale) {
                pb.push_rect(rect);
            }
        }
    }
    let Some(path) = pb.finish() else {
        return;
    };

    // Only rasterise the label's bounding box, clipped to the image.
    let bounds = path.bounds();
    let pad = style.thickness / 2.0 + 1.0;
    let box_w = ((bounds.right() + pad).ceil() as u32).min(image.width());
    let box_h = ((bounds.bottom() + pad).ceil() as u32).min(image.height());
    let Some(mut pixmap) = Pixmap::new(box_w, box_h) else {
        return;
    };

    let [r, g, b] = style.color;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = style.anti_alias;

    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    if style.thickness > 0.0 {
        let stroke = Stroke {
            width: style.thickness,
            line_join: LineJoin::Miter,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    composite(image, &pixmap);
}

/// Source-over blend of a premultiplied RGBA pixmap onto the top-left
/// corner of `image`.
fn composite(image: &mut RgbImage, pixmap: &Pixmap) {
    let data = pixmap.data();
    for y in 0..pixmap.height() {
        for x in 0..pixmap.width() {
            let off = ((y * pixmap.width() + x) * 4) as usize;
            let alpha = u16::from(data[off + 3]);
            if alpha == 0 {
                continue;
            }
            let px = image.get_pixel_mut(x, y);
            for c in 0..3 {
                let src = u16::from(data[off + c]);
                let dst = u16::from(px.0[c]);
                let blended = src + (dst * (255 - alpha) + 127) / 255;
                px.0[c] = u8::try_from(blended.min(255)).unwrap_or(u8::MAX);
            }
        }
    }
}
