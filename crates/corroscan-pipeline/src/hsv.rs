//! RGB to HSV color-space conversion.
//!
//! Uses the conventional 8-bit HSV encoding: hue on a 180-step circle
//! (`0..=179`, i.e. degrees / 2), saturation and value on `0..=255`.
//! Rust tones vary more in saturation and value (lighting) than in hue,
//! which is why thresholding happens in this space.
//!
//! This is step 1 of the analysis, between decoding and thresholding.

use image::RgbImage;

use crate::types::{ColorModel, Dimensions};

/// Largest hue value in the 8-bit encoding.
pub const HUE_LIMIT: u8 = 179;

/// An image whose three channels are H, S, V rather than R, G, B.
///
/// Same buffer shape as [`RgbImage`]; the newtype keeps the two color
/// models from being mixed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsvImage(RgbImage);

impl HsvImage {
    /// Color model tag for this image type.
    pub const MODEL: ColorModel = ColorModel::Hsv;

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Image dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// The `[h, s, v]` triple at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.0.get_pixel(x, y).0
    }

    /// Raw interleaved `h, s, v` bytes in row-major order.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Consume and return the raw buffer (channels still H, S, V).
    #[must_use]
    pub fn into_inner(self) -> RgbImage {
        self.0
    }
}

/// Convert a single RGB pixel to `[h, s, v]`.
///
/// `v = max(r, g, b)`, `s = 255 * (max - min) / max` (0 for black),
/// and `h` is the hue angle halved and rounded, wrapped into `0..=179`.
/// Achromatic pixels (gray, black, white) get `h = 0`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn pixel_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);

    if max == min {
        return [0, 0, max];
    }

    let saturation = (255.0 * delta / f32::from(max)).round() as u8;

    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let degrees = if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        60.0f32.mul_add((bf - rf) / delta, 120.0)
    } else {
        60.0f32.mul_add((rf - gf) / delta, 240.0)
    };
    let degrees = if degrees < 0.0 {
        degrees + 360.0
    } else {
        degrees
    };

    // 359.5 degrees rounds up to 180, which is the same angle as 0.
    let hue = ((degrees / 2.0).round() as u16 % (u16::from(HUE_LIMIT) + 1)) as u8;

    [hue, saturation, max]
}

/// Convert an RGB image to HSV.
///
/// Pure and per-pixel; the output has the same dimensions as the input.
#[must_use = "returns the HSV image"]
pub fn rgb_to_hsv(image: &RgbImage) -> HsvImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);
    let stride = width as usize * 3;

    crate::rows::zip_rows(&mut out, stride, image.as_raw(), stride, |dst, src| {
        for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
            d.copy_from_slice(&pixel_to_hsv([s[0], s[1], s[2]]));
        }
    });

    HsvImage(out)
}
