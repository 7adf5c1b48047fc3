//! Image decoding and raw-buffer construction.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the RGB
//! pixel grid the analysis works on. Callers that already hold pixels
//! can skip decoding and use [`rgb_from_raw`] or build an
//! [`RgbImage`] themselves.

use image::RgbImage;

use crate::types::PipelineError;

/// Decode raw image bytes into an RGB image.
///
/// Any alpha channel is dropped; transparent pixels keep their stored
/// color.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Wrap interleaved `r, g, b` bytes in row-major order as an image.
///
/// Zero width or height is accepted (with an empty buffer).
///
/// # Errors
///
/// Returns [`PipelineError::MalformedInput`] if `data.len()` is not
/// exactly `width * height * 3`, or that product overflows.
pub fn rgb_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<RgbImage, PipelineError> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| {
            PipelineError::MalformedInput(format!("{width}x{height} RGB buffer size overflows"))
        })?;
    if data.len() != expected {
        return Err(PipelineError::MalformedInput(format!(
            "{width}x{height} RGB image needs {expected} bytes, got {}",
            data.len(),
        )));
    }
    RgbImage::from_raw(width, height, data).ok_or_else(|| {
        PipelineError::MalformedInput(format!("{width}x{height} RGB buffer rejected"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
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

    #[test]
    fn empty_input_returns_error() {
        let result = decode_rgb(&[]);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_rgb(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes_to_rgb() {
        let img = image::RgbaImage::from_fn(3, 2, |x, _| {
            if x == 0 {
                image::Rgba([150, 75, 30, 255])
            } else {
                image::Rgba([10, 20, 30, 0])
            }
        });
        let rgb = decode_rgb(&encode_png(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(0, 1).0, [150, 75, 30]);
        assert_eq!(rgb.get_pixel(2, 0).0, [10, 20, 30]);
    }

    #[test]
    fn raw_buffer_with_exact_length_is_accepted() {
        let img = rgb_from_raw(2, 2, vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 9, 9, 9]).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [0, 255, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [9, 9, 9]);
    }

    #[test]
    fn raw_buffer_with_wrong_length_is_malformed() {
        for len in [0, 11, 13] {
            assert!(
                matches!(
                    rgb_from_raw(2, 2, vec![0; len]),
                    Err(PipelineError::MalformedInput(_))
                ),
                "length {len}",
            );
        }
    }

    #[test]
    fn zero_area_raw_buffer_is_valid() {
        let img = rgb_from_raw(0, 4, Vec::new()).unwrap();
        assert_eq!(img.dimensions(), (0, 4));
        assert!(matches!(
            rgb_from_raw(0, 4, vec![0; 3]),
            Err(PipelineError::MalformedInput(_))
        ));
    }
}
