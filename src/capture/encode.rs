//! Bitmap encoding for screenshot artifacts

use std::io;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};

use crate::config::ImageFormat;
use crate::error::{CaptureError, Result};

/// Default JPEG matte when no background is configured
const JPEG_MATTE: [u8; 3] = [255, 255, 255];

fn write_png<W: io::Write>(w: W, image: &RgbaImage) -> std::result::Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(w, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())
}

/// Composite straight-alpha pixels over an opaque matte
fn flatten(image: &RgbaImage, matte: [u8; 3]) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        let a = a as u32;
        let blend = |c: u8, m: u8| ((c as u32 * a + m as u32 * (255 - a) + 127) / 255) as u8;
        *dst = Rgb([
            blend(r, matte[0]),
            blend(g, matte[1]),
            blend(b, matte[2]),
        ]);
    }
    out
}

/// Encode a captured bitmap.
///
/// `quality` applies to JPEG only. JPEG has no alpha channel, so transparent
/// areas (oval corners, unpainted page) are flattened onto `background` or white.
pub fn encode_image(
    image: &RgbaImage,
    format: ImageFormat,
    quality: u8,
    background: Option<[u8; 4]>,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => {
            write_png(&mut bytes, image)
                .map_err(|e| CaptureError::encoding(format.mime_type(), e.to_string()))?;
        }
        ImageFormat::Jpeg => {
            let matte = background.map_or(JPEG_MATTE, |[r, g, b, _]| [r, g, b]);
            let rgb = flatten(image, matte);
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| CaptureError::encoding(format.mime_type(), e.to_string()))?;
        }
        ImageFormat::Webp => {
            WebPEncoder::new_lossless(&mut bytes)
                .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
                .map_err(|e| CaptureError::encoding(format.mime_type(), e.to_string()))?;
        }
    }
    log::debug!(
        "Encoded {}x{} capture as {} ({} bytes)",
        image.width(),
        image.height(),
        format.mime_type(),
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_png_decodes_back() {
        let bytes = encode_image(&sample(), ImageFormat::Png, 92, None).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_jpeg_flattens_alpha() {
        let bytes = encode_image(&sample(), ImageFormat::Jpeg, 100, None).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let corner = decoded.get_pixel(7, 0).0;
        assert!(corner.iter().all(|&c| c > 200), "transparent area not white: {corner:?}");
    }

    #[test]
    fn test_webp_is_riff() {
        let bytes = encode_image(&sample(), ImageFormat::Webp, 92, None).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_flatten_uses_background() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten(&img, [10, 20, 30]).get_pixel(0, 0).0, [10, 20, 30]);
        let half = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        assert_eq!(flatten(&half, [0, 0, 0]).get_pixel(0, 0).0, [128, 128, 128]);
    }
}
