//! Image encoding: `DynamicImage` → `data:image/png;base64,…` URL.
//!
//! OpenAI-compatible vision endpoints accept images as base64 data URLs
//! embedded in the JSON request body. PNG is lossless, which keeps rendered
//! glyph edges crisp for the OCR model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// MIME type of every encoded page.
pub const PAGE_MIME_TYPE: &str = "image/png";

/// Encode a page image as PNG bytes.
///
/// PNG has no floating-point colour types, so HDR pages are converted to
/// 16-bit RGBA first.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let img: Cow<'_, DynamicImage> = match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            Cow::Owned(DynamicImage::ImageRgba16(img.to_rgba16()))
        }
        _ => Cow::Borrowed(img),
    };
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap binary data in a base64 `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

/// Encode a page image as a PNG data URL ready for the request body.
pub fn image_to_data_url(img: &DynamicImage) -> Result<String, image::ImageError> {
    let png = encode_png(img)?;
    let url = data_url(PAGE_MIME_TYPE, &png);
    debug!("Encoded {}x{} image → {} bytes data URL", img.width(), img.height(), url.len());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let url = image_to_data_url(&img).expect("encode should succeed");
        let b64 = url
            .strip_prefix("data:image/png;base64,")
            .expect("data URL prefix");
        let decoded = STANDARD.decode(b64).expect("valid base64");
        // PNG signature
        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");

        let round = image::load_from_memory(&decoded).expect("decodes as image");
        assert_eq!((round.width(), round.height()), (10, 10));
    }

    #[test]
    fn float_images_are_encoded_as_16_bit() {
        let hdr = DynamicImage::ImageRgb32F(image::Rgb32FImage::from_pixel(
            12,
            6,
            image::Rgb([0.25, 0.5, 1.0]),
        ));
        let png = encode_png(&hdr).expect("float image should encode");
        let round = image::load_from_memory(&png).expect("decodes as image");
        assert_eq!((round.width(), round.height()), (12, 6));
        assert!(matches!(round, DynamicImage::ImageRgba16(_)));

        let with_alpha = DynamicImage::ImageRgba32F(image::Rgba32FImage::new(3, 3));
        assert!(image_to_data_url(&with_alpha).is_ok());
    }

    #[test]
    fn data_url_format() {
        assert_eq!(data_url("text/plain", b"hi"), "data:text/plain;base64,aGk=");
    }
}
