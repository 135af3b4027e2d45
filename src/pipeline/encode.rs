//! Image encoding: pixels or raw image bytes → base64 `ImageData`.
//!
//! Both model backends receive images as base64 payloads: the provider
//! backend hands `ImageData` to `edgequake-llm`, the chat-completions backend
//! inlines it as a `data:` URI. Rendered PDF pages are encoded as lossless
//! PNG; uploaded images keep their original bytes and MIME type.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the model.
///
/// `detail: "high"` asks OpenAI-class models for the full tile budget so
/// small print on forms stays legible.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Wrap already-encoded image bytes without decoding them.
///
/// Returns `None` when the bytes are not a recognisable image format.
pub fn encode_image_bytes(bytes: &[u8]) -> Option<ImageData> {
    let format = image::guess_format(bytes).ok()?;
    let mime = format.to_mime_type();
    let b64 = STANDARD.encode(bytes);
    debug!("Passing through {} image → {} bytes base64", mime, b64.len());
    Some(ImageData::new(b64, mime).with_detail("high"))
}

/// Render `image` as a `data:` URI.
pub fn data_uri(image: &ImageData) -> String {
    format!("data:{};base64,{}", image.mime_type, image.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(&red_square()).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn passthrough_keeps_bytes_and_mime() {
        let mut png = Vec::new();
        red_square()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let data = encode_image_bytes(&png).expect("png is recognised");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), png);
    }

    #[test]
    fn passthrough_rejects_garbage() {
        assert!(encode_image_bytes(b"definitely not an image").is_none());
        assert!(encode_image_bytes(&[]).is_none());
    }

    #[test]
    fn data_uri_format() {
        let data = ImageData::new("QUJD".to_string(), "image/jpeg");
        assert_eq!(data_uri(&data), "data:image/jpeg;base64,QUJD");
    }
}
