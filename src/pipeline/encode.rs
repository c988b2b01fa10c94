//! Image encoding: `DynamicImage` → PNG + base64 [`EncodedPage`].
//!
//! PNG is chosen over JPEG because it is lossless; text crispness matters
//! far more than file size for OCR accuracy, and compression artefacts on
//! rendered glyphs measurably degrade recognition.

use crate::error::PageError;
use crate::services::EncodedPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page for the OCR request body.
pub fn encode_page(page: u32, img: &DynamicImage) -> Result<EncodedPage, PageError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("image encoding failed: {e}"),
        })?;

    let base64 = STANDARD.encode(&png);
    debug!("Encoded page {} → {} bytes base64", page, base64.len());

    Ok(EncodedPage { page, png, base64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let encoded = encode_page(3, &img).expect("encode should succeed");
        assert_eq!(encoded.page, 3);
        assert!(!encoded.png.is_empty());
        let decoded = STANDARD.decode(&encoded.base64).expect("valid base64");
        assert_eq!(decoded, encoded.png);
    }
}
