//! Image validation, format detection, and rotation for uploaded documents.
//!
//! Uploads are sniffed by content rather than by file extension. Anything the
//! `image` crate cannot decode is rejected before a request is ever built.

use std::io::Cursor;

use base64::Engine;
use thiserror::Error;

use crate::models::{DocumentImage, ImageKind, Rotation};

/// Errors raised while validating or preparing a document image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image is empty")]
    Empty,

    #[error("Image is {size} bytes, maximum is {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported image format: {0}")]
    Unsupported(String),

    #[error("Image could not be decoded: {0}")]
    Corrupt(String),

    #[error("Invalid rotation '{0}', expected one of 0, 90, 180, 270, 360")]
    InvalidRotation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An image ready to embed in an API request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    /// Format as a `data:` URL for OpenAI-style `image_url` content parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Detect the container format of raw image bytes.
pub fn detect_kind(bytes: &[u8]) -> Result<ImageKind, ImageError> {
    if let Some(kind) = infer::get(bytes) {
        return ImageKind::from_mime(kind.mime_type())
            .ok_or_else(|| ImageError::Unsupported(kind.mime_type().to_string()));
    }

    // infer has no matcher for netpbm, the image crate does
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Pnm) => Ok(ImageKind::Pnm),
        Ok(other) => Err(ImageError::Unsupported(format!("{:?}", other))),
        Err(_) => Err(ImageError::Unsupported("unrecognized content".to_string())),
    }
}

/// Decode, rotate if requested, and base64 encode a document image.
///
/// Unrotated PNG, JPEG and GIF uploads are passed through byte for byte. Rotated
/// images and formats that vision endpoints commonly refuse (BMP, TIFF, PNM)
/// are re-encoded as PNG.
pub fn prepare_payload(document: &DocumentImage) -> Result<EncodedImage, ImageError> {
    let decoded = image::load_from_memory(document.bytes())
        .map_err(|e| ImageError::Corrupt(e.to_string()))?;

    let passthrough = document.rotation() == Rotation::None && document.kind().is_web_safe();
    if passthrough {
        return Ok(EncodedImage {
            mime_type: document.kind().mime_type(),
            base64: base64::engine::general_purpose::STANDARD.encode(document.bytes()),
        });
    }

    let rotated = rotate(decoded, document.rotation());
    let mut png = Vec::new();
    rotated
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ImageError::Corrupt(format!("re-encoding failed: {}", e)))?;

    Ok(EncodedImage {
        mime_type: ImageKind::Png.mime_type(),
        base64: base64::engine::general_purpose::STANDARD.encode(&png),
    })
}

/// Rotate counter-clockwise by the given step.
pub fn rotate(image: image::DynamicImage, rotation: Rotation) -> image::DynamicImage {
    match rotation {
        Rotation::None => image,
        Rotation::Quarter => image.rotate270(),
        Rotation::Half => image.rotate180(),
        Rotation::ThreeQuarters => image.rotate90(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{jpeg_bytes, png_bytes};
    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind(&png_bytes(4, 2)).unwrap(), ImageKind::Png);
        assert_eq!(detect_kind(&jpeg_bytes(4, 2)).unwrap(), ImageKind::Jpeg);
        assert_eq!(detect_kind(b"P6\n2 1\n255\n\0\0\0\0\0\0").unwrap(), ImageKind::Pnm);
        assert!(matches!(
            detect_kind(b"%PDF-1.7 not an image"),
            Err(ImageError::Unsupported(_))
        ));
        assert!(matches!(
            detect_kind(b"hello"),
            Err(ImageError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unrotated_png_is_passed_through() {
        let bytes = png_bytes(4, 2);
        let doc = DocumentImage::from_bytes(bytes.clone(), 1024 * 1024).unwrap();
        let payload = prepare_payload(&doc).unwrap();

        assert_eq!(payload.mime_type, "image/png");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&payload.base64)
            .unwrap();
        assert_eq!(decoded, bytes);
        assert!(payload.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let doc = DocumentImage::from_bytes(jpeg_bytes(6, 2), 1024 * 1024)
            .unwrap()
            .with_rotation(Rotation::Quarter);
        let payload = prepare_payload(&doc).unwrap();

        assert_eq!(payload.mime_type, "image/png");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&payload.base64)
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (2, 6));
    }

    #[test]
    fn test_half_turn_keeps_dimensions() {
        let doc = DocumentImage::from_bytes(png_bytes(6, 2), 1024 * 1024)
            .unwrap()
            .with_rotation(Rotation::Half);
        let payload = prepare_payload(&doc).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&payload.base64)
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (6, 2));
    }

    #[test]
    fn test_truncated_png_is_corrupt() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(40);
        let doc = DocumentImage::from_bytes(bytes, 1024 * 1024).unwrap();
        assert!(matches!(prepare_payload(&doc), Err(ImageError::Corrupt(_))));
    }
}
