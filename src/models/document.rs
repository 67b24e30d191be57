//! Uploaded identity document images.
//!
//! A document image is consumed once per submission and has no persisted
//! identity. The SHA-256 fingerprint only labels evaluation reports.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::image::{detect_kind, ImageError};

/// Image container formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Pnm,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
            ImageKind::Tiff => "tiff",
            ImageKind::Pnm => "pnm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Gif => "image/gif",
            ImageKind::Bmp => "image/bmp",
            ImageKind::Tiff => "image/tiff",
            ImageKind::Pnm => "image/x-portable-anymap",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/gif" => Some(ImageKind::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageKind::Bmp),
            "image/tiff" => Some(ImageKind::Tiff),
            "image/x-portable-anymap" | "image/x-portable-pixmap" => Some(ImageKind::Pnm),
            _ => None,
        }
    }

    /// Formats that vision endpoints accept as-is in a data URL.
    pub fn is_web_safe(&self) -> bool {
        matches!(self, ImageKind::Png | ImageKind::Jpeg | ImageKind::Gif)
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counter-clockwise rotation applied before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    /// All distinct rotations, in slider order.
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Quarter,
        Rotation::Half,
        Rotation::ThreeQuarters,
    ];

    /// Build from degrees. 360 is accepted and treated as no rotation.
    pub fn from_degrees(degrees: u32) -> Result<Self, ImageError> {
        match degrees {
            0 | 360 => Ok(Rotation::None),
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarters),
            other => Err(ImageError::InvalidRotation(other.to_string())),
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }
}

impl FromStr for Rotation {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Rotation::None);
        }
        let degrees: u32 = trimmed
            .parse()
            .map_err(|_| ImageError::InvalidRotation(trimmed.to_string()))?;
        Rotation::from_degrees(degrees)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = ImageError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        Rotation::from_degrees(degrees)
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// A user-supplied identity document image.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    bytes: Vec<u8>,
    kind: ImageKind,
    rotation: Rotation,
    file_name: Option<String>,
}

impl DocumentImage {
    /// Validate raw bytes against the size limit and detect their format.
    pub fn from_bytes(bytes: Vec<u8>, max_bytes: usize) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(ImageError::TooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }
        let kind = detect_kind(&bytes)?;

        Ok(Self {
            bytes,
            kind,
            rotation: Rotation::None,
            file_name: None,
        })
    }

    /// Read an image file from disk. Oversize files are rejected before reading.
    pub fn open(path: &Path, max_bytes: usize) -> Result<Self, ImageError> {
        let size = std::fs::metadata(path)?.len();
        if size > max_bytes as u64 {
            return Err(ImageError::TooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                max: max_bytes,
            });
        }

        let bytes = std::fs::read(path)?;
        let image = Self::from_bytes(bytes, max_bytes)?;
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => image.with_file_name(name),
            None => image,
        })
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the raw upload bytes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}
