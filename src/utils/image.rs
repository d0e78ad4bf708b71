use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024; // 5 MB
pub const MIN_DIMENSION: u32 = 200;
pub const MAX_DIMENSION: u32 = 2048;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image must be smaller than 5MB")]
    TooLarge,

    #[error("Only JPG, PNG, and WebP images are allowed")]
    UnsupportedType,

    #[error("Image dimensions must be smaller than 2048×2048 pixels")]
    DimensionsTooLarge,

    #[error("Image must be at least 200×200 pixels for clear visibility")]
    DimensionsTooSmall,

    #[error("Invalid image file or corrupted data")]
    Corrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// Leading bytes must agree with the declared type.
    fn matches_magic_bytes(&self, data: &[u8]) -> bool {
        match self {
            Self::Jpeg => data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
            Self::Png => data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47],
            Self::WebP => {
                data.len() >= 12
                    && data[..4] == [0x52, 0x49, 0x46, 0x46]
                    && data[8..12] == [0x57, 0x45, 0x42, 0x50]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// An uploaded image that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub kind: ImageKind,
    pub dimensions: ImageDimensions,
    pub data: Vec<u8>,
}

/// Size and type checks. Size is checked first.
pub fn validate_image_file(size: usize, content_type: &str) -> Result<ImageKind, ImageError> {
    if size > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge);
    }

    let normalized = content_type.trim().to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&normalized.as_str()) {
        return Err(ImageError::UnsupportedType);
    }

    ImageKind::from_content_type(&normalized).ok_or(ImageError::UnsupportedType)
}

/// Decode the header and enforce the [200, 2048] band on both axes.
pub fn validate_image_dimensions(data: &[u8]) -> Result<ImageDimensions, ImageError> {
    let size = imagesize::blob_size(data).map_err(|_| ImageError::Corrupted)?;
    let width = u32::try_from(size.width).map_err(|_| ImageError::DimensionsTooLarge)?;
    let height = u32::try_from(size.height).map_err(|_| ImageError::DimensionsTooLarge)?;

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImageError::DimensionsTooLarge);
    }
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(ImageError::DimensionsTooSmall);
    }

    Ok(ImageDimensions { width, height })
}

/// Full validation of an uploaded image.
pub fn validate_image(data: Vec<u8>, content_type: &str) -> Result<ValidatedImage, ImageError> {
    let kind = validate_image_file(data.len(), content_type)?;
    if !kind.matches_magic_bytes(&data) {
        return Err(ImageError::Corrupted);
    }
    let dimensions = validate_image_dimensions(&data)?;

    Ok(ValidatedImage {
        kind,
        dimensions,
        data,
    })
}

/// Human readable size: `0 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Local preview shown before submission. Nothing is persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImagePreview {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub size: String,
    pub content_type: String,
}

impl ImagePreview {
    pub fn from_image(image: &ValidatedImage) -> Self {
        Self {
            data_url: format!(
                "data:{};base64,{}",
                image.kind.mime_type(),
                STANDARD.encode(&image.data)
            ),
            width: image.dimensions.width,
            height: image.dimensions.height,
            size: format_file_size(image.data.len() as u64),
            content_type: image.kind.mime_type().to_string(),
        }
    }
}
