//! # Upload Validation Module
//!
//! Validates incoming image uploads before any expensive work happens.
//! The checks are pure classification over the uploaded bytes: nothing
//! here touches disk, the OCR engine, or the network.

use crate::errors::error_logging;

/// Maximum accepted upload size in bytes (16 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// MIME types accepted for upload
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// An image as received at the request boundary, before validation
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Raw uploaded bytes
    pub bytes: Vec<u8>,
    /// MIME type declared by the client
    pub mime_type: String,
}

/// An upload that passed all validation checks
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Format detected from the magic bytes, which may differ from the
    /// declared MIME type
    pub format: image::ImageFormat,
}

impl ValidatedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Validation failure classification
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The upload contained no bytes
    Empty,
    /// Declared MIME type or detected format is not supported
    UnsupportedType(String),
    /// The upload exceeds [`MAX_UPLOAD_BYTES`]
    TooLarge(u64),
}

impl ValidationError {
    /// Localization key for the user-facing message
    pub fn message_key(&self) -> &'static str {
        match self {
            ValidationError::Empty => "error-empty-file",
            ValidationError::UnsupportedType(_) => "error-unsupported-type",
            ValidationError::TooLarge(_) => "error-too-large",
        }
    }

    /// Arguments interpolated into the localized message
    pub fn message_args(&self) -> Vec<(&'static str, String)> {
        match self {
            ValidationError::TooLarge(size) => vec![
                ("size_mb", format!("{:.1}", *size as f64 / (1024.0 * 1024.0))),
                ("max_mb", (MAX_UPLOAD_BYTES / (1024 * 1024)).to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "uploaded file is empty"),
            ValidationError::UnsupportedType(mime) => {
                write!(f, "unsupported image type: {}", mime)
            }
            ValidationError::TooLarge(size) => write!(
                f,
                "file too large: {} bytes (maximum allowed: {} bytes)",
                size, MAX_UPLOAD_BYTES
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate an uploaded image against format and size constraints.
///
/// Checks run cheapest-first: emptiness, declared MIME type, size, then a
/// magic-byte sniff with `image::guess_format` to confirm the bytes really
/// are one of the supported formats. The detected format is recorded on the
/// returned [`ValidatedImage`] and is authoritative over the declared type.
pub fn validate(upload: UploadedImage) -> Result<ValidatedImage, ValidationError> {
    if upload.bytes.is_empty() {
        let err = ValidationError::Empty;
        error_logging::log_validation_error(&err, "validate_upload", Some(&upload.mime_type), Some(0));
        return Err(err);
    }

    let declared = upload.mime_type.trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&declared.as_str()) {
        let err = ValidationError::UnsupportedType(declared);
        error_logging::log_validation_error(
            &err,
            "validate_upload",
            Some(&upload.mime_type),
            Some(upload.bytes.len() as u64),
        );
        return Err(err);
    }

    let size = upload.bytes.len() as u64;
    if size > MAX_UPLOAD_BYTES {
        let err = ValidationError::TooLarge(size);
        error_logging::log_validation_error(&err, "validate_upload", Some(&upload.mime_type), Some(size));
        return Err(err);
    }

    let format = match image::guess_format(&upload.bytes) {
        Ok(format) if is_supported_format(format) => format,
        Ok(format) => {
            let err = ValidationError::UnsupportedType(format!("{:?}", format));
            error_logging::log_validation_error(&err, "validate_upload", Some(&upload.mime_type), Some(size));
            return Err(err);
        }
        Err(_) => {
            let err = ValidationError::UnsupportedType(declared);
            error_logging::log_validation_error(&err, "validate_upload", Some(&upload.mime_type), Some(size));
            return Err(err);
        }
    };

    Ok(ValidatedImage {
        bytes: upload.bytes,
        mime_type: declared,
        format,
    })
}

fn is_supported_format(format: image::ImageFormat) -> bool {
    matches!(
        format,
        image::ImageFormat::Png
            | image::ImageFormat::Jpeg
            | image::ImageFormat::Gif
            | image::ImageFormat::Bmp
            | image::ImageFormat::WebP
    )
}
