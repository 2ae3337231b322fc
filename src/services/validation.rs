//! Upload validation: extension allow-lists, size caps, and content-type
//! inference. Files are checked here before anything reaches the entity
//! store or blob store.

use crate::services::blob_store::extension;
use thiserror::Error;

const ALLOWED_AUDIO: [&str; 7] = [".mp3", ".wav", ".flac", ".aac", ".ogg", ".m4a", ".wma"];
const ALLOWED_IMAGE: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

const MAX_AUDIO_BYTES: i64 = 75 * 1024 * 1024;
const MAX_IMAGE_BYTES: i64 = 15 * 1024 * 1024;

/// Category a validated upload falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("file type `{0}` is not allowed")]
    DisallowedExtension(String),
    #[error("file of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: i64, limit: i64 },
}

/// Validate an upload against the allow-lists and size caps.
pub fn validate_upload(file_name: &str, size_bytes: i64) -> Result<FileKind, ValidationError> {
    let ext = extension(file_name);
    if ALLOWED_AUDIO.contains(&ext.as_str()) {
        if size_bytes > MAX_AUDIO_BYTES {
            return Err(ValidationError::TooLarge {
                size: size_bytes,
                limit: MAX_AUDIO_BYTES,
            });
        }
        return Ok(FileKind::Audio);
    }
    if ALLOWED_IMAGE.contains(&ext.as_str()) {
        if size_bytes > MAX_IMAGE_BYTES {
            return Err(ValidationError::TooLarge {
                size: size_bytes,
                limit: MAX_IMAGE_BYTES,
            });
        }
        return Ok(FileKind::Image);
    }
    Err(ValidationError::DisallowedExtension(ext))
}

/// Validate an upload that must be an image (artwork, image comments).
pub fn validate_image(file_name: &str, size_bytes: i64) -> Result<(), ValidationError> {
    match validate_upload(file_name, size_bytes)? {
        FileKind::Image => Ok(()),
        FileKind::Audio => Err(ValidationError::DisallowedExtension(extension(file_name))),
    }
}

/// MIME type inferred from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension(file_name).as_str() {
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".flac" => "audio/flac",
        ".aac" => "audio/aac",
        ".ogg" => "audio/ogg",
        ".m4a" => "audio/mp4",
        ".wma" => "audio/x-ms-wma",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
