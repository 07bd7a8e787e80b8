//! Image encoding: screenshot file → base64 payload for the vision request.
//!
//! The Messages API takes images inline as base64 with an explicit media
//! type. Screenshots are read back from disk rather than kept in memory so a
//! 60-slide deck never holds every decoded bitmap at once.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// A base64-encoded image ready to embed in a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
    /// e.g. `image/png`.
    pub media_type: String,
}

impl ImageData {
    pub fn new(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Encode raw image bytes.
    pub fn from_bytes(bytes: &[u8], media_type: impl Into<String>) -> Self {
        Self::new(STANDARD.encode(bytes), media_type)
    }
}

/// Read a screenshot from disk and base64-encode it.
pub async fn load_image(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    let data = ImageData::from_bytes(&bytes, media_type_for(path));
    debug!(
        "Encoded {} → {} bytes base64",
        path.display(),
        data.data.len()
    );
    Ok(data)
}

/// Media type inferred from the file extension; PNG when unknown.
pub fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}
