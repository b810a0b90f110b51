//! How a response body should be shown.

use serde::{Deserialize, Serialize};

/// Preview mode for a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "mime", rename_all = "lowercase")]
pub enum PreviewMode {
    /// Pretty-printed JSON.
    Json,
    /// Pretty-printed XML.
    Xml,
    /// Rendered HTML.
    Html,
    /// Plain text.
    Text,
    /// Image with its MIME type.
    Image(String),
    /// Video with its MIME type.
    Video(String),
    /// Audio with its MIME type.
    Audio(String),
    /// PDF document.
    Pdf,
    /// Opaque bytes.
    Binary,
}

/// Chooses a preview mode from the content type, falling back to the
/// first bytes of the body when the header is absent or generic.
#[must_use]
pub fn determine_preview_mode(content_type: Option<&str>, body: &[u8]) -> PreviewMode {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_lowercase())
        .unwrap_or_default();

    if !is_generic(&mime) {
        if let Some(mode) = from_mime(&mime) {
            return mode;
        }
    }

    if let Some(mode) = sniff(body) {
        return mode;
    }

    if std::str::from_utf8(body).is_ok() {
        PreviewMode::Text
    } else {
        PreviewMode::Binary
    }
}

fn is_generic(mime: &str) -> bool {
    matches!(
        mime,
        "" | "application/octet-stream" | "binary/octet-stream" | "application/unknown"
    )
}

fn from_mime(mime: &str) -> Option<PreviewMode> {
    if mime.contains("json") {
        return Some(PreviewMode::Json);
    }
    if mime.contains("html") {
        return Some(PreviewMode::Html);
    }
    if mime.contains("xml") {
        return Some(PreviewMode::Xml);
    }
    if mime == "application/pdf" {
        return Some(PreviewMode::Pdf);
    }
    if mime.starts_with("image/") {
        return Some(PreviewMode::Image(mime.to_string()));
    }
    if mime.starts_with("video/") {
        return Some(PreviewMode::Video(mime.to_string()));
    }
    if mime.starts_with("audio/") {
        return Some(PreviewMode::Audio(mime.to_string()));
    }
    if mime.starts_with("text/") || mime.contains("javascript") {
        return Some(PreviewMode::Text);
    }
    None
}

fn sniff(body: &[u8]) -> Option<PreviewMode> {
    let image = |mime: &str| Some(PreviewMode::Image(mime.to_string()));
    match body {
        [0x89, b'P', b'N', b'G', ..] => image("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => image("image/jpeg"),
        [b'G', b'I', b'F', b'8', ..] => image("image/gif"),
        [b'B', b'M', ..] => image("image/bmp"),
        [0x00, 0x00, 0x01, 0x00, ..] => image("image/x-icon"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => image("image/webp"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => {
            Some(PreviewMode::Audio("audio/wav".to_string()))
        }
        [b'%', b'P', b'D', b'F', ..] => Some(PreviewMode::Pdf),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => {
            Some(PreviewMode::Video("video/mp4".to_string()))
        }
        [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(PreviewMode::Video("video/webm".to_string())),
        [b'I', b'D', b'3', ..] => Some(PreviewMode::Audio("audio/mpeg".to_string())),
        [b'O', b'g', b'g', b'S', ..] => Some(PreviewMode::Audio("audio/ogg".to_string())),
        _ => None,
    }
}
