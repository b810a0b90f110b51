//! Multipart body building.
//!
//! Text parts go in as they are; file parts are read when the request is
//! sent, named after the file and typed from its extension.

use std::path::Path;

use courier_domain::wire::{MultipartPart, PartContent};
use reqwest::multipart::{Form, Part};

/// Error type for body building operations.
#[derive(Debug, thiserror::Error)]
pub enum BodyBuildError {
    /// Failed to read a file part.
    #[error("failed to read file {path}: {message}")]
    FileRead {
        /// The file.
        path: String,
        /// OS message.
        message: String,
    },

    /// A part declared an unusable content type.
    #[error("invalid content type '{content_type}' for part '{name}'")]
    InvalidContentType {
        /// Part name.
        name: String,
        /// The rejected value.
        content_type: String,
    },
}

/// MIME type guessed from a file extension.
#[must_use]
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

async fn file_part(name: &str, path: &Path, content_type: Option<&str>) -> Result<Part, BodyBuildError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| BodyBuildError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let mime = content_type.map_or_else(|| guess_content_type(path), str::to_string);
    Part::bytes(content)
        .file_name(filename)
        .mime_str(&mime)
        .map_err(|_| BodyBuildError::InvalidContentType {
            name: name.to_string(),
            content_type: mime,
        })
}

/// Builds a multipart form from resolved parts.
///
/// # Errors
///
/// Fails when a file cannot be read or a content type does not parse.
pub async fn build_form(parts: &[MultipartPart]) -> Result<Form, BodyBuildError> {
    let mut form = Form::new();
    for part in parts {
        let built = match &part.content {
            PartContent::Text(value) => {
                let text = Part::text(value.clone());
                match &part.content_type {
                    Some(content_type) => text.mime_str(content_type).map_err(|_| {
                        BodyBuildError::InvalidContentType {
                            name: part.name.clone(),
                            content_type: content_type.clone(),
                        }
                    })?,
                    None => text,
                }
            }
            PartContent::File(path) => file_part(&part.name, path, part.content_type.as_deref()).await?,
        };
        form = form.part(part.name.clone(), built);
    }
    Ok(form)
}
