//! HTTP Request body types

use serde::{Deserialize, Serialize};

use super::KeyValue;

/// HTTP request body, discriminated by its editing mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RequestBody {
    /// No body
    #[default]
    None,
    /// JSON text, possibly with comments and `{{placeholders}}`.
    Json {
        /// Raw JSON source.
        json: String,
    },
    /// Plain text body.
    Text {
        /// Raw text.
        text: String,
    },
    /// XML body.
    Xml {
        /// Raw XML.
        xml: String,
    },
    /// SPARQL query body.
    Sparql {
        /// Raw SPARQL query.
        sparql: String,
    },
    /// `application/x-www-form-urlencoded` fields.
    FormUrlEncoded {
        /// Form fields, in declaration order.
        #[serde(default)]
        fields: Vec<KeyValue>,
    },
    /// `multipart/form-data` fields.
    MultipartForm {
        /// Text and file parts.
        #[serde(default)]
        fields: Vec<MultipartField>,
    },
    /// GraphQL query with JSON variables.
    Graphql {
        /// The query document.
        query: String,
        /// Variables as JSON source.
        #[serde(default)]
        variables: String,
    },
}

impl RequestBody {
    /// Creates a JSON body.
    #[must_use]
    pub fn json(content: impl Into<String>) -> Self {
        Self::Json {
            json: content.into(),
        }
    }

    /// Creates a plain text body.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            text: content.into(),
        }
    }

    /// Mode name as stored in collection files.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Json { .. } => "json",
            Self::Text { .. } => "text",
            Self::Xml { .. } => "xml",
            Self::Sparql { .. } => "sparql",
            Self::FormUrlEncoded { .. } => "formUrlEncoded",
            Self::MultipartForm { .. } => "multipartForm",
            Self::Graphql { .. } => "graphql",
        }
    }

    /// Default content type for this body mode.
    #[must_use]
    pub const fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Json { .. } | Self::Graphql { .. } => Some("application/json"),
            Self::Text { .. } => Some("text/plain"),
            Self::Xml { .. } => Some("application/xml"),
            Self::Sparql { .. } => Some("application/sparql-query"),
            Self::FormUrlEncoded { .. } => Some("application/x-www-form-urlencoded"),
            Self::MultipartForm { .. } => Some("multipart/form-data"),
        }
    }

    /// Returns true for the empty body.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MultipartField {
    /// A plain text part.
    Text {
        /// Part name.
        name: String,
        /// Part value.
        value: String,
        /// Explicit content type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        /// Whether the part is sent.
        #[serde(default = "default_true")]
        enabled: bool,
    },
    /// One or more files, relative to the collection root or absolute.
    File {
        /// Part name.
        name: String,
        /// File paths.
        paths: Vec<String>,
        /// Explicit content type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        /// Whether the part is sent.
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl MultipartField {
    /// Whether the part is sent.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        match self {
            Self::Text { enabled, .. } | Self::File { enabled, .. } => *enabled,
        }
    }
}

const fn default_true() -> bool {
    true
}
