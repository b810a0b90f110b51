//! HAR 1.2 request objects.
//!
//! The snippet generators work from this shape rather than from the wire
//! request, so every language sees the same query split and body params.

use courier_domain::wire::{PartContent, RequestOptions, WireBody, header_value};
use serde::{Deserialize, Serialize};
use url::Url;

/// A HAR `request` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    /// Upper-case method.
    pub method: String,
    /// Full URL including the query string.
    pub url: String,
    /// Always `HTTP/1.1`.
    pub http_version: String,
    /// Headers in send order.
    pub headers: Vec<HarHeader>,
    /// Query parameters parsed from the URL.
    pub query_string: Vec<HarHeader>,
    /// Body, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
    /// Unknown.
    pub headers_size: i64,
    /// Body length in bytes, `-1` without a body.
    pub body_size: i64,
}

/// Name/value pair used for headers and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarHeader {
    /// Name.
    pub name: String,
    /// Value.
    pub value: String,
}

/// A HAR `postData` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    /// Declared content type.
    pub mime_type: String,
    /// Raw text for non-form bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Params for url-encoded and multipart bodies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<HarParam>,
}

/// One form param.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarParam {
    /// Field name.
    pub name: String,
    /// Text value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// File path for file parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Part content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

fn post_data(options: &RequestOptions) -> Option<HarPostData> {
    let mime_type = header_value(&options.headers, "content-type")
        .unwrap_or_default()
        .to_string();
    match &options.body {
        WireBody::None => None,
        WireBody::Text(text) if mime_type.starts_with("application/x-www-form-urlencoded") => {
            let params = url::form_urlencoded::parse(text.as_bytes())
                .map(|(name, value)| HarParam {
                    name: name.into_owned(),
                    value: Some(value.into_owned()),
                    file_name: None,
                    content_type: None,
                })
                .collect();
            Some(HarPostData {
                mime_type,
                text: Some(text.clone()),
                params,
            })
        }
        WireBody::Text(text) => Some(HarPostData {
            mime_type,
            text: Some(text.clone()),
            params: Vec::new(),
        }),
        WireBody::Bytes(bytes) => Some(HarPostData {
            mime_type,
            text: Some(String::from_utf8_lossy(bytes).into_owned()),
            params: Vec::new(),
        }),
        WireBody::Multipart(parts) => Some(HarPostData {
            mime_type: "multipart/form-data".to_string(),
            text: None,
            params: parts
                .iter()
                .map(|part| match &part.content {
                    PartContent::Text(value) => HarParam {
                        name: part.name.clone(),
                        value: Some(value.clone()),
                        file_name: None,
                        content_type: part.content_type.clone(),
                    },
                    PartContent::File(path) => HarParam {
                        name: part.name.clone(),
                        value: None,
                        file_name: Some(path.display().to_string()),
                        content_type: part.content_type.clone(),
                    },
                })
                .collect(),
        }),
    }
}

/// Converts a wire request into a HAR request.
#[must_use]
pub fn har_request(options: &RequestOptions) -> HarRequest {
    let query_string = Url::parse(&options.url)
        .map(|url| {
            url.query_pairs()
                .map(|(name, value)| HarHeader {
                    name: name.into_owned(),
                    value: value.into_owned(),
                })
                .collect()
        })
        .unwrap_or_default();
    let body_size = match &options.body {
        WireBody::None | WireBody::Multipart(_) => -1,
        WireBody::Text(text) => i64::try_from(text.len()).unwrap_or(i64::MAX),
        WireBody::Bytes(bytes) => i64::try_from(bytes.len()).unwrap_or(i64::MAX),
    };

    HarRequest {
        method: options.method.as_str().to_uppercase(),
        url: options.url.clone(),
        http_version: "HTTP/1.1".to_string(),
        headers: options
            .headers
            .iter()
            .map(|(name, value)| HarHeader {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
        query_string,
        post_data: post_data(options),
        headers_size: -1,
        body_size,
    }
}
