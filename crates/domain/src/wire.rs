//! Wire-level request options and the exchange record a send produces.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AwsV4Config;
use crate::proxy::ProxyPolicy;
use crate::request::HttpMethod;
use crate::tls::{ClientCertificate, TlsInfo, TlsOptions};

/// Ordered header list; duplicate names are allowed.
pub type HeaderList = Vec<(String, String)>;

/// First value of a header, case-insensitive.
#[must_use]
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Replace every header called `name` with a single value.
pub fn set_header(headers: &mut HeaderList, name: &str, value: impl Into<String>) {
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.into()));
}

/// Remove every header called `name`.
pub fn remove_header(headers: &mut HeaderList, name: &str) {
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
}

/// Content of one multipart part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PartContent {
    /// Inline text.
    Text(String),
    /// File read when the request is sent.
    File(PathBuf),
}

/// One multipart part, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartPart {
    /// Part name.
    pub name: String,
    /// Part content.
    pub content: PartContent,
    /// Explicit content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WireBody {
    /// No body.
    #[default]
    None,
    /// Text body (JSON, XML, url-encoded, ...).
    Text(String),
    /// Binary body.
    Bytes(Vec<u8>),
    /// Multipart parts; files are streamed by the transport.
    Multipart(Vec<MultipartPart>),
}

impl WireBody {
    /// Returns true for the empty body.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Body as text when it is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Bytes used for payload hashing; multipart bodies hash as empty.
    #[must_use]
    pub fn hashable_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
            Self::None | Self::Multipart(_) => &[],
        }
    }
}

/// Digest credentials answered after a 401 challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// A fully resolved request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including query.
    pub url: String,
    /// Headers in send order.
    pub headers: HeaderList,
    /// Body.
    pub body: WireBody,
    /// Timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Redirect budget.
    pub max_redirects: u32,
    /// Proxy decision.
    #[serde(default)]
    pub proxy: ProxyPolicy,
    /// Server verification.
    #[serde(default)]
    pub tls: TlsOptions,
    /// Client certificate chosen for the target host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<ClientCertificate>,
    /// Digest credentials, used after a 401 challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestCredentials>,
    /// AWS `SigV4` signing, applied before each send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_sigv4: Option<AwsV4Config>,
}

impl RequestOptions {
    /// Creates options with defaults for everything but method and URL.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderList::new(),
            body: WireBody::None,
            timeout_ms: None,
            max_redirects: crate::request::DEFAULT_MAX_REDIRECTS,
            proxy: ProxyPolicy::Direct,
            tls: TlsOptions::default(),
            client_certificate: None,
            digest: None,
            aws_sigv4: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: WireBody) -> Self {
        self.body = body;
        self
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// What happened at one point of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    /// A request left.
    Request,
    /// A response arrived.
    Response,
    /// A redirect was followed.
    Redirect,
    /// A digest challenge was answered.
    Auth,
    /// TLS or protocol negotiation detail.
    Tls,
    /// Anything else.
    Info,
    /// A failure.
    Error,
}

/// One timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub kind: TimelineKind,
    /// Human-readable message.
    pub message: String,
}

impl TimelineEntry {
    /// Entry stamped now.
    #[must_use]
    pub fn now(kind: TimelineKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        }
    }
}

/// Everything observed during one transport send; inspected, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HttpRequestInfo {
    /// URL actually requested.
    pub url: String,
    /// Status code; `None` when no HTTP response was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Reason phrase.
    #[serde(default)]
    pub status_text: String,
    /// Negotiated HTTP version, e.g. `HTTP/2.0`.
    #[serde(default)]
    pub http_version: String,
    /// Response headers in arrival order.
    #[serde(default)]
    pub headers: HeaderList,
    /// Raw, still-encoded body.
    #[serde(default)]
    pub body: Vec<u8>,
    /// Wall time of the send in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// TLS facts for secure connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsInfo>,
    /// Transport failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ordered events of this send.
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

impl HttpRequestInfo {
    /// A failed send.
    #[must_use]
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            url: url.into(),
            timeline: vec![TimelineEntry::now(TimelineKind::Error, error.clone())],
            error: Some(error),
            ..Self::default()
        }
    }

    /// First value of a response header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// The final response recorded on a request context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Final URL after redirects.
    pub url: String,
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// HTTP version.
    pub http_version: String,
    /// Response headers.
    pub headers: HeaderList,
    /// Decoded body bytes.
    #[serde(skip)]
    pub body: Vec<u8>,
    /// Body as seen by scripts: parsed JSON or a string.
    pub data: serde_json::Value,
    /// Size of the decoded body.
    pub size: usize,
    /// Total time across redirects in milliseconds.
    pub response_time_ms: u64,
    /// Where the body was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
    /// TLS facts of the final hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsInfo>,
    /// Annotation such as `redirect limit reached`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Response {
    /// First value of a response header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}
