//! Request items: the leaves of a collection tree.

use serde::{Deserialize, Serialize};

use super::{HttpMethod, RequestBody};
use crate::auth::AuthConfig;
use crate::scripting::{RequestScripts, RequestVars};
use crate::testing::AssertionSpec;

/// Default redirect budget when a request does not set one.
pub const DEFAULT_MAX_REDIRECTS: u32 = 25;

/// A name/value pair with an enabled flag (headers, form fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Name.
    pub name: String,
    /// Value, may contain `{{placeholders}}`.
    #[serde(default)]
    pub value: String,
    /// Whether the pair is sent.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl KeyValue {
    /// Creates an enabled pair.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Where a parameter lives in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// `?name=value`
    #[default]
    Query,
    /// `/:name/`
    Path,
}

/// A URL parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParam {
    /// Parameter name (without the leading `:` for path params).
    pub name: String,
    /// Parameter value.
    #[serde(default)]
    pub value: String,
    /// Query or path.
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    /// Whether the parameter is sent.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RequestParam {
    /// Creates an enabled query parameter.
    #[must_use]
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: ParamKind::Query,
            enabled: true,
        }
    }

    /// Creates a path parameter.
    #[must_use]
    pub fn path(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: ParamKind::Path,
            enabled: true,
        }
    }
}

/// Per-request transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestSettings {
    /// Maximum redirects to follow; defaults to 25.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_redirects: Option<u32>,
    /// Request timeout in milliseconds; falls back to preferences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// The editable definition of one HTTP or GraphQL request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HttpRequest {
    /// Target URL, may contain placeholders and `:path` segments.
    #[serde(default)]
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: HttpMethod,
    /// Query and path parameters.
    #[serde(default)]
    pub params: Vec<RequestParam>,
    /// Request headers.
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Authentication mode.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Request body.
    #[serde(default)]
    pub body: RequestBody,
    /// Pre-request and post-response scripts.
    #[serde(default)]
    pub script: RequestScripts,
    /// Pre-request and post-response variables.
    #[serde(default)]
    pub vars: RequestVars,
    /// Declarative assertions.
    #[serde(default)]
    pub assertions: Vec<AssertionSpec>,
    /// Test script source.
    #[serde(default)]
    pub tests: String,
    /// Transport settings.
    #[serde(default)]
    pub settings: RequestSettings,
}

impl HttpRequest {
    /// Creates a request with the given method and URL.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Effective redirect budget.
    #[must_use]
    pub fn max_redirects(&self) -> u32 {
        self.settings.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS)
    }

    /// Enabled path parameters.
    pub fn path_params(&self) -> impl Iterator<Item = &RequestParam> {
        self.params
            .iter()
            .filter(|p| p.enabled && p.kind == ParamKind::Path)
    }

    /// Enabled query parameters.
    pub fn query_params(&self) -> impl Iterator<Item = &RequestParam> {
        self.params
            .iter()
            .filter(|p| p.enabled && p.kind == ParamKind::Query)
    }
}

/// A request leaf in the collection tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    /// Stable identifier.
    pub uid: String,
    /// Display name, also the target of `setNextRequest`.
    pub name: String,
    /// The saved request.
    pub request: HttpRequest,
    /// Unsaved edits; shadows `request` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<HttpRequest>,
}

impl RequestItem {
    /// Creates an item without a draft.
    #[must_use]
    pub fn new(uid: impl Into<String>, name: impl Into<String>, request: HttpRequest) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            request,
            draft: None,
        }
    }

    /// The draft if present, the saved request otherwise.
    #[must_use]
    pub fn effective_request(&self) -> &HttpRequest {
        self.draft.as_ref().unwrap_or(&self.request)
    }
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_draft_shadows_request() {
        let mut item = RequestItem::new(
            "r1",
            "Get user",
            HttpRequest::new(HttpMethod::Get, "https://a.test"),
        );
        assert_eq!(item.effective_request().url, "https://a.test");

        item.draft = Some(HttpRequest::new(HttpMethod::Post, "https://b.test"));
        assert_eq!(item.effective_request().url, "https://b.test");
        assert_eq!(item.effective_request().method, HttpMethod::Post);
    }

    #[test]
    fn test_max_redirects_default() {
        let mut request = HttpRequest::default();
        assert_eq!(request.max_redirects(), 25);
        request.settings.max_redirects = Some(3);
        assert_eq!(request.max_redirects(), 3);
    }

    #[test]
    fn test_param_filters() {
        let mut request = HttpRequest::default();
        request.params = vec![
            RequestParam::path("id", "42"),
            RequestParam::query("q", "x"),
            RequestParam {
                enabled: false,
                ..RequestParam::query("off", "1")
            },
        ];
        assert_eq!(request.path_params().count(), 1);
        assert_eq!(request.query_params().count(), 1);
    }

    #[test]
    fn test_param_kind_serde_name() {
        let param: RequestParam =
            serde_json::from_str(r#"{"name":"id","value":"1","type":"path"}"#).unwrap();
        assert_eq!(param.kind, ParamKind::Path);
        assert!(param.enabled);
    }
}
