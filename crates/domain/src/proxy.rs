//! HTTP proxy configuration.
//!
//! App-level proxy preferences, collection-level proxy overrides, and the
//! resolved [`ProxyPolicy`] a single request is sent with.

use serde::{Deserialize, Serialize};
use url::Url;

/// Type of proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    /// HTTP proxy.
    #[default]
    Http,
    /// HTTPS proxy (HTTP CONNECT).
    Https,
    /// SOCKS4 proxy.
    Socks4,
    /// SOCKS5 proxy.
    Socks5,
}

impl ProxyType {
    /// Get the default port for this proxy type.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http | Self::Https => 8080,
            Self::Socks4 | Self::Socks5 => 1080,
        }
    }

    /// Get the scheme for this proxy type.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
        }
    }
}

/// App-level proxy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Never proxy.
    #[default]
    Off,
    /// Use the configured proxy.
    On,
    /// Defer to the operating system's proxy environment.
    System,
}

/// Proxy credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProxyAuth {
    /// Whether credentials are sent.
    #[serde(default)]
    pub enabled: bool,
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
}

/// Proxy endpoint shared by preferences and collection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// Proxy type.
    #[serde(default)]
    pub protocol: ProxyType,
    /// Proxy host name.
    #[serde(default)]
    pub hostname: String,
    /// Proxy port; defaults per protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Optional credentials.
    #[serde(default)]
    pub auth: ProxyAuth,
    /// Comma-separated hosts that bypass the proxy.
    #[serde(default)]
    pub bypass_proxy: String,
}

impl ProxyEndpoint {
    /// Create an endpoint for a host and port.
    #[must_use]
    pub fn new(protocol: ProxyType, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            hostname: hostname.into(),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Set authentication credentials.
    #[must_use]
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = ProxyAuth {
            enabled: true,
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Set bypass hosts.
    #[must_use]
    pub fn with_bypass(mut self, hosts: impl Into<String>) -> Self {
        self.bypass_proxy = hosts.into();
        self
    }

    /// Get the proxy URL with authentication if present.
    ///
    /// Credentials are percent-encoded. `None` when the host is empty or
    /// not a valid URL host.
    #[must_use]
    pub fn url_with_auth(&self) -> Option<String> {
        let hostname = self.hostname.trim();
        if hostname.is_empty() {
            return None;
        }
        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        let mut url = Url::parse(&format!("{}://{hostname}:{port}", self.protocol.scheme())).ok()?;
        if self.auth.enabled && !self.auth.username.is_empty() {
            url.set_username(&self.auth.username).ok()?;
            url.set_password(Some(&self.auth.password)).ok()?;
        }
        Some(url.into())
    }

    /// Bypass entries, trimmed and lowercased.
    #[must_use]
    pub fn bypass_hosts(&self) -> Vec<String> {
        self.bypass_proxy
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect()
    }

    /// Check if a host should bypass the proxy.
    ///
    /// Entries may be `*`, an exact host, a `.suffix`, or a `*.suffix`.
    #[must_use]
    pub fn should_bypass(&self, host: &str) -> bool {
        let host_lower = host.to_lowercase();
        self.bypass_hosts().iter().any(|bypass| {
            if bypass == "*" {
                return true;
            }
            let pattern = bypass.trim_start_matches('*');
            pattern.strip_prefix('.').map_or_else(
                || host_lower == pattern || host_lower.ends_with(&format!(".{pattern}")),
                |suffix| host_lower == suffix || host_lower.ends_with(&format!(".{suffix}")),
            )
        })
    }
}

/// App-level proxy preferences.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProxySettings {
    /// Mode.
    #[serde(default)]
    pub mode: ProxyMode,
    /// Endpoint used when the mode is `on`.
    #[serde(flatten)]
    pub endpoint: ProxyEndpoint,
}

/// Collection proxy switch: on, off, or defer to app preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectionProxyEnabled {
    /// Explicitly on or off.
    Flag(bool),
    /// `"global"`: use app-level preferences.
    Keyword(GlobalKeyword),
}

/// The literal `"global"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalKeyword {
    /// `"global"`
    #[serde(rename = "global")]
    Global,
}

impl Default for CollectionProxyEnabled {
    fn default() -> Self {
        Self::Keyword(GlobalKeyword::Global)
    }
}

/// Collection-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CollectionProxy {
    /// Whether the collection proxy applies.
    #[serde(default)]
    pub enabled: CollectionProxyEnabled,
    /// Endpoint used when enabled.
    #[serde(flatten)]
    pub endpoint: ProxyEndpoint,
}

/// The proxy decision for one request.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyPolicy {
    /// Connect directly.
    #[default]
    Direct,
    /// Use the OS proxy environment.
    System,
    /// Use an explicit proxy endpoint.
    Manual(ProxyEndpoint),
}

impl ProxyPolicy {
    /// Returns the endpoint to use for `host`, honouring the bypass list.
    #[must_use]
    pub fn endpoint_for(&self, host: &str) -> Option<&ProxyEndpoint> {
        match self {
            Self::Manual(endpoint) if !endpoint.should_bypass(host) => Some(endpoint),
            _ => None,
        }
    }

    /// Whether any proxy may be used.
    #[must_use]
    pub const fn is_proxied(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}
