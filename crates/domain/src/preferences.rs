//! Caller preferences that shape how requests are sent.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::proxy::ProxySettings;
use crate::tls::TlsOptions;

/// Extra CA bundle.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CustomCaCertificate {
    /// Whether the bundle is used.
    #[serde(default)]
    pub enabled: bool,
    /// PEM bundle path.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

/// Request-related preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestPreferences {
    /// Verify server certificates and abort on failure.
    #[serde(default = "default_true")]
    pub ssl_verification: bool,
    /// Extra CA bundle.
    #[serde(default)]
    pub custom_ca_certificate: CustomCaCertificate,
    /// Keep bundled roots when a custom CA is set.
    #[serde(default = "default_true")]
    pub keep_default_ca_certificates: bool,
    /// Default timeout in milliseconds; 0 disables it.
    #[serde(default)]
    pub timeout_ms: u64,
    /// Persist `Set-Cookie` headers into the shared jar.
    #[serde(default = "default_true")]
    pub store_cookies: bool,
    /// Send matching cookies from the shared jar.
    #[serde(default = "default_true")]
    pub send_cookies: bool,
}

impl Default for RequestPreferences {
    fn default() -> Self {
        Self {
            ssl_verification: true,
            custom_ca_certificate: CustomCaCertificate::default(),
            keep_default_ca_certificates: true,
            timeout_ms: 0,
            store_cookies: true,
            send_cookies: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// All caller preferences.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Preferences {
    /// Request preferences.
    #[serde(default)]
    pub request: RequestPreferences,
    /// App-level proxy.
    #[serde(default)]
    pub proxy: ProxySettings,
}

impl Preferences {
    /// TLS options implied by these preferences.
    #[must_use]
    pub fn tls_options(&self) -> TlsOptions {
        let ca = &self.request.custom_ca_certificate;
        TlsOptions {
            verify: self.request.ssl_verification,
            ca_file: ca.enabled.then(|| ca.file_path.clone()).flatten(),
            keep_default_roots: self.request.keep_default_ca_certificates,
        }
    }

    /// Default timeout, if any.
    #[must_use]
    pub const fn timeout_ms(&self) -> Option<u64> {
        if self.request.timeout_ms == 0 {
            None
        } else {
            Some(self.request.timeout_ms)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert!(prefs.request.ssl_verification);
        assert!(prefs.request.store_cookies);
        assert!(prefs.request.send_cookies);
        assert_eq!(prefs.timeout_ms(), None);
    }

    #[test]
    fn test_tls_options_ignores_disabled_ca() {
        let mut prefs = Preferences::default();
        prefs.request.custom_ca_certificate.file_path = Some(PathBuf::from("/tmp/ca.pem"));
        assert_eq!(prefs.tls_options().ca_file, None);

        prefs.request.custom_ca_certificate.enabled = true;
        assert_eq!(
            prefs.tls_options().ca_file,
            Some(PathBuf::from("/tmp/ca.pem"))
        );
    }
}
