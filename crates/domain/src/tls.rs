//! TLS configuration and certificate information.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server verification settings for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsOptions {
    /// Reject connections whose certificate chain does not verify.
    pub verify: bool,
    /// Extra CA bundle (PEM).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Keep the default trust roots alongside `ca_file`.
    pub keep_default_roots: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify: true,
            ca_file: None,
            keep_default_roots: true,
        }
    }
}

impl TlsOptions {
    /// Options that skip verification.
    #[must_use]
    pub fn insecure() -> Self {
        Self {
            verify: false,
            ..Self::default()
        }
    }
}

/// Client certificate material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CertificateSource {
    /// Separate PEM certificate and key files.
    Cert {
        /// Certificate chain (PEM).
        cert_file_path: PathBuf,
        /// Private key (PEM).
        key_file_path: PathBuf,
    },
    /// PKCS#12 bundle.
    Pfx {
        /// Bundle path.
        pfx_file_path: PathBuf,
    },
}

/// Client certificate for mTLS, selected by host pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Host pattern: literal host, `host:port`, or `*.suffix`.
    pub domain: String,
    /// Certificate source.
    #[serde(flatten)]
    pub source: CertificateSource,
    /// Passphrase for encrypted keys or bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl ClientCertificate {
    /// Create from PEM files.
    #[must_use]
    pub fn from_pem_files(
        domain: impl Into<String>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            domain: domain.into(),
            source: CertificateSource::Cert {
                cert_file_path: cert_path.into(),
                key_file_path: key_path.into(),
            },
            passphrase: None,
        }
    }

    /// Whether this certificate applies to `host` (with optional `port`).
    #[must_use]
    pub fn matches(&self, host: &str, port: Option<u16>) -> bool {
        let pattern = self
            .domain
            .trim()
            .trim_start_matches("https://")
            .to_lowercase();
        let host = host.to_lowercase();
        if pattern.is_empty() {
            return false;
        }
        if glob_match(&pattern, &host) {
            return true;
        }
        port.is_some_and(|p| glob_match(&pattern, &format!("{host}:{p}")))
    }
}

/// Client certificates configured on a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClientCertificates {
    /// Whether any certificate is considered.
    #[serde(default)]
    pub enabled: bool,
    /// Candidates, first match wins.
    #[serde(default)]
    pub certs: Vec<ClientCertificate>,
}

impl ClientCertificates {
    /// First certificate matching the host, if enabled.
    #[must_use]
    pub fn select(&self, host: &str, port: Option<u16>) -> Option<&ClientCertificate> {
        if !self.enabled {
            return None;
        }
        self.certs.iter().find(|c| c.matches(host, port))
    }
}

/// `*` matches any run of characters; everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(idx) = rest.find(part) {
            rest = &rest[idx + part.len()..];
        } else {
            return false;
        }
    }
    true
}

/// Metadata about one certificate presented by a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Subject common name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_cn: Option<String>,
    /// DNS subject alternative names.
    #[serde(default)]
    pub subject_alt_names: Vec<String>,
    /// Serial number (hex).
    pub serial_number: String,
    /// Not valid before.
    pub valid_from: DateTime<Utc>,
    /// Not valid after.
    pub valid_to: DateTime<Utc>,
    /// Subject equals issuer.
    pub self_signed: bool,
}

impl CertificateInfo {
    /// Check if the certificate is currently valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let now = Utc::now();
        now >= self.valid_from && now <= self.valid_to
    }

    /// Days until expiry (negative if expired).
    #[must_use]
    pub fn days_until_expiry(&self) -> i64 {
        (self.valid_to - Utc::now()).num_days()
    }

    /// Whether `host` matches the SANs, or the CN when there are none.
    #[must_use]
    pub fn matches_hostname(&self, host: &str) -> bool {
        if self.subject_alt_names.is_empty() {
            return self
                .subject_cn
                .as_deref()
                .is_some_and(|cn| hostname_matches(cn, host));
        }
        self.subject_alt_names
            .iter()
            .any(|san| hostname_matches(san, host))
    }
}

/// Certificate name matching with single-label `*.` wildcards.
#[must_use]
pub fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_lowercase();
    let host = host.trim_end_matches('.').to_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix);
    }
    pattern == host
}

/// TLS facts recorded for a secure connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TlsInfo {
    /// Negotiated protocol version, e.g. `TLSv1_3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Negotiated cipher suite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_suite: Option<String>,
    /// Negotiated ALPN protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn_protocol: Option<String>,
    /// Whether the chain verified against the trust roots.
    pub authorized: bool,
    /// Why verification failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_error: Option<String>,
    /// Leaf certificate matches the requested host.
    pub hostname_match: bool,
    /// Presented chain, leaf first.
    #[serde(default)]
    pub certificates: Vec<CertificateInfo>,
}
