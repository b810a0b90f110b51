//! WS-Security `UsernameToken` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use sha1::{Digest, Sha1};

/// `X-WSSE` header value with a fresh nonce and timestamp.
#[must_use]
pub fn wsse_header(username: &str, password: &str) -> String {
    let nonce = super::random_hex(16);
    let created = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    wsse_header_with(username, password, &nonce, &created)
}

/// `X-WSSE` header value for a given nonce and timestamp.
///
/// The digest is `base64(sha1(nonce + created + password))`.
#[must_use]
pub fn wsse_header_with(username: &str, password: &str, nonce: &str, created: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = STANDARD.encode(hasher.finalize());
    format!(
        "UsernameToken Username=\"{username}\", PasswordDigest=\"{digest}\", Nonce=\"{nonce}\", Created=\"{created}\""
    )
}
