//! HTTP Digest access authentication.
//!
//! Only the `auth` quality of protection and the legacy no-qop form are
//! answered; `auth-int` challenges are treated as `auth`.

use md5::Md5;
use sha2::{Digest, Sha256};

use courier_domain::wire::DigestCredentials;

/// Hash function named by the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// `MD5`, the default.
    #[default]
    Md5,
    /// `SHA-256`.
    Sha256,
}

impl DigestAlgorithm {
    /// Name sent back in the `algorithm` parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }

    fn hash(self, input: &str) -> String {
        match self {
            Self::Md5 => super::hex(&Md5::digest(input.as_bytes())),
            Self::Sha256 => super::hex(&Sha256::digest(input.as_bytes())),
        }
    }
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Offered quality of protection, if any.
    pub qop: Option<String>,
    /// Opaque value to echo back.
    pub opaque: Option<String>,
    /// Hash algorithm.
    pub algorithm: DigestAlgorithm,
}

/// Splits `a="x, y", b=z` into pairs, honouring quotes.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            break;
        };
        let key = rest[..eq].trim().trim_start_matches(',').trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();
        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or_default();
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
        params.push((key, value));
    }
    params
}

impl DigestChallenge {
    /// Parses a `WWW-Authenticate` value; `None` unless it is a Digest
    /// challenge with realm and nonce.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let scheme = header.get(..6)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let params = parse_params(&header[6..]);
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        let algorithm = match get("algorithm") {
            Some(name) if name.eq_ignore_ascii_case("sha-256") => DigestAlgorithm::Sha256,
            _ => DigestAlgorithm::Md5,
        };
        Some(Self {
            realm: get("realm")?,
            nonce: get("nonce")?,
            qop: get("qop"),
            opaque: get("opaque"),
            algorithm,
        })
    }

    /// `Authorization` header answering this challenge.
    #[must_use]
    pub fn authorization(
        &self,
        credentials: &DigestCredentials,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        const NC: &str = "00000001";
        let ha1 = self.algorithm.hash(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = self.algorithm.hash(&format!("{method}:{uri}"));
        let qop = self
            .qop
            .as_deref()
            .filter(|offered| offered.split(',').any(|q| q.trim().starts_with("auth")))
            .map(|_| "auth");

        let response = match qop {
            Some(qop) => self
                .algorithm
                .hash(&format!("{ha1}:{}:{NC}:{cnonce}:{qop}:{ha2}", self.nonce)),
            None => self.algorithm.hash(&format!("{ha1}:{}:{ha2}", self.nonce)),
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", algorithm={}, response=\"{response}\"",
            credentials.username,
            self.realm,
            self.nonce,
            self.algorithm.as_str()
        );
        if let Some(qop) = qop {
            header.push_str(&format!(", qop={qop}, nc={NC}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }
}

/// A fresh client nonce.
#[must_use]
pub fn cnonce() -> String {
    super::random_hex(8)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHALLENGE: &str = r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn test_parse_challenge() {
        let challenge = DigestChallenge::parse(CHALLENGE).unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(challenge.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(challenge.algorithm, DigestAlgorithm::Md5);
        assert!(DigestChallenge::parse("Basic realm=\"x\"").is_none());
    }

    #[test]
    fn test_rfc2617_response() {
        let challenge = DigestChallenge::parse(CHALLENGE).unwrap();
        let credentials = DigestCredentials {
            username: "Mufasa".into(),
            password: "Circle Of Life".into(),
        };
        let header = challenge.authorization(&credentials, "GET", "/dir/index.html", "0a4f113b");
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
        assert!(header.ends_with("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn test_sha256_algorithm() {
        let challenge =
            DigestChallenge::parse(r#"Digest realm="r", nonce="n", algorithm=SHA-256"#).unwrap();
        assert_eq!(challenge.algorithm, DigestAlgorithm::Sha256);
        let header = challenge.authorization(
            &DigestCredentials {
                username: "u".into(),
                password: "p".into(),
            },
            "GET",
            "/",
            "c",
        );
        assert!(header.contains("algorithm=SHA-256"));
        assert!(!header.contains("qop="));
    }
}
