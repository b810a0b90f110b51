//! Request signing for the auth modes resolved on the wire.
//!
//! This module provides:
//! - HTTP Digest challenge parsing and response computation
//! - AWS Signature Version 4 request signing
//! - WS-Security `UsernameToken` headers

pub mod aws_sigv4;
pub mod digest;
pub mod wsse;

use rand::Rng;

pub use aws_sigv4::sign_request;
pub use digest::{DigestAlgorithm, DigestChallenge};
pub use wsse::wsse_header;

/// Lowercase hex of `bytes`.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `len` random bytes as lowercase hex.
pub(crate) fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    hex(&bytes)
}
