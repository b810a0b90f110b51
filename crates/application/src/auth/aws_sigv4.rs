//! AWS Signature Version 4.
//!
//! Signs `host`, `content-type` and every `x-amz-*` header. The payload
//! hash is sent as `x-amz-content-sha256` only for `s3`.

use chrono::{DateTime, Utc};
use courier_domain::auth::AwsV4Config;
use courier_domain::wire::{self, RequestOptions};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::TransportError;

use super::hex;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    Hmac::<Sha256>::new_from_slice(key).map_or_else(
        |_| Vec::new(),
        |mut mac| {
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        },
    )
}

/// RFC 3986 encoding with the unreserved set AWS expects.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_path(url: &Url) -> String {
    let path = url
        .path()
        .split('/')
        .map(|segment| uri_encode(&percent_decode(segment)))
        .collect::<Vec<_>>()
        .join("/");
    if path.is_empty() { "/".to_string() } else { path }
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| segment.get(i + 1..i + 3))
            .flatten()
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        if let Some(byte) = escaped {
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Adds `x-amz-date`, optional session token and `Authorization` headers.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when the URL does not parse.
pub fn sign_request(
    options: &mut RequestOptions,
    config: &AwsV4Config,
    now: DateTime<Utc>,
) -> Result<(), TransportError> {
    let url = Url::parse(&options.url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = hex(&Sha256::digest(options.body.hashable_bytes()));

    wire::remove_header(&mut options.headers, "authorization");
    wire::set_header(&mut options.headers, "host", host_header(&url));
    wire::set_header(&mut options.headers, "x-amz-date", amz_date.clone());
    if !config.session_token.is_empty() {
        wire::set_header(
            &mut options.headers,
            "x-amz-security-token",
            config.session_token.clone(),
        );
    }
    if config.service == "s3" {
        wire::set_header(&mut options.headers, "x-amz-content-sha256", payload_hash.clone());
    }

    let mut signed: Vec<(String, String)> = options
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .filter(|(name, _)| name == "host" || name == "content-type" || name.starts_with("x-amz-"))
        .map(|(name, value)| {
            let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name, collapsed)
        })
        .collect();
    signed.sort();
    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        options.method.as_str(),
        canonical_path(&url),
        canonical_query(&url),
    );
    let scope = format!("{date}/{}/{}/aws4_request", config.region, config.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", config.secret_access_key).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, config.region.as_bytes());
    let k_service = hmac_sha256(&k_region, config.service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    options.headers.push((
        "authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            config.access_key_id
        ),
    ));
    Ok(())
}
