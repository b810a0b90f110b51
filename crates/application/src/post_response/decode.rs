//! Content decoding and the script-visible body.

use std::io::{Cursor, Read};

use brotli::Decompressor;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde_json::Value;
use thiserror::Error;

/// A `content-encoding` that could not be undone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{encoding} decode failed: {message}")]
pub struct DecodeError {
    /// The encoding token.
    pub encoding: String,
    /// Decoder message.
    pub message: String,
}

fn read_all(mut reader: impl Read, encoding: &str) -> Result<Vec<u8>, DecodeError> {
    let mut decoded = Vec::new();
    reader
        .read_to_end(&mut decoded)
        .map_err(|error| DecodeError {
            encoding: encoding.to_string(),
            message: error.to_string(),
        })?;
    Ok(decoded)
}

fn inflate(body: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut zlib = Vec::new();
    if ZlibDecoder::new(Cursor::new(body)).read_to_end(&mut zlib).is_ok() {
        return Ok(zlib);
    }
    read_all(DeflateDecoder::new(Cursor::new(body)), "deflate")
}

/// Encoding tokens of a `content-encoding` value, lowercased, in header order.
#[must_use]
pub fn content_encodings(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Undoes `content-encoding`, last applied first.
///
/// Unknown tokens are skipped; `identity` is a no-op.
///
/// # Errors
///
/// Returns the first decoder failure.
pub fn decode_body(body: &[u8], content_encoding: &str) -> Result<Vec<u8>, DecodeError> {
    let mut decoded = body.to_vec();
    for encoding in content_encodings(content_encoding).iter().rev() {
        decoded = match encoding.as_str() {
            "gzip" | "x-gzip" => read_all(GzDecoder::new(Cursor::new(&decoded)), encoding)?,
            "deflate" => inflate(&decoded)?,
            "br" => read_all(Decompressor::new(Cursor::new(&decoded), 4096), encoding)?,
            _ => decoded,
        };
    }
    Ok(decoded)
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

/// Body text in the charset named by `content_type`; UTF-8 otherwise.
#[must_use]
pub fn body_text(content_type: Option<&str>, body: &[u8]) -> String {
    let charset = content_type.and_then(charset);
    match charset.as_deref() {
        Some("iso-8859-1" | "latin1" | "latin-1" | "us-ascii" | "windows-1252") => {
            body.iter().map(|&b| char::from(b)).collect()
        }
        _ => {
            let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

/// The body as scripts see it: parsed JSON when it parses, the text otherwise.
#[must_use]
pub fn body_data(content_type: Option<&str>, body: &[u8]) -> Value {
    let text = body_text(content_type, body);
    if text.trim().is_empty() {
        return Value::String(text);
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use brotli::CompressorWriter;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_and_x_gzip() {
        let encoded = gzip(b"hello gzip");
        assert_eq!(decode_body(&encoded, "gzip").unwrap(), b"hello gzip");
        assert_eq!(decode_body(&encoded, "X-Gzip").unwrap(), b"hello gzip");
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"zlib wrapped").unwrap();
        assert_eq!(decode_body(&zlib.finish().unwrap(), "deflate").unwrap(), b"zlib wrapped");

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(b"raw deflate").unwrap();
        assert_eq!(decode_body(&raw.finish().unwrap(), "deflate").unwrap(), b"raw deflate");
    }

    #[test]
    fn test_brotli() {
        let mut encoded = Vec::new();
        {
            let mut writer = CompressorWriter::new(&mut encoded, 4096, 5, 22);
            writer.write_all(b"hello br").unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(decode_body(&encoded, "br").unwrap(), b"hello br");
    }

    #[test]
    fn test_chained_encodings_right_to_left() {
        let mut encoded = Vec::new();
        {
            let mut writer = CompressorWriter::new(&mut encoded, 4096, 5, 22);
            writer.write_all(&gzip(b"layered")).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(decode_body(&encoded, "gzip, br").unwrap(), b"layered");
    }

    #[test]
    fn test_unknown_encoding_untouched() {
        assert_eq!(decode_body(b"plain", "compress").unwrap(), b"plain");
        assert_eq!(decode_body(b"plain", "identity").unwrap(), b"plain");
    }

    #[test]
    fn test_corrupt_gzip_fails() {
        let err = decode_body(b"not gzip", "gzip").unwrap_err();
        assert_eq!(err.encoding, "gzip");
    }

    #[test]
    fn test_body_data() {
        assert_eq!(body_data(Some("application/json"), br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(body_data(None, b"plain"), json!("plain"));
        assert_eq!(
            body_data(Some("text/plain; charset=ISO-8859-1"), b"caf\xe9"),
            json!("caf\u{e9}")
        );
        assert_eq!(body_data(None, b"\xEF\xBB\xBF[1]"), json!([1]));
    }
}
