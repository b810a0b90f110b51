//! Post-response stages.
//!
//! Run in order once a response is recorded: [`process_response`] (decode,
//! preview, body data), then [`vars`], the post-response script,
//! [`assertions`] and the tests. Failures after this point never replace the
//! recorded response.

pub mod assertions;
pub mod decode;
mod script;
mod test_runner;
pub mod vars;

use courier_domain::preview::determine_preview_mode;
use tracing::warn;

use crate::context::RequestContext;
use crate::error::PipelineResult;

pub use assertions::run_assertions;
pub use decode::{DecodeError, body_data, decode_body};
pub use script::run_post_response_script;
pub use test_runner::run_tests;
pub use vars::evaluate_post_response_vars;

/// Decodes the recorded body, picks the preview mode and fills `data`.
///
/// A decode failure keeps the raw body and is logged. The body file is
/// rewritten when decoding changed it.
///
/// # Errors
///
/// Returns an I/O error when the decoded body cannot be written back.
pub async fn process_response(ctx: &mut RequestContext) -> PipelineResult<()> {
    let Some(response) = ctx.response() else {
        return Ok(());
    };
    let encoding = response.header("content-encoding").map(str::to_string);
    let content_type = response.header("content-type").map(str::to_string);

    let decoded = match encoding.as_deref() {
        Some(encoding) => match decode_body(&response.body, encoding) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(%error, "response body left encoded");
                ctx.debug.log_with(
                    "decode",
                    "decoding failed",
                    serde_json::json!({ "encoding": encoding, "error": error.to_string() }),
                );
                None
            }
        },
        None => None,
    };

    let Some(response) = ctx.response_mut() else {
        return Ok(());
    };
    if let Some(decoded) = decoded
        && decoded != response.body
    {
        response.size = decoded.len();
        response.body = decoded;
        if let Some(path) = &response.data_path {
            tokio::fs::write(path, &response.body).await?;
        }
    }
    response.data = body_data(content_type.as_deref(), &response.body);
    let preview = determine_preview_mode(content_type.as_deref(), &response.body);
    let size = response.size;

    ctx.debug.log_with(
        "decode",
        "response body processed",
        serde_json::json!({ "encoding": encoding, "size": size, "preview": preview }),
    );
    ctx.preview_mode = Some(preview);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use courier_domain::collection::Collection;
    use courier_domain::preview::PreviewMode;
    use courier_domain::request::HttpRequest;
    use courier_domain::wire::Response;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    fn response(headers: &[(&str, &str)], body: Vec<u8>) -> Response {
        Response {
            url: "http://x.test".into(),
            status: 200,
            status_text: "OK".into(),
            http_version: "HTTP/1.1".into(),
            headers: headers
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect(),
            size: body.len(),
            body,
            data: json!(null),
            response_time_ms: 0,
            data_path: None,
            tls: None,
            info: None,
        }
    }

    #[tokio::test]
    async fn test_gzip_json_decoded_and_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"ok":true}"#).unwrap();
        let gz = encoder.finish().unwrap();
        std::fs::write(&path, &gz).unwrap();

        let mut ctx = context_for(HttpRequest::default(), Collection::new("c", "C"));
        let mut recorded = response(
            &[("content-encoding", "gzip"), ("content-type", "application/json")],
            gz,
        );
        recorded.data_path = Some(path.clone());
        ctx.set_response(recorded);

        process_response(&mut ctx).await.unwrap();
        let response = ctx.response().unwrap();
        assert_eq!(response.data, json!({"ok": true}));
        assert_eq!(response.size, 11);
        assert_eq!(std::fs::read(&path).unwrap(), br#"{"ok":true}"#);
        assert_eq!(ctx.preview_mode, Some(PreviewMode::Json));
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_raw_body() {
        let mut ctx = context_for(HttpRequest::default(), Collection::new("c", "C"));
        ctx.set_response(response(&[("content-encoding", "gzip")], b"plain".to_vec()));
        process_response(&mut ctx).await.unwrap();

        assert_eq!(ctx.response().unwrap().data, json!("plain"));
        assert!(
            ctx.debug
                .entries()
                .iter()
                .any(|entry| entry.message == "decoding failed")
        );
    }

    #[tokio::test]
    async fn test_png_magic_bytes_preview() {
        let mut ctx = context_for(HttpRequest::default(), Collection::new("c", "C"));
        ctx.set_response(response(&[], b"\x89PNG\r\n\x1a\n....".to_vec()));
        process_response(&mut ctx).await.unwrap();
        assert_eq!(ctx.preview_mode, Some(PreviewMode::Image("image/png".into())));
    }
}
