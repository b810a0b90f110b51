//! The send loop: redirects, digest continuation and the terminal response.
//!
//! Each hop goes through the transport once. Cookies set by a hop are stored
//! before the next hop's cookie header is computed. A digest challenge is
//! answered at most once and only after the redirect check.

use chrono::Utc;
use courier_domain::events::RequestEvent;
use courier_domain::wire::{self, HttpRequestInfo, RequestOptions, Response, TimelineEntry, TimelineKind};
use tracing::{debug, warn};
use url::Url;

use crate::auth::digest::{self, DigestChallenge};
use crate::auth::sign_request;
use crate::context::RequestContext;
use crate::error::{PipelineError, PipelineResult, TransportError};
use crate::ports::HttpTransport;
use crate::redirect::{self, REDIRECT_LIMIT_INFO};

fn parse_url(url: &str) -> Result<Url, TransportError> {
    Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))
}

/// Stores `Set-Cookie` headers of one hop and reports what was stored.
fn store_cookies(ctx: &RequestContext, info: &HttpRequestInfo, url: &Url) {
    if !ctx.preferences.request.store_cookies {
        return;
    }
    let cookies = ctx.cookie_jar.store(&info.headers, url);
    if !cookies.is_empty() {
        debug!(count = cookies.len(), "cookies stored");
        ctx.emit(RequestEvent::CookieUpdated { cookies });
    }
}

fn cookie_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name).trim()
}

/// Pairs of `existing` not named in `fresh`, followed by `fresh`.
fn merge_cookie_header(existing: &str, fresh: &str) -> String {
    let split = |header: &str| -> Vec<String> {
        header
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(str::to_string)
            .collect()
    };
    let fresh = split(fresh);
    let mut merged: Vec<String> = split(existing)
        .into_iter()
        .filter(|pair| !fresh.iter().any(|f| cookie_name(f) == cookie_name(pair)))
        .collect();
    merged.extend(fresh);
    merged.join("; ")
}

/// Recomputes the cookie header for the next hop, keeping cookies the
/// request set itself.
fn refresh_cookie_header(ctx: &RequestContext, options: &mut RequestOptions) -> Result<(), TransportError> {
    if !ctx.preferences.request.send_cookies {
        return Ok(());
    }
    let url = parse_url(&options.url)?;
    if let Some(cookies) = ctx.cookie_jar.cookie_header(&url) {
        let header = options
            .header("cookie")
            .map_or_else(|| cookies.clone(), |existing| merge_cookie_header(existing, &cookies));
        wire::set_header(&mut options.headers, "cookie", header);
    }
    Ok(())
}

fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// Answers a digest challenge on `options`; `false` when there is nothing
/// to answer.
fn answer_digest(options: &mut RequestOptions, info: &HttpRequestInfo) -> Result<bool, TransportError> {
    let Some(credentials) = options.digest.clone() else {
        return Ok(false);
    };
    let Some(challenge) = info
        .headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("www-authenticate"))
        .find_map(|(_, value)| DigestChallenge::parse(value))
    else {
        return Ok(false);
    };
    let uri = request_uri(&parse_url(&options.url)?);
    let header = challenge.authorization(&credentials, options.method.as_str(), &uri, &digest::cnonce());
    wire::set_header(&mut options.headers, "authorization", header);
    Ok(true)
}

async fn send_once(
    ctx: &RequestContext,
    transport: &dyn HttpTransport,
    options: &mut RequestOptions,
) -> PipelineResult<HttpRequestInfo> {
    ctx.check_cancelled()?;
    if let Some(config) = options.aws_sigv4.clone() {
        sign_request(options, &config, Utc::now())?;
    }
    let options = &*options;
    tokio::select! {
        info = transport.send(options, &ctx.cancel) => Ok(info),
        () = ctx.cancel.cancelled() => Err(PipelineError::Cancelled),
    }
}

/// Runs the exchange for `ctx.http_request` and records the final response.
///
/// # Errors
///
/// Fails with [`PipelineError::NoResponse`] when a hop produced no status,
/// [`PipelineError::Cancelled`] on cancellation, and an I/O error when the
/// body cannot be written to the data directory.
pub async fn execute_request(ctx: &mut RequestContext, transport: &dyn HttpTransport) -> PipelineResult<()> {
    let mut options = ctx
        .http_request
        .clone()
        .ok_or_else(|| TransportError::InvalidRequest("wire request was not built".to_string()))?;
    let mut redirects = 0u32;
    let mut digest_answered = false;
    let mut elapsed_ms = 0u64;

    let (info, annotation) = loop {
        ctx.timeline.push(TimelineEntry::now(
            TimelineKind::Request,
            format!("{} {}", options.method.as_str(), options.url),
        ));
        let info = send_once(ctx, transport, &mut options).await?;
        elapsed_ms = elapsed_ms.saturating_add(info.duration_ms);
        ctx.timeline.extend(info.timeline.iter().cloned());

        let Some(status) = info.status else {
            let message = info
                .error
                .clone()
                .unwrap_or_else(|| "no response received".to_string());
            warn!(url = %options.url, error = %message, "request failed");
            return Err(PipelineError::NoResponse(message));
        };
        ctx.timeline.push(TimelineEntry::now(
            TimelineKind::Response,
            format!("{status} {}", info.status_text).trim_end().to_string(),
        ));
        store_cookies(ctx, &info, &parse_url(&options.url)?);

        if let Some(location) = redirect::redirect_location(&info) {
            if redirects >= options.max_redirects {
                ctx.timeline
                    .push(TimelineEntry::now(TimelineKind::Info, REDIRECT_LIMIT_INFO));
                break (info, Some(REDIRECT_LIMIT_INFO.to_string()));
            }
            let mut next = redirect::follow_redirect(&options, status, location)?;
            refresh_cookie_header(ctx, &mut next)?;
            redirects += 1;
            ctx.timeline.push(TimelineEntry::now(
                TimelineKind::Redirect,
                format!("{status} -> {}", next.url),
            ));
            ctx.debug.log_with(
                "redirect",
                "following redirect",
                serde_json::json!({ "status": status, "from": options.url, "to": next.url }),
            );
            options = next;
            continue;
        }

        if status == 401 && !digest_answered && answer_digest(&mut options, &info)? {
            digest_answered = true;
            ctx.timeline
                .push(TimelineEntry::now(TimelineKind::Auth, "answering digest challenge"));
            ctx.debug.log("digest", "retrying with digest credentials");
            continue;
        }

        break (info, None);
    };

    let data_path = ctx.data_dir.join(&ctx.uid);
    tokio::fs::create_dir_all(&ctx.data_dir).await?;
    tokio::fs::write(&data_path, &info.body).await?;

    let response = Response {
        url: options.url.clone(),
        status: info.status.unwrap_or_default(),
        status_text: info.status_text,
        http_version: info.http_version,
        headers: info.headers,
        size: info.body.len(),
        body: info.body,
        data: serde_json::Value::Null,
        response_time_ms: elapsed_ms,
        data_path: Some(data_path.clone()),
        tls: info.tls,
        info: annotation,
    };
    ctx.debug.log_with(
        "response",
        "response recorded",
        serde_json::json!({
            "path": data_path,
            "statusCode": response.status,
            "size": response.size,
            "responseTime": response.response_time_ms,
            "redirects": redirects,
        }),
    );
    debug!(status = response.status, size = response.size, redirects, "response recorded");
    ctx.set_response(response);
    Ok(())
}
