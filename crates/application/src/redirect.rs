//! Redirect decisions.
//!
//! Pure functions over the previous request and the response that asked
//! for a redirect; the request handler owns the loop and the cookie jar.

use courier_domain::request::HttpMethod;
use courier_domain::wire::{self, HttpRequestInfo, RequestOptions, WireBody};
use url::Url;

use crate::error::TransportError;

/// Annotation recorded on the response when the budget is exhausted.
pub const REDIRECT_LIMIT_INFO: &str = "redirect limit reached";

/// Whether `status` is a redirect this loop follows.
#[must_use]
pub const fn is_redirect_status(status: u16) -> bool {
    matches!(status, 300 | 301 | 302 | 303 | 307 | 308)
}

/// The `Location` of a redirect response, if it is one.
#[must_use]
pub fn redirect_location(info: &HttpRequestInfo) -> Option<&str> {
    info.status
        .filter(|status| is_redirect_status(*status))
        .and_then(|_| info.header("location"))
        .filter(|location| !location.trim().is_empty())
}

/// Whether the redirect rewrites the method to `GET` and drops the body.
#[must_use]
pub fn downgrades_to_get(status: u16, method: HttpMethod) -> bool {
    method.after_redirect(status) != method
}

/// Builds the next hop for a redirect to `location`.
///
/// Relative locations resolve against the previous URL. A downgrade to
/// `GET` strips `content-*` headers and the body. Changing host drops
/// `authorization` and `cookie`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when either URL does not parse.
pub fn follow_redirect(
    previous: &RequestOptions,
    status: u16,
    location: &str,
) -> Result<RequestOptions, TransportError> {
    let base = Url::parse(&previous.url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    let target = base
        .join(location.trim())
        .map_err(|e| TransportError::InvalidUrl(format!("{location}: {e}")))?;

    let mut next = previous.clone();
    next.url = target.to_string();
    wire::remove_header(&mut next.headers, "host");

    if downgrades_to_get(status, previous.method) {
        next.method = HttpMethod::Get;
        next.body = WireBody::None;
        next.headers
            .retain(|(name, _)| !name.to_ascii_lowercase().starts_with("content-"));
    }

    if base.host_str() != target.host_str() {
        wire::remove_header(&mut next.headers, "authorization");
        wire::remove_header(&mut next.headers, "cookie");
    }
    Ok(next)
}
