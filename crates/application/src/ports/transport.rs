//! HTTP transport port

use courier_domain::wire::{HttpRequestInfo, RequestOptions};

use super::{BoxFuture, CancellationToken};

/// Sends exactly one HTTP exchange.
///
/// Redirects are not followed and bodies are not decompressed; the
/// redirect/auth loop and post-response stages own those decisions.
/// Failures never surface as `Err`: they are recorded on
/// [`HttpRequestInfo::error`] with `status` left empty.
pub trait HttpTransport: Send + Sync {
    /// Sends `options` once, honouring its timeout, proxy and TLS settings.
    fn send<'a>(
        &'a self,
        options: &'a RequestOptions,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, HttpRequestInfo>;
}
