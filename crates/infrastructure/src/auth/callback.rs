//! Loopback receiver for the `OAuth2` authorization code redirect.
//!
//! The authorize URL is handed to an opener (a browser launcher, or a
//! message on the terminal); the provider then redirects the user agent to
//! the callback URL, which this module serves for exactly one request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use courier_application::error::OAuth2Error;
use courier_application::ports::{AuthorizationCodeFetcher, BoxFuture};
use courier_application::prepare::oauth2::parse_callback_url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

/// Default time to wait for the redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const CALLBACK_PAGE: &str = "<!DOCTYPE html><html><body><h3>Authorization received.</h3>\
<p>You can close this window and return to Courier.</p></body></html>";

type Opener = dyn Fn(&str) + Send + Sync;

/// [`AuthorizationCodeFetcher`] listening on the loopback callback address.
#[derive(Clone)]
pub struct LoopbackAuthorizationFetcher {
    timeout: Duration,
    opener: Option<Arc<Opener>>,
}

impl fmt::Debug for LoopbackAuthorizationFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackAuthorizationFetcher")
            .field("timeout", &self.timeout)
            .field("opener", &self.opener.is_some())
            .finish()
    }
}

impl Default for LoopbackAuthorizationFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackAuthorizationFetcher {
    /// Creates a fetcher that only logs the authorize URL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            opener: None,
        }
    }

    /// Sets how long to wait for the redirect.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets what to do with the authorize URL.
    #[must_use]
    pub fn with_opener(mut self, opener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.opener = Some(Arc::new(opener));
        self
    }

    async fn receive(&self, authorize_url: &str, callback_url: &str) -> Result<String, OAuth2Error> {
        let callback = Url::parse(callback_url).map_err(|_| OAuth2Error::InvalidCallback {
            url: callback_url.to_string(),
        })?;
        let host = callback.host_str().unwrap_or_default().to_string();
        if !matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]") {
            return Err(OAuth2Error::Authorization(format!(
                "callback url must point to this machine: {callback_url}"
            )));
        }
        let port = callback.port_or_known_default().unwrap_or(80);
        let bind_host = if host == "localhost" { "127.0.0.1" } else { host.trim_matches(['[', ']']) };
        let listener = TcpListener::bind((bind_host, port))
            .await
            .map_err(|e| OAuth2Error::Authorization(format!("cannot listen on {host}:{port}: {e}")))?;

        info!(url = authorize_url, "waiting for authorization");
        if let Some(opener) = &self.opener {
            opener(authorize_url);
        }

        let (mut socket, peer) = listener
            .accept()
            .await
            .map_err(|e| OAuth2Error::Authorization(e.to_string()))?;
        debug!(%peer, "authorization callback connected");

        let mut buf = vec![0u8; 8192];
        let n = socket
            .read(&mut buf)
            .await
            .map_err(|e| OAuth2Error::Authorization(e.to_string()))?;
        let request = String::from_utf8_lossy(&buf[..n]);
        let target = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/")
            .to_string();

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{CALLBACK_PAGE}",
            CALLBACK_PAGE.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;

        let received = callback
            .join(&target)
            .map_err(|_| OAuth2Error::InvalidCallback {
                url: format!("{callback_url}{target}"),
            })?;
        parse_callback_url(received.as_str())
    }
}

impl AuthorizationCodeFetcher for LoopbackAuthorizationFetcher {
    fn fetch_authorization_code<'a>(
        &'a self,
        authorize_url: &'a str,
        callback_url: &'a str,
        collection_uid: &'a str,
    ) -> BoxFuture<'a, Result<String, OAuth2Error>> {
        Box::pin(async move {
            debug!(collection = collection_uid, "starting authorization code flow");
            tokio::time::timeout(self.timeout, self.receive(authorize_url, callback_url))
                .await
                .map_err(|_| {
                    OAuth2Error::Authorization(format!(
                        "no callback received within {}s",
                        self.timeout.as_secs()
                    ))
                })?
        })
    }
}
