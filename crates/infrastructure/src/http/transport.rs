//! HTTP transport using reqwest.
//!
//! One send is one exchange: redirects are never followed and bodies are
//! returned still encoded. Direct `https:` sends are preceded by a TLS probe
//! that decides between HTTP/2 and HTTP/1.1 and collects certificate facts;
//! plain and proxied sends always use HTTP/1.1.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use courier_application::error::TransportError;
use courier_application::ports::{BoxFuture, CancellationToken, HttpTransport};
use courier_domain::proxy::ProxyPolicy;
use courier_domain::tls::{CertificateSource, ClientCertificate, TlsOptions};
use courier_domain::wire::{HttpRequestInfo, RequestOptions, TimelineEntry, TimelineKind, WireBody};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, Identity, Method, Proxy, Url, Version};
use tracing::{debug, warn};

use super::body_builder::build_form;
use super::tls_probe::{ProbeError, probe};

/// Protocol a send is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// HTTP/1.1 only.
    Http1,
    /// HTTP/2 without upgrade.
    Http2,
}

/// Whether a send to `host` goes through a proxy.
#[must_use]
pub fn is_proxied(policy: &ProxyPolicy, host: &str) -> bool {
    match policy {
        ProxyPolicy::Direct => false,
        ProxyPolicy::System => true,
        ProxyPolicy::Manual(_) => policy.endpoint_for(host).is_some(),
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Whether a [`rustls::Error`] sits anywhere in the source chain.
///
/// `io::Error` hides its payload from `source()`, so it is unwrapped
/// explicitly.
fn is_tls_failure(error: &(dyn StdError + 'static)) -> bool {
    let mut next = Some(error);
    while let Some(cause) = next {
        if cause.is::<rustls::Error>() {
            return true;
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.get_ref().is_some_and(|inner| inner.is::<rustls::Error>())
        {
            return true;
        }
        next = cause.source();
    }
    false
}

/// Request timeout; zero means none.
fn effective_timeout(timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}

fn transport_error(error: &reqwest::Error, timeout_ms: Option<u64>) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout {
            timeout_ms: timeout_ms.unwrap_or_default(),
        };
    }
    let message = error_chain(error);
    if is_tls_failure(error) {
        return TransportError::Tls(message);
    }
    if error.is_builder() {
        return TransportError::InvalidRequest(message);
    }
    TransportError::Connect(message)
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn identity(certificate: &ClientCertificate) -> Result<Identity, TransportError> {
    match &certificate.source {
        CertificateSource::Cert {
            cert_file_path,
            key_file_path,
        } => {
            let read = |path: &std::path::Path| {
                std::fs::read(path).map_err(|e| {
                    TransportError::Io(format!("client certificate {}: {e}", path.display()))
                })
            };
            let mut pem = read(cert_file_path)?;
            pem.push(b'\n');
            pem.extend(read(key_file_path)?);
            Identity::from_pem(&pem).map_err(|e| TransportError::Tls(error_chain(&e)))
        }
        CertificateSource::Pfx { pfx_file_path } => Err(TransportError::Tls(format!(
            "PKCS#12 client certificates are not supported: {}",
            pfx_file_path.display()
        ))),
    }
}

fn apply_tls(mut builder: reqwest::ClientBuilder, tls: &TlsOptions) -> Result<reqwest::ClientBuilder, TransportError> {
    if !tls.verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &tls.ca_file {
        let pem = std::fs::read(path)
            .map_err(|e| TransportError::Io(format!("CA certificate {}: {e}", path.display())))?;
        let bundle = Certificate::from_pem_bundle(&pem)
            .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), error_chain(&e))))?;
        builder = if tls.keep_default_roots {
            builder.tls_certs_merge(bundle)
        } else {
            builder.tls_certs_only(bundle)
        };
    }
    Ok(builder)
}

/// Builds the client for one send.
///
/// # Errors
///
/// Fails on unreadable certificate files or an invalid proxy URL.
pub fn build_client(options: &RequestOptions, host: &str, protocol: Protocol) -> Result<Client, TransportError> {
    let mut builder = Client::builder().redirect(Policy::none());
    builder = match protocol {
        Protocol::Http1 => builder.http1_only(),
        Protocol::Http2 => builder.http2_prior_knowledge(),
    };

    builder = match &options.proxy {
        ProxyPolicy::Direct => builder.no_proxy(),
        ProxyPolicy::System => builder,
        policy @ ProxyPolicy::Manual(_) => match policy.endpoint_for(host).and_then(|e| e.url_with_auth()) {
            Some(url) => {
                let proxy = Proxy::all(&url)
                    .map_err(|e| TransportError::InvalidRequest(format!("proxy {url}: {e}")))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        },
    };

    builder = apply_tls(builder, &options.tls)?;
    if let Some(certificate) = &options.client_certificate {
        builder = builder.identity(identity(certificate)?);
    }
    if let Some(timeout) = effective_timeout(options.timeout_ms) {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| TransportError::InvalidRequest(error_chain(&e)))
}

/// reqwest-backed [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    probe_tls: bool,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Creates a transport that probes `https:` targets before sending.
    #[must_use]
    pub const fn new() -> Self {
        Self { probe_tls: true }
    }

    /// Creates a transport that always sends HTTP/1.1 without probing.
    #[must_use]
    pub const fn without_probe() -> Self {
        Self { probe_tls: false }
    }

    async fn exchange(&self, options: &RequestOptions) -> HttpRequestInfo {
        let url = match Url::parse(&options.url) {
            Ok(url) => url,
            Err(e) => {
                return HttpRequestInfo::failed(
                    &options.url,
                    TransportError::InvalidUrl(format!("{e}: {}", options.url)).to_string(),
                );
            }
        };
        let host = url.host_str().unwrap_or_default().to_string();
        let mut timeline = Vec::new();
        let mut tls_info = None;
        let mut protocol = Protocol::Http1;

        if self.probe_tls && url.scheme() == "https" && !is_proxied(&options.proxy, &host) {
            let port = url.port_or_known_default().unwrap_or(443);
            match probe(&host, port, &options.tls).await {
                Ok(result) => {
                    timeline.push(TimelineEntry::now(
                        TimelineKind::Tls,
                        format!(
                            "ALPN negotiated {}",
                            result.alpn.as_deref().unwrap_or("nothing")
                        ),
                    ));
                    if options.tls.verify && !result.tls.authorized {
                        let reason = result
                            .tls
                            .authorization_error
                            .clone()
                            .unwrap_or_else(|| "untrusted certificate".to_string());
                        warn!(%host, %reason, "rejecting untrusted certificate");
                        let error = TransportError::Tls(format!(
                            "certificate verification failed for {host}: {reason}"
                        ));
                        let mut info = HttpRequestInfo::failed(&options.url, error.to_string());
                        info.tls = Some(result.tls);
                        return info;
                    }
                    if result.is_h2() {
                        protocol = Protocol::Http2;
                    }
                    tls_info = Some(result.tls);
                }
                Err(ProbeError::Connect { message, .. }) => {
                    return HttpRequestInfo::failed(
                        &options.url,
                        TransportError::Connect(message).to_string(),
                    );
                }
                Err(error) => {
                    debug!(%host, %error, "tls probe failed, using HTTP/1.1");
                    timeline.push(TimelineEntry::now(
                        TimelineKind::Tls,
                        format!("probe failed ({error}), using HTTP/1.1"),
                    ));
                }
            }
        }

        let client = match build_client(options, &host, protocol) {
            Ok(client) => client,
            Err(error) => return HttpRequestInfo::failed(&options.url, error.to_string()),
        };
        let method = Method::from_bytes(options.method.as_str().as_bytes()).unwrap_or(Method::GET);
        let mut request = client.request(method, url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &options.body {
            WireBody::None => request,
            WireBody::Text(text) => request.body(text.clone()),
            WireBody::Bytes(bytes) => request.body(bytes.clone()),
            WireBody::Multipart(parts) => match build_form(parts).await {
                Ok(form) => request.multipart(form),
                Err(error) => {
                    return HttpRequestInfo::failed(
                        &options.url,
                        TransportError::Io(error.to_string()).to_string(),
                    );
                }
            },
        };

        timeline.push(TimelineEntry::now(
            TimelineKind::Request,
            format!("{} {}", options.method, options.url),
        ));
        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let error = transport_error(&error, options.timeout_ms);
                debug!(url = %options.url, %error, "send failed");
                let mut info = HttpRequestInfo::failed(&options.url, error.to_string());
                timeline.append(&mut info.timeline);
                info.timeline = timeline;
                info.tls = tls_info;
                return info;
            }
        };

        let status = response.status();
        let version = http_version(response.version());
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(error) => {
                let error = transport_error(&error, options.timeout_ms);
                let mut info = HttpRequestInfo::failed(&options.url, error.to_string());
                info.tls = tls_info;
                return info;
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        timeline.push(TimelineEntry::now(
            TimelineKind::Response,
            format!("{version} {} in {duration_ms}ms", status.as_u16()),
        ));

        HttpRequestInfo {
            url: options.url.clone(),
            status: Some(status.as_u16()),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            http_version: version.to_string(),
            headers,
            body,
            duration_ms,
            tls: tls_info,
            error: None,
            timeline,
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        options: &'a RequestOptions,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, HttpRequestInfo> {
        Box::pin(async move {
            tokio::select! {
                info = self.exchange(options) => info,
                () = cancel.cancelled() => {
                    HttpRequestInfo::failed(&options.url, TransportError::Cancelled.to_string())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_domain::proxy::{ProxyEndpoint, ProxyType};
    use courier_domain::request::HttpMethod;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `response` to one connection and returns the raw request.
    async fn serve_once(response: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if received.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_plain_exchange() {
        let (url, server) =
            serve_once(b"HTTP/1.1 201 Created\r\nX-Id: 7\r\nContent-Length: 2\r\n\r\nok").await;
        let options = RequestOptions::new(HttpMethod::Post, format!("{url}/items"))
            .with_header("x-trace", "abc")
            .with_body(WireBody::Text("payload".into()));
        let info = ReqwestTransport::new()
            .send(&options, &CancellationToken::new())
            .await;

        assert_eq!(info.status, Some(201));
        assert_eq!(info.status_text, "Created");
        assert_eq!(info.http_version, "HTTP/1.1");
        assert_eq!(info.header("x-id"), Some("7"));
        assert_eq!(info.body, b"ok");
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /items HTTP/1.1"));
        assert!(request.to_lowercase().contains("x-trace: abc"));
        assert!(request.ends_with("payload"));
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let (url, _server) =
            serve_once(b"HTTP/1.1 302 Found\r\nLocation: /next\r\nContent-Length: 0\r\n\r\n").await;
        let info = ReqwestTransport::new()
            .send(&RequestOptions::new(HttpMethod::Get, url), &CancellationToken::new())
            .await;
        assert_eq!(info.status, Some(302));
        assert_eq!(info.header("location"), Some("/next"));
    }

    #[tokio::test]
    async fn test_encoded_body_is_left_alone() {
        let (url, _server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 4\r\n\r\n\x1f\x8b\x08\x00",
        )
        .await;
        let info = ReqwestTransport::new()
            .send(&RequestOptions::new(HttpMethod::Get, url), &CancellationToken::new())
            .await;
        assert_eq!(info.body, b"\x1f\x8b\x08\x00");
    }

    #[tokio::test]
    async fn test_connection_refused_has_no_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let info = ReqwestTransport::new()
            .send(&RequestOptions::new(HttpMethod::Get, url), &CancellationToken::new())
            .await;
        assert_eq!(info.status, None);
        assert!(info.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let mut options = RequestOptions::new(HttpMethod::Get, url);
        options.timeout_ms = Some(100);
        let info = ReqwestTransport::new()
            .send(&options, &CancellationToken::new())
            .await;
        assert_eq!(info.error.as_deref(), Some("request timed out after 100ms"));
    }

    #[tokio::test]
    async fn test_zero_timeout_means_none() {
        let (url, _server) = serve_once(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n").await;
        let mut options = RequestOptions::new(HttpMethod::Get, url);
        options.timeout_ms = Some(0);
        let info = ReqwestTransport::new()
            .send(&options, &CancellationToken::new())
            .await;
        assert_eq!(info.error, None);
        assert_eq!(info.status, Some(204));
        assert_eq!(effective_timeout(Some(0)), None);
        assert_eq!(effective_timeout(Some(250)), Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_cancel_drops_the_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let info = ReqwestTransport::new()
            .send(&RequestOptions::new(HttpMethod::Get, url), &cancel)
            .await;
        assert_eq!(info.error.as_deref(), Some("request cancelled"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let info = ReqwestTransport::new()
            .send(
                &RequestOptions::new(HttpMethod::Get, "not a url"),
                &CancellationToken::new(),
            )
            .await;
        assert!(info.error.unwrap().starts_with("invalid URL"));
    }

    #[test]
    fn test_proxy_decision() {
        let manual = ProxyPolicy::Manual(
            ProxyEndpoint::new(ProxyType::Socks5, "proxy.test", 1080).with_bypass("internal.test"),
        );
        assert!(is_proxied(&manual, "api.test"));
        assert!(!is_proxied(&manual, "internal.test"));
        assert!(!is_proxied(&ProxyPolicy::Direct, "api.test"));
        assert!(is_proxied(&ProxyPolicy::System, "api.test"));
    }

    #[test]
    fn test_pfx_identity_is_rejected() {
        let certificate = ClientCertificate {
            domain: "*.test".into(),
            source: CertificateSource::Pfx {
                pfx_file_path: "client.pfx".into(),
            },
            passphrase: None,
        };
        assert!(matches!(identity(&certificate), Err(TransportError::Tls(_))));
    }

    #[test]
    fn test_tls_failure_found_through_io_error() {
        let wrapped = std::io::Error::other(rustls::Error::InvalidCertificate(
            rustls::CertificateError::UnknownIssuer,
        ));
        assert!(is_tls_failure(&wrapped));
        assert!(is_tls_failure(&rustls::Error::General("handshake".into())));
        assert!(!is_tls_failure(&std::io::Error::other("certificate tls handshake")));
    }

    #[test]
    fn test_custom_ca_client_builds() {
        let ca_file = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ca.pem");
        for keep_default_roots in [true, false] {
            let mut options = RequestOptions::new(HttpMethod::Get, "https://api.test");
            options.tls = TlsOptions {
                verify: true,
                ca_file: Some(ca_file.clone()),
                keep_default_roots,
            };
            assert!(build_client(&options, "api.test", Protocol::Http1).is_ok());
        }
    }

    #[test]
    fn test_socks_proxy_client_builds() {
        let mut options = RequestOptions::new(HttpMethod::Get, "http://api.test");
        options.proxy = ProxyPolicy::Manual(ProxyEndpoint::new(ProxyType::Socks5, "proxy.test", 1080));
        assert!(build_client(&options, "api.test", Protocol::Http1).is_ok());
    }
}
