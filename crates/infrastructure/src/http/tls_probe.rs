//! ALPN and certificate probe.
//!
//! Before an `https:` request goes out directly, a throwaway TLS handshake
//! offers `h2` and `http/1.1`, records what the server picked and describes
//! its certificate chain. The real request then uses a fresh connection
//! pinned to the negotiated protocol.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_domain::tls::{CertificateInfo, TlsInfo, TlsOptions};
use parking_lot::Mutex;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_platform_verifier::Verifier as PlatformVerifier;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

/// ALPN identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";
/// ALPN identifier for HTTP/1.1.
pub const ALPN_HTTP1: &[u8] = b"http/1.1";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why the probe could not complete.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// TCP connect failed.
    #[error("connect to {host}:{port} failed: {message}")]
    Connect {
        /// Host.
        host: String,
        /// Port.
        port: u16,
        /// OS message.
        message: String,
    },
    /// The handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    /// The root store could not be built.
    #[error("invalid CA configuration: {0}")]
    Roots(String),
    /// The host is not a valid server name.
    #[error("invalid server name: {0}")]
    ServerName(String),
    /// No answer within the probe deadline.
    #[error("TLS probe timed out")]
    Timeout,
}

/// What one probe learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Negotiated ALPN protocol, if any.
    pub alpn: Option<String>,
    /// Handshake and chain facts.
    pub tls: TlsInfo,
}

impl ProbeResult {
    /// Whether the server chose HTTP/2.
    #[must_use]
    pub fn is_h2(&self) -> bool {
        self.alpn.as_deref() == Some("h2")
    }
}

fn ca_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProbeError> {
    let pem = std::fs::read(path).map_err(|e| ProbeError::Roots(format!("{}: {e}", path.display())))?;
    let certificates = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProbeError::Roots(format!("{}: {e}", path.display())))?;
    if certificates.is_empty() {
        return Err(ProbeError::Roots(format!("{}: no certificates found", path.display())));
    }
    Ok(certificates)
}

/// The verifier the real request is checked with.
///
/// A CA file without `keep_default_roots` is trusted alone. Otherwise the
/// platform roots are used, extended by the CA file; the bundled WebPKI
/// roots stand in when the platform store cannot be loaded.
///
/// # Errors
///
/// Fails when the custom CA file cannot be read or holds no certificate.
pub fn server_verifier(options: &TlsOptions) -> Result<Arc<dyn ServerCertVerifier>, ProbeError> {
    let extra = options
        .ca_file
        .as_deref()
        .map(ca_certificates)
        .transpose()?
        .unwrap_or_default();
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    if options.ca_file.is_none() || options.keep_default_roots {
        match PlatformVerifier::new_with_extra_roots(extra.clone(), provider.clone()) {
            Ok(verifier) => return Ok(Arc::new(verifier)),
            Err(error) => debug!(%error, "platform roots unavailable, using bundled roots"),
        }
    }

    let mut roots = RootCertStore::empty();
    if options.ca_file.is_none() || options.keep_default_roots {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    for certificate in extra {
        roots
            .add(certificate)
            .map_err(|e| ProbeError::Roots(e.to_string()))?;
    }
    let verifier: Arc<dyn ServerCertVerifier> = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|e| ProbeError::Roots(e.to_string()))?;
    Ok(verifier)
}

/// Delegates to the wrapped verifier but never aborts the handshake; the
/// verdict is kept for the caller.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<dyn ServerCertVerifier>,
    verdict: Mutex<Option<Result<(), String>>>,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .map(|_| ())
            .map_err(|e| e.to_string());
        *self.verdict.lock() = Some(verdict);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

/// Describes one DER certificate; `None` when it does not parse.
#[must_use]
pub fn describe_certificate(der: &[u8]) -> Option<CertificateInfo> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    let subject = cert.subject().to_string();
    let issuer = cert.issuer().to_string();
    let subject_cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    let subject_alt_names = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let validity = cert.validity();
    Some(CertificateInfo {
        self_signed: subject == issuer,
        subject,
        issuer,
        subject_cn,
        subject_alt_names,
        serial_number: cert.raw_serial_as_string(),
        valid_from: timestamp(validity.not_before.timestamp()),
        valid_to: timestamp(validity.not_after.timestamp()),
    })
}

/// Opens a TLS connection to `host:port`, offering `h2` and `http/1.1`,
/// and reports what was negotiated. The connection is dropped afterwards.
///
/// # Errors
///
/// Fails when the connection or the handshake fails; an untrusted chain is
/// not an error, it is reported through [`TlsInfo::authorized`].
pub async fn probe(host: &str, port: u16, options: &TlsOptions) -> Result<ProbeResult, ProbeError> {
    let verifier = Arc::new(RecordingVerifier {
        inner: server_verifier(options)?,
        verdict: Mutex::new(None),
    });

    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP1.to_vec()];

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::ServerName(format!("{host}: {e}")))?;

    let handshake = async {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| ProbeError::Connect {
                host: host.to_string(),
                port,
                message: e.to_string(),
            })?;
        TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProbeError::Handshake(e.to_string()))
    };
    let stream = tokio::time::timeout(PROBE_TIMEOUT, handshake)
        .await
        .map_err(|_| ProbeError::Timeout)??;

    let (_, connection) = stream.get_ref();
    let alpn = connection
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned());
    let certificates: Vec<CertificateInfo> = connection
        .peer_certificates()
        .unwrap_or_default()
        .iter()
        .filter_map(|der| describe_certificate(der.as_ref()))
        .collect();
    let hostname_match = certificates
        .first()
        .is_some_and(|leaf| leaf.matches_hostname(host));
    let verdict = verifier
        .verdict
        .lock()
        .take()
        .unwrap_or_else(|| Err("no certificate presented".to_string()));

    let tls = TlsInfo {
        protocol_version: connection.protocol_version().map(|v| format!("{v:?}")),
        cipher_suite: connection
            .negotiated_cipher_suite()
            .map(|s| format!("{:?}", s.suite())),
        alpn_protocol: alpn.clone(),
        authorized: verdict.is_ok(),
        authorization_error: verdict.err(),
        hostname_match,
        certificates,
    };
    debug!(host, port, alpn = ?tls.alpn_protocol, authorized = tls.authorized, "tls probe finished");
    Ok(ProbeResult { alpn, tls })
}
