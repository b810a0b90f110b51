//! Wire request construction.
//!
//! Turns the interpolated working request into [`RequestOptions`]: encoded
//! body, default and auth headers, cookies, client certificate, proxy, TLS
//! and timeout settings.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_domain::DomainError;
use courier_domain::auth::{ApiKeyLocation, AuthConfig};
use courier_domain::request::{KeyValue, MultipartField, RequestBody};
use courier_domain::tls::{CertificateSource, ClientCertificate};
use courier_domain::wire::{
    self, DigestCredentials, HeaderList, MultipartPart, PartContent, RequestOptions, WireBody,
};
use url::Url;

use crate::auth::wsse_header;
use crate::context::RequestContext;
use crate::error::{PipelineResult, TransportError};

const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

fn enabled_headers(headers: &[KeyValue]) -> HeaderList {
    headers
        .iter()
        .filter(|h| h.enabled && !h.name.trim().is_empty())
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect()
}

fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        root.join(candidate)
    }
}

fn multipart_parts(fields: &[MultipartField], root: &Path) -> Vec<MultipartPart> {
    let mut parts = Vec::new();
    for field in fields.iter().filter(|f| f.is_enabled()) {
        match field {
            MultipartField::Text {
                name,
                value,
                content_type,
                ..
            } => parts.push(MultipartPart {
                name: name.clone(),
                content: PartContent::Text(value.clone()),
                content_type: content_type.clone(),
            }),
            MultipartField::File {
                name,
                paths,
                content_type,
                ..
            } => parts.extend(paths.iter().map(|path| MultipartPart {
                name: name.clone(),
                content: PartContent::File(resolve_path(root, path)),
                content_type: content_type.clone(),
            })),
        }
    }
    parts
}

/// Encodes the request body; url-encoded fields keep declaration order.
///
/// # Errors
///
/// Returns [`TransportError::InvalidRequest`] when form fields cannot be
/// encoded or GraphQL variables are not JSON.
pub fn encode_body(body: &RequestBody, root: &Path) -> Result<WireBody, TransportError> {
    let encoded = match body {
        RequestBody::None => WireBody::None,
        RequestBody::Json { json } => WireBody::Text(json.clone()),
        RequestBody::Text { text } => WireBody::Text(text.clone()),
        RequestBody::Xml { xml } => WireBody::Text(xml.clone()),
        RequestBody::Sparql { sparql } => WireBody::Text(sparql.clone()),
        RequestBody::FormUrlEncoded { fields } => {
            let pairs: Vec<(&str, &str)> = fields
                .iter()
                .filter(|f| f.enabled)
                .map(|f| (f.name.as_str(), f.value.as_str()))
                .collect();
            let encoded = serde_urlencoded::to_string(pairs)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            WireBody::Text(encoded)
        }
        RequestBody::MultipartForm { fields } => WireBody::Multipart(multipart_parts(fields, root)),
        RequestBody::Graphql { query, variables } => {
            let variables = if variables.trim().is_empty() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(variables).map_err(|e| {
                    TransportError::InvalidRequest(format!("invalid graphql variables: {e}"))
                })?
            };
            WireBody::Text(serde_json::json!({ "query": query, "variables": variables }).to_string())
        }
    };
    Ok(encoded)
}

fn apply_auth(options: &mut RequestOptions, auth: &AuthConfig) -> Result<(), TransportError> {
    match auth {
        AuthConfig::None | AuthConfig::Inherit | AuthConfig::Oauth2(_) => {}
        AuthConfig::Basic { username, password } => {
            let token = STANDARD.encode(format!("{username}:{password}"));
            wire::set_header(&mut options.headers, "authorization", format!("Basic {token}"));
        }
        AuthConfig::Bearer { token } => {
            wire::set_header(&mut options.headers, "authorization", format!("Bearer {token}"));
        }
        AuthConfig::ApiKey {
            key,
            value,
            placement,
        } => {
            if key.is_empty() {
                return Ok(());
            }
            match placement {
                ApiKeyLocation::Header => wire::set_header(&mut options.headers, key, value.clone()),
                ApiKeyLocation::Query => {
                    let mut url = Url::parse(&options.url)
                        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
                    url.query_pairs_mut().append_pair(key, value);
                    options.url = url.into();
                }
            }
        }
        AuthConfig::Wsse { username, password } => {
            wire::set_header(&mut options.headers, "x-wsse", wsse_header(username, password));
        }
        AuthConfig::Digest { username, password } => {
            options.digest = Some(DigestCredentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        AuthConfig::Awsv4(config) => options.aws_sigv4 = Some(config.clone()),
    }
    Ok(())
}

fn absolute_certificate(cert: &ClientCertificate, root: &Path) -> ClientCertificate {
    let absolute = |path: &PathBuf| {
        if path.is_absolute() {
            path.clone()
        } else {
            root.join(path)
        }
    };
    let source = match &cert.source {
        CertificateSource::Cert {
            cert_file_path,
            key_file_path,
        } => CertificateSource::Cert {
            cert_file_path: absolute(cert_file_path),
            key_file_path: absolute(key_file_path),
        },
        CertificateSource::Pfx { pfx_file_path } => CertificateSource::Pfx {
            pfx_file_path: absolute(pfx_file_path),
        },
    };
    ClientCertificate {
        source,
        ..cert.clone()
    }
}

/// Builds the wire request for the working request of `ctx`.
///
/// # Errors
///
/// Fails with [`DomainError::InvalidUrl`] when the interpolated URL is not
/// absolute, or with a transport error when the body cannot be encoded.
pub fn build_request_options(ctx: &mut RequestContext) -> PipelineResult<RequestOptions> {
    let request = &ctx.request;
    let url = Url::parse(&request.url)
        .map_err(|e| DomainError::InvalidUrl(format!("{}: {e}", request.url)))?;
    let root = ctx.collection.path.as_path();

    let mut options = RequestOptions::new(request.method, url.as_str());
    options.headers = enabled_headers(&request.headers);
    if options.header("user-agent").is_none() {
        options
            .headers
            .push(("user-agent".to_string(), format!("courier/{}", ctx.version)));
    }
    if options.header("accept").is_none() {
        options
            .headers
            .push(("accept".to_string(), DEFAULT_ACCEPT.to_string()));
    }

    options.body = encode_body(&request.body, root)?;
    if matches!(request.body, RequestBody::MultipartForm { .. }) {
        // The transport writes the boundary.
        wire::remove_header(&mut options.headers, "content-type");
    } else if let Some(content_type) = request.body.default_content_type()
        && options.header("content-type").is_none()
    {
        options
            .headers
            .push(("content-type".to_string(), content_type.to_string()));
    }

    apply_auth(&mut options, &request.auth)?;

    if ctx.preferences.request.send_cookies
        && let Some(cookies) = ctx.cookie_jar.cookie_header(&url)
    {
        let header = match options.header("cookie") {
            Some(existing) if !existing.is_empty() => format!("{existing}; {cookies}"),
            _ => cookies,
        };
        wire::set_header(&mut options.headers, "cookie", header);
    }

    let host = url.host_str().unwrap_or_default();
    options.client_certificate = ctx
        .collection
        .config
        .client_certificates
        .select(host, url.port_or_known_default())
        .map(|cert| absolute_certificate(cert, root));

    options.proxy = ctx.proxy.clone();
    options.tls = ctx.preferences.tls_options();
    options.timeout_ms = request.settings.timeout_ms.or_else(|| ctx.preferences.timeout_ms());
    options.max_redirects = request.max_redirects();

    ctx.debug.log_with(
        "wire",
        "request options built",
        serde_json::json!({
            "method": options.method.as_str(),
            "url": options.url,
            "headers": options.headers.len(),
            "clientCertificate": options.client_certificate.as_ref().map(|c| c.domain.clone()),
        }),
    );
    tracing::debug!(method = options.method.as_str(), url = %options.url, "wire request built");
    Ok(options)
}
