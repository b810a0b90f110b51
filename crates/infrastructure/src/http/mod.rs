//! HTTP transport.
//!
//! - [`ReqwestTransport`] performs one exchange per call
//! - [`tls_probe`] negotiates ALPN and describes the server chain
//! - [`body_builder`] turns multipart parts into a reqwest form

pub mod body_builder;
pub mod tls_probe;
mod transport;

pub use body_builder::{BodyBuildError, build_form, guess_content_type};
pub use tls_probe::{ProbeError, ProbeResult, probe};
pub use transport::{Protocol, ReqwestTransport, build_client, is_proxied};
