//! Application error types

use courier_domain::DomainError;
use thiserror::Error;

/// Errors raised by the script sandbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// User code threw.
    #[error("{message}")]
    UserScript {
        /// The thrown message.
        message: String,
        /// The script that was running.
        script: String,
    },

    /// `require` could not resolve a module.
    #[error("cannot find module '{name}' (tried: {})", tried.join(", "))]
    ModuleNotFound {
        /// Requested module name.
        name: String,
        /// Every location that was tried.
        tried: Vec<String>,
    },

    /// The engine itself failed.
    #[error("script runtime error: {0}")]
    Runtime(String),

    /// The script ran past its deadline.
    #[error("script timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline.
        timeout_ms: u64,
    },

    /// The request was cancelled while the script ran.
    #[error("script cancelled")]
    Cancelled,
}

/// Errors a transport records on a failed send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// DNS or TCP failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Handshake or certificate failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// No response before the deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline.
        timeout_ms: u64,
    },

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A file needed by the body could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// The send was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// Errors from the `OAuth2` token exchange.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuth2Error {
    /// A required configuration field is empty.
    #[error("OAuth2 {0} is not configured")]
    MissingConfig(&'static str),

    /// The authorization step failed before a callback arrived.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The provider answered with `error` parameters.
    #[error("authorization server returned {error}: {description} (url: {url})")]
    Provider {
        /// Callback URL.
        url: String,
        /// `error` parameter.
        error: String,
        /// `error_description` parameter.
        description: String,
    },

    /// The callback URL carried no `code`.
    #[error("no authorization code in callback url: {url}")]
    MissingCode {
        /// Callback URL.
        url: String,
    },

    /// The callback URL could not be parsed.
    #[error("invalid callback url: {url}")]
    InvalidCallback {
        /// Callback URL.
        url: String,
    },
}

/// Terminal error of a request pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid collection data.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A script failed.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The request could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token exchange failed.
    #[error(transparent)]
    OAuth2(#[from] OAuth2Error),

    /// The exchange produced no HTTP response.
    #[error("{0}")]
    NoResponse(String),

    /// Writing the response body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether the error came from a user script.
    #[must_use]
    pub const fn is_script_error(&self) -> bool {
        matches!(self, Self::Script(ScriptError::UserScript { .. }))
    }
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found_lists_paths() {
        let err = ScriptError::ModuleNotFound {
            name: "lodash".into(),
            tried: vec!["/c/node_modules/lodash".into(), "/c/lodash.js".into()],
        };
        assert_eq!(
            err.to_string(),
            "cannot find module 'lodash' (tried: /c/node_modules/lodash, /c/lodash.js)"
        );
    }

    #[test]
    fn test_oauth2_errors_embed_url() {
        let err = OAuth2Error::MissingCode {
            url: "http://cb/?state=1".into(),
        };
        assert!(err.to_string().contains("http://cb/?state=1"));
    }

    #[test]
    fn test_script_error_conversion() {
        let err: PipelineError = ScriptError::UserScript {
            message: "boom".into(),
            script: "throw new Error('boom')".into(),
        }
        .into();
        assert!(err.is_script_error());
        assert_eq!(err.to_string(), "boom");
    }
}
