//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The provided URL is invalid or malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A collection item has an invalid structure.
    #[error("invalid collection item: {0}")]
    InvalidCollectionItem(String),

    /// The folder tree does not hold the request the way it claims to.
    #[error("collection tree topology violated: {0}")]
    Topology(String),

    /// A derived variable scope was initialized twice.
    #[error("{0} variables were already set for this request")]
    ScopeAlreadySet(&'static str),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
