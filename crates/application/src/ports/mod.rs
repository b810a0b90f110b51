//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the pipeline and the outside world.
//! Each port is a trait implemented by an adapter in the infrastructure
//! layer, or by a test double.

mod authorization;
mod cancellation;
mod script_runtime;
mod transport;

use std::future::Future;
use std::pin::Pin;

pub use authorization::AuthorizationCodeFetcher;
pub use cancellation::{CancellationReceiver, CancellationToken};
pub use script_runtime::{
    ExpressionScope, MutableRequestView, ReadRequestView, RequestBinding, RequestSnapshot,
    ResponseView, ScriptOutcome, ScriptRequest, ScriptRuntime, ScriptValue,
};
pub use transport::HttpTransport;

/// Boxed future returned by object-safe ports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
