//! Courier Application - The request pipeline
//!
//! This crate defines the application layer with:
//! - Port traits for the transport, the script sandbox and `OAuth2`
//! - The per-request context and variable resolution
//! - Pre-request preparation, the redirect loop and post-response handling
//! - The orchestrator composing them

pub mod auth;
pub mod context;
pub mod error;
pub mod expression;
pub mod pipeline;
pub mod ports;
pub mod post_response;
pub mod prepare;
pub mod redirect;
pub mod request_handler;
pub mod scripts;
pub mod variable_resolver;

#[cfg(test)]
mod test_support;

pub use context::{ContextInputs, ExecutionMode, Outcome, RequestContext, Timings};
pub use error::{OAuth2Error, PipelineError, PipelineResult, ScriptError, TransportError};
pub use pipeline::{PipelineServices, prepare_offline, prepare_request, run_pipeline, run_request};
pub use ports::{
    AuthorizationCodeFetcher, BoxFuture, CancellationReceiver, CancellationToken, ExpressionScope,
    HttpTransport, ScriptOutcome, ScriptRequest, ScriptRuntime, ScriptValue,
};
pub use request_handler::execute_request;
pub use variable_resolver::VariableResolver;
