//! Code generation.
//!
//! A request is prepared the way the pipeline would prepare it, without
//! scripts, `OAuth2` or the network, then converted to a HAR request and
//! rendered in the chosen language.

mod generator;
pub mod har;

use courier_application::error::{PipelineError, PipelineResult};
use courier_application::ports::ScriptRuntime;
use courier_application::{ContextInputs, RequestContext, prepare_offline};

pub use generator::{CodeLanguage, CodeSnippet, generate_snippet};
pub use har::{HarRequest, har_request};

/// Prepares `inputs` and returns the HAR request it would send.
///
/// # Errors
///
/// Returns the first preparation failure.
pub async fn prepare_har(inputs: ContextInputs, scripts: &dyn ScriptRuntime) -> PipelineResult<HarRequest> {
    let mut ctx = RequestContext::new(inputs);
    prepare_offline(&mut ctx, scripts).await?;
    ctx.http_request
        .as_ref()
        .map(har_request)
        .ok_or_else(|| PipelineError::NoResponse("request was not prepared".to_string()))
}

/// Generates a snippet for the request in `inputs`.
///
/// # Errors
///
/// Returns the first preparation failure.
pub async fn generate_code(
    inputs: ContextInputs,
    language: CodeLanguage,
    scripts: &dyn ScriptRuntime,
) -> PipelineResult<CodeSnippet> {
    let har = prepare_har(inputs, scripts).await?;
    Ok(generate_snippet(&har, language))
}
