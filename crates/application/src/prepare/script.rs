//! Pre-request variables and the pre-request script.

use courier_domain::scripting::{RequestVariable, ScriptPhase};
use courier_domain::variables::VariableMap;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::PipelineResult;
use crate::expression::{evaluate_template_literal, expression_scope};
use crate::ports::{MutableRequestView, RequestBinding, RequestSnapshot, ScriptRuntime, ScriptValue};
use crate::scripts::{apply_script_outcome, combined_script, script_request};

/// Evaluates folder `vars.req` into the folder scope and the request's
/// `vars.req` into the request scope.
///
/// Folder declarations run outer to inner and later ones win. Each value
/// is a template literal evaluated against the scopes known so far.
///
/// # Errors
///
/// Fails when a template throws or a scope was already set.
pub async fn evaluate_pre_request_vars(
    ctx: &mut RequestContext,
    runtime: &dyn ScriptRuntime,
) -> PipelineResult<()> {
    let folder_vars: Vec<RequestVariable> = ctx
        .folder_data
        .iter()
        .flat_map(|folder| folder.vars.req.iter().cloned())
        .collect();
    let folder = evaluate_declarations(ctx, &folder_vars, runtime).await?;
    ctx.variables.set_folder_variables(folder)?;

    let request_vars = ctx.request.vars.req.clone();
    let request = evaluate_declarations(ctx, &request_vars, runtime).await?;
    ctx.variables.set_request_variables(request)?;
    Ok(())
}

async fn evaluate_declarations(
    ctx: &RequestContext,
    declarations: &[RequestVariable],
    runtime: &dyn ScriptRuntime,
) -> PipelineResult<VariableMap> {
    let mut evaluated = VariableMap::new();
    for var in declarations.iter().filter(|v| v.enabled && !v.name.is_empty()) {
        let mut scope = expression_scope(ctx);
        scope
            .variables
            .extend(evaluated.iter().map(|(k, v)| (k.clone(), v.clone())));
        let value = evaluate_template_literal(&var.value, &scope, runtime, &ctx.cancel).await?;
        evaluated.insert(
            var.name.clone(),
            match value {
                ScriptValue::Undefined => Value::Null,
                ScriptValue::Json(json) => json,
            },
        );
    }
    Ok(evaluated)
}

/// Runs the joined pre-request script with a mutable `req`.
///
/// Request changes are written back into the working request. A script
/// calling `bru.runner.skipRequest()` marks the context skipped.
///
/// # Errors
///
/// Any script error aborts the request.
pub async fn run_pre_request_script(
    ctx: &mut RequestContext,
    runtime: &dyn ScriptRuntime,
) -> PipelineResult<()> {
    let script = combined_script(ctx, ScriptPhase::PreRequest);
    if script.is_empty() {
        ctx.debug.log("pre-request-script", "no pre-request script");
        return Ok(());
    }

    let binding = RequestBinding::Mutable(MutableRequestView::new(RequestSnapshot::from_request(
        &ctx.request_item.name,
        &ctx.request,
    )));
    let input = script_request(ctx, script, ScriptPhase::PreRequest, binding);
    let mut outcome = runtime.run_script(input, &ctx.cancel).await?;

    if let Some(snapshot) = outcome.request.take() {
        MutableRequestView::new(snapshot).apply_to(&mut ctx.request)?;
    }
    let skip = outcome.skip_request;
    apply_script_outcome(ctx, outcome);
    ctx.debug.log("pre-request-script", "pre-request script finished");

    if skip {
        ctx.set_skipped();
    }
    Ok(())
}
