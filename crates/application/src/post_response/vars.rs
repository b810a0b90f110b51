//! Post-response variables.
//!
//! Folder declarations run first and request declarations last, so a
//! request variable wins over a folder variable of the same name. Each value
//! is an expression evaluated against the response and lands in the runtime
//! scope.

use courier_domain::scripting::RequestVariable;
use serde_json::Value;
use tracing::warn;

use crate::context::RequestContext;
use crate::expression::{evaluate_expression, expression_scope};
use crate::ports::{ScriptRuntime, ScriptValue};

/// Evaluates `vars.res` of every folder, then of the request.
///
/// A failing declaration is recorded on the context and the rest still run.
pub async fn evaluate_post_response_vars(ctx: &mut RequestContext, runtime: &dyn ScriptRuntime) {
    let mut declarations: Vec<RequestVariable> = ctx
        .folder_data
        .iter()
        .flat_map(|folder| folder.vars.res.iter().cloned())
        .collect();
    declarations.extend(ctx.request.vars.res.iter().cloned());

    for var in declarations.iter().filter(|v| v.enabled && !v.name.is_empty()) {
        let scope = expression_scope(ctx);
        match evaluate_expression(&var.value, &scope, runtime, &ctx.cancel).await {
            Ok(value) => {
                let value = match value {
                    ScriptValue::Undefined => Value::Null,
                    ScriptValue::Json(json) => json,
                };
                ctx.variables.set_runtime_variable(var.name.clone(), value);
            }
            Err(error) => {
                warn!(name = %var.name, %error, "post-response variable failed");
                ctx.debug.log_with(
                    "post-response-vars",
                    "evaluation failed",
                    serde_json::json!({ "name": var.name, "error": error.to_string() }),
                );
                ctx.post_response_errors.push(error);
            }
        }
    }
}
