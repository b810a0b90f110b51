//! The post-response script.

use courier_domain::scripting::ScriptPhase;
use tracing::warn;

use crate::context::RequestContext;
use crate::ports::ScriptRuntime;
use crate::scripts::{apply_script_outcome, combined_script, read_binding, script_request};

/// Runs the joined post-response script with a read-only request view.
///
/// The response is already recorded, so a failure is kept on the context
/// instead of replacing the outcome.
pub async fn run_post_response_script(ctx: &mut RequestContext, runtime: &dyn ScriptRuntime) {
    let script = combined_script(ctx, ScriptPhase::PostResponse);
    if script.is_empty() {
        return;
    }

    let input = script_request(ctx, script, ScriptPhase::PostResponse, read_binding(ctx));
    match runtime.run_script(input, &ctx.cancel).await {
        Ok(outcome) => {
            apply_script_outcome(ctx, outcome);
            ctx.debug.log("post-response-script", "post-response script finished");
        }
        Err(error) => {
            warn!(%error, "post-response script failed");
            ctx.debug
                .log("post-response-script", format!("post-response script failed: {error}"));
            ctx.post_response_errors.push(error);
        }
    }
}
