//! `test(...)` blocks.

use courier_domain::events::RequestEvent;
use courier_domain::scripting::ScriptPhase;
use courier_domain::testing::{TestResult, TestStatus};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::ports::ScriptRuntime;
use crate::scripts::{apply_script_outcome, combined_script, read_binding, script_request};

/// Runs the joined tests of collection, folders and request.
///
/// A script that throws outside a `test` block is recorded as an error and
/// as a failed result, so callers see it next to the other results.
pub async fn run_tests(ctx: &mut RequestContext, runtime: &dyn ScriptRuntime) {
    let script = combined_script(ctx, ScriptPhase::Test);
    if script.is_empty() {
        return;
    }

    let input = script_request(ctx, script, ScriptPhase::Test, read_binding(ctx));
    let results = match runtime.run_script(input, &ctx.cancel).await {
        Ok(mut outcome) => {
            let results = std::mem::take(&mut outcome.results);
            apply_script_outcome(ctx, outcome);
            results
        }
        Err(error) => {
            warn!(%error, "test script failed");
            let failure = TestResult {
                description: "test script".to_string(),
                status: TestStatus::Fail,
                error: Some(error.to_string()),
                actual: None,
                expected: None,
            };
            ctx.post_response_errors.push(error);
            vec![failure]
        }
    };

    let failed = results.iter().filter(|r| !r.passed()).count();
    debug!(total = results.len(), failed, "tests finished");
    ctx.debug.log_with(
        "tests",
        "tests finished",
        serde_json::json!({ "total": results.len(), "failed": failed }),
    );
    ctx.emit(RequestEvent::TestResults {
        ids: ctx.ids(),
        results: results.clone(),
    });
    ctx.test_results = results;
}
