//! Rendering request results for the terminal.

use std::fmt::Write as _;

use courier_application::{Outcome, RequestContext};
use courier_domain::testing::TestStatus;
use serde_json::{Value, json};

/// Whether anything in `ctx` failed: the request, an assertion, a test or a
/// post-response script.
#[must_use]
pub fn failed(ctx: &RequestContext) -> bool {
    ctx.error().is_some()
        || !ctx.post_response_errors.is_empty()
        || ctx.assertion_results.iter().any(|a| a.status == TestStatus::Fail)
        || ctx.test_results.iter().any(|t| t.status == TestStatus::Fail)
}

const fn mark(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "✓",
        TestStatus::Fail => "✗",
    }
}

/// Human-readable summary.
#[must_use]
pub fn render_text(ctx: &RequestContext) -> String {
    let mut out = String::new();
    let name = &ctx.request_item.name;
    match ctx.outcome() {
        Outcome::Response(response) => {
            let _ = writeln!(
                out,
                "{name}: {} {} -> {} {} ({} ms, {} bytes)",
                ctx.request.method.as_str(),
                response.url,
                response.status,
                response.status_text,
                response.response_time_ms,
                response.size
            );
        }
        Outcome::Error(error) => {
            let _ = writeln!(out, "{name}: error: {error}");
        }
        Outcome::Skipped => {
            let _ = writeln!(out, "{name}: skipped");
        }
        Outcome::Pending => {
            let _ = writeln!(out, "{name}: not sent");
        }
    }
    for assertion in &ctx.assertion_results {
        let _ = write!(
            out,
            "  {} assert {} {}",
            mark(assertion.status),
            assertion.lhs_expr,
            assertion.rhs_expr
        );
        if let Some(error) = &assertion.error {
            let _ = write!(out, ": {error}");
        }
        out.push('\n');
    }
    for test in &ctx.test_results {
        let _ = write!(out, "  {} {}", mark(test.status), test.description);
        if let Some(error) = &test.error {
            let _ = write!(out, ": {error}");
        }
        out.push('\n');
    }
    for error in &ctx.post_response_errors {
        let _ = writeln!(out, "  ✗ script: {error}");
    }
    out
}

/// Machine-readable report.
#[must_use]
pub fn render_json(ctx: &RequestContext) -> Value {
    let response = ctx.response().map(|r| {
        json!({
            "url": r.url,
            "status": r.status,
            "statusText": r.status_text,
            "headers": r.headers,
            "data": r.data,
            "size": r.size,
            "responseTime": r.response_time_ms,
            "dataPath": r.data_path,
        })
    });
    json!({
        "uid": ctx.request_item.uid,
        "name": ctx.request_item.name,
        "skipped": matches!(ctx.outcome(), Outcome::Skipped),
        "response": response,
        "error": ctx.error().map(ToString::to_string),
        "assertions": ctx.assertion_results,
        "tests": ctx.test_results,
        "scriptErrors": ctx.post_response_errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "nextRequest": ctx.next_request_name,
        "timings": ctx.timings.stages(),
    })
}
