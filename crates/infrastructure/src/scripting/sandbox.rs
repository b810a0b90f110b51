//! QuickJS-backed [`ScriptRuntime`].
//!
//! Every call gets its own runtime and context on a blocking thread, so no
//! global state survives between scripts. The prelude builds `req`, `res`,
//! `bru`, `console` and the test helpers from a JSON input document; the
//! host side only provides a handful of string-in, string-out functions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_application::error::ScriptError;
use courier_application::ports::{
    BoxFuture, CancellationToken, ExpressionScope, ScriptOutcome, ScriptRequest, ScriptRuntime,
    ScriptValue,
};
use rquickjs::{Context, Ctx, Function, Runtime};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::modules::{FsModuleResolver, ModuleContext, ModuleResolver, ResolvedModule};
use super::protocol::{expression_input, expression_value, script_input, script_outcome};

const PRELUDE: &str = include_str!("prelude.js");

const NOT_INTERRUPTED: u8 = 0;
const TIMED_OUT: u8 = 1;
const CANCELLED: u8 = 2;

/// Resource limits for one sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Heap limit in bytes.
    pub memory_bytes: usize,
    /// Stack limit in bytes.
    pub stack_bytes: usize,
    /// Deadline for standalone expressions.
    pub expression_timeout_ms: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 64 * 1024 * 1024,
            stack_bytes: 1024 * 1024,
            expression_timeout_ms: 10_000,
        }
    }
}

/// Sandbox runtime for pre-request, post-response and test scripts.
#[derive(Debug, Clone)]
pub struct QuickJsRuntime {
    resolver: Arc<dyn ModuleResolver>,
    limits: SandboxLimits,
}

impl Default for QuickJsRuntime {
    fn default() -> Self {
        Self::new(Arc::new(FsModuleResolver))
    }
}

impl QuickJsRuntime {
    /// Creates a runtime resolving modules through `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            resolver,
            limits: SandboxLimits::default(),
        }
    }

    /// Replaces the resource limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn spawn(&self, job: Job) -> Result<String, ScriptError> {
        tokio::task::spawn_blocking(move || job.execute())
            .await
            .map_err(|e| ScriptError::Runtime(format!("sandbox thread failed: {e}")))?
    }
}

/// Everything one sandbox thread needs.
struct Job {
    input: String,
    timeout_ms: u64,
    modules: ModuleContext,
    fs_allowed: bool,
    resolver: Arc<dyn ModuleResolver>,
    limits: SandboxLimits,
    cancel: CancellationToken,
}

#[derive(Deserialize)]
struct FsRequest {
    op: String,
    path: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct Base64Request {
    op: String,
    text: String,
}

fn fs_call(root: &Path, request: &str) -> String {
    let request: FsRequest = match serde_json::from_str(request) {
        Ok(request) => request,
        Err(e) => return json!({ "error": e.to_string() }).to_string(),
    };
    let path = if Path::new(&request.path).is_absolute() {
        PathBuf::from(&request.path)
    } else {
        root.join(&request.path)
    };
    let reply = match request.op.as_str() {
        "read" => std::fs::read_to_string(&path).map(|text| json!({ "value": text })),
        "write" => std::fs::write(&path, request.data.unwrap_or_default()).map(|()| json!({ "value": null })),
        "exists" => Ok(json!({ "value": path.exists() })),
        other => Ok(json!({ "error": format!("unsupported fs operation: {other}") })),
    };
    reply
        .unwrap_or_else(|e| json!({ "error": format!("{}: {e}", path.display()) }))
        .to_string()
}

fn base64_call(request: &str) -> String {
    let Ok(request) = serde_json::from_str::<Base64Request>(request) else {
        return String::new();
    };
    if request.op == "encode" {
        return STANDARD.encode(request.text.as_bytes());
    }
    STANDARD
        .decode(request.text.trim())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn engine_error(ctx: &Ctx<'_>, error: &rquickjs::Error) -> String {
    if error.is_exception() {
        let caught = ctx.catch();
        if let Some(message) = caught.as_exception().and_then(rquickjs::Exception::message) {
            return message;
        }
        return format!("{caught:?}");
    }
    error.to_string()
}

impl Job {
    fn interrupted(&self, reason: &AtomicU8) -> Option<ScriptError> {
        match reason.load(Ordering::SeqCst) {
            CANCELLED => Some(ScriptError::Cancelled),
            TIMED_OUT => Some(ScriptError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
            _ => None,
        }
    }

    fn install_host_functions(&self, ctx: &Ctx<'_>, deadline: Instant) -> rquickjs::Result<()> {
        let globals = ctx.globals();

        let cancel = self.cancel.clone();
        globals.set(
            "__courierSleep",
            Function::new(ctx.clone(), move |ms: String| -> bool {
                let total = ms
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
                    .unwrap_or_default();
                let until = Instant::now() + total;
                while Instant::now() < until {
                    if cancel.is_cancelled() || Instant::now() >= deadline {
                        return false;
                    }
                    std::thread::sleep(Duration::from_millis(10).min(until.saturating_duration_since(Instant::now())));
                }
                true
            })?,
        )?;

        let resolver = Arc::clone(&self.resolver);
        let modules = self.modules.clone();
        globals.set(
            "__courierRequire",
            Function::new(ctx.clone(), move |name: String| -> String {
                match resolver.resolve(&name, &modules) {
                    Ok(ResolvedModule::Builtin(builtin)) => json!({ "builtin": builtin }),
                    Ok(ResolvedModule::Source { path, code }) => {
                        json!({ "path": path.display().to_string(), "code": code })
                    }
                    Err(ScriptError::ModuleNotFound { name, tried }) => {
                        json!({ "notFound": { "name": name, "tried": tried } })
                    }
                    Err(_) => json!({ "notFound": { "name": name, "tried": [] } }),
                }
                .to_string()
            })?,
        )?;

        let root = self.modules.collection_path.clone();
        let fs_allowed = self.fs_allowed;
        globals.set(
            "__courierFs",
            Function::new(ctx.clone(), move |request: String| -> String {
                if fs_allowed {
                    fs_call(&root, &request)
                } else {
                    json!({ "error": "filesystem access is disabled" }).to_string()
                }
            })?,
        )?;

        globals.set(
            "__courierUuid",
            Function::new(ctx.clone(), |_: String| -> String { uuid::Uuid::new_v4().to_string() })?,
        )?;
        globals.set(
            "__courierBase64",
            Function::new(ctx.clone(), |request: String| -> String { base64_call(&request) })?,
        )?;
        Ok(())
    }

    /// Runs the prelude to completion and returns its output document.
    fn execute(self) -> Result<String, ScriptError> {
        if self.cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }
        let runtime = Runtime::new().map_err(|e| ScriptError::Runtime(e.to_string()))?;
        runtime.set_memory_limit(self.limits.memory_bytes);
        runtime.set_max_stack_size(self.limits.stack_bytes);

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        let reason = Arc::new(AtomicU8::new(NOT_INTERRUPTED));
        {
            let reason = Arc::clone(&reason);
            let cancel = self.cancel.clone();
            runtime.set_interrupt_handler(Some(Box::new(move || {
                if cancel.is_cancelled() {
                    reason.store(CANCELLED, Ordering::SeqCst);
                    return true;
                }
                if Instant::now() >= deadline {
                    reason.store(TIMED_OUT, Ordering::SeqCst);
                    return true;
                }
                false
            })));
        }

        let context = Context::full(&runtime).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        let started = context.with(|ctx| -> Result<(), String> {
            ctx.globals()
                .set("__courierInput", self.input.as_str())
                .map_err(|e| engine_error(&ctx, &e))?;
            self.install_host_functions(&ctx, deadline)
                .map_err(|e| engine_error(&ctx, &e))?;
            ctx.eval::<(), _>(PRELUDE).map_err(|e| engine_error(&ctx, &e))
        });

        // Drain the job queue so awaited promises and async tests settle.
        loop {
            match runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    if reason.load(Ordering::SeqCst) != NOT_INTERRUPTED {
                        break;
                    }
                }
            }
        }

        if let Some(error) = self.interrupted(&reason) {
            return Err(error);
        }
        started.map_err(ScriptError::Runtime)?;

        let output = context.with(|ctx| ctx.globals().get::<_, Option<String>>("__courierResult"));
        match output {
            Ok(Some(output)) => Ok(output),
            Ok(None) => Err(ScriptError::Runtime(
                "script did not settle; a promise was never resolved".to_string(),
            )),
            Err(e) => Err(ScriptError::Runtime(e.to_string())),
        }
    }
}

impl ScriptRuntime for QuickJsRuntime {
    fn run_script<'a>(
        &'a self,
        request: ScriptRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptOutcome, ScriptError>> {
        Box::pin(async move {
            let mutable = request.request.is_mutable();
            let phase = request.phase.label();
            let job = Job {
                input: script_input(&request).to_string(),
                timeout_ms: request.timeout_ms,
                modules: ModuleContext {
                    collection_path: request.collection_path.clone(),
                    settings: request.settings.clone(),
                },
                fs_allowed: request.settings.filesystem_access.allow,
                resolver: Arc::clone(&self.resolver),
                limits: self.limits,
                cancel: cancel.clone(),
            };
            let started = Instant::now();
            let output = self.spawn(job).await;
            debug!(phase, elapsed_ms = started.elapsed().as_millis(), ok = output.is_ok(), "script finished");
            script_outcome(&output?, &request.script, mutable)
        })
    }

    fn evaluate_expression<'a>(
        &'a self,
        expression: &'a str,
        scope: &'a ExpressionScope,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptValue, ScriptError>> {
        Box::pin(async move {
            let job = Job {
                input: expression_input(expression, scope).to_string(),
                timeout_ms: self.limits.expression_timeout_ms,
                modules: ModuleContext::default(),
                fs_allowed: false,
                resolver: Arc::clone(&self.resolver),
                limits: self.limits,
                cancel: cancel.clone(),
            };
            let output = self.spawn(job).await?;
            expression_value(&output, expression)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_application::ports::{
        MutableRequestView, ReadRequestView, RequestBinding, RequestSnapshot, ResponseView,
    };
    use courier_domain::collection::{FilesystemAccess, ScriptSettings};
    use courier_domain::scripting::{ConsoleLevel, ScriptPhase};
    use courier_domain::testing::TestStatus;
    use courier_domain::variables::{VariableMap, VariablesContext};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn snapshot() -> RequestSnapshot {
        RequestSnapshot {
            name: "get-user".into(),
            url: "https://api.test/users/1".into(),
            method: "GET".into(),
            headers: vec![("Accept".into(), "application/json".into())],
            body: Value::Null,
            timeout_ms: None,
            max_redirects: 5,
            auth_mode: "none".into(),
        }
    }

    fn response() -> ResponseView {
        ResponseView {
            url: "https://api.test/users/1".into(),
            status: 200,
            status_text: "OK".into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: json!({"user": {"id": 1, "tags": ["a", "b"]}}),
            response_time_ms: 12,
            size: 40,
        }
    }

    fn script(source: &str, phase: ScriptPhase) -> ScriptRequest {
        let (request, response) = match phase {
            ScriptPhase::PreRequest => (RequestBinding::Mutable(MutableRequestView::new(snapshot())), None),
            _ => (RequestBinding::Read(ReadRequestView::new(snapshot())), Some(response())),
        };
        ScriptRequest {
            script: source.to_string(),
            phase,
            request,
            response,
            variables: VariablesContext::default(),
            collection_name: "Users".into(),
            collection_path: PathBuf::from("/tmp"),
            environment_name: Some("dev".into()),
            settings: ScriptSettings::default(),
            timeout_ms: 5_000,
        }
    }

    async fn run(request: ScriptRequest) -> Result<ScriptOutcome, ScriptError> {
        QuickJsRuntime::default()
            .run_script(request, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_pre_request_mutates_request_and_variables() {
        let outcome = run(script(
            r#"
            bru.setVar("x", 1 + 1);
            req.setHeader("x-trace", bru.getEnvName());
            req.setUrl(req.getUrl() + "?expand=true");
            console.info("prepared", { ok: true });
            "#,
            ScriptPhase::PreRequest,
        ))
        .await
        .unwrap();

        assert_eq!(outcome.runtime_variables["x"], json!(2));
        let request = outcome.request.unwrap();
        assert_eq!(request.url, "https://api.test/users/1?expand=true");
        assert_eq!(request.header("x-trace"), Some("dev"));
        assert_eq!(outcome.logs[0].level, ConsoleLevel::Info);
        assert_eq!(outcome.logs[0].args, vec![json!("prepared"), json!({"ok": true})]);
    }

    #[tokio::test]
    async fn test_request_is_read_only_after_response() {
        let err = run(script("req.setUrl('http://other.test')", ScriptPhase::PostResponse))
            .await
            .unwrap_err();
        let ScriptError::UserScript { message, script } = err else {
            unreachable!()
        };
        assert!(message.contains("not available after the response"));
        assert_eq!(script, "req.setUrl('http://other.test')");
    }

    #[tokio::test]
    async fn test_response_queries_and_body_replacement() {
        let outcome = run(script(
            r#"
            bru.setVar("tag", res("user.tags[1]"));
            bru.setVar("status", res.getStatus());
            bru.setVar("type", res.getHeader("content-type"));
            res.setBody({ replaced: true });
            "#,
            ScriptPhase::PostResponse,
        ))
        .await
        .unwrap();
        assert_eq!(outcome.runtime_variables["tag"], json!("b"));
        assert_eq!(outcome.runtime_variables["status"], json!(200));
        assert_eq!(outcome.runtime_variables["type"], json!("application/json"));
        assert_eq!(outcome.response_body, Some(json!({"replaced": true})));
        assert_eq!(outcome.request, None);
    }

    #[tokio::test]
    async fn test_tests_record_pass_and_fail() {
        let outcome = run(script(
            r#"
            test("status is 200", () => expect(res.status).to.equal(200));
            test("id is 2", () => expect(res.body.user.id).to.equal(2));
            test("async", async () => { await bru.sleep(1); assert.ok(true); });
            "#,
            ScriptPhase::Test,
        ))
        .await
        .unwrap();
        let statuses: Vec<_> = outcome.results.iter().map(|r| (r.description.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("status is 200", TestStatus::Pass),
                ("id is 2", TestStatus::Fail),
                ("async", TestStatus::Pass),
            ]
        );
        assert_eq!(outcome.results[1].expected, Some(json!(2)));
        assert_eq!(outcome.results[1].actual, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_invalid_variable_name() {
        let err = run(script("bru.setVar('bad name', 1)", ScriptPhase::PreRequest))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid characters"));
    }

    #[tokio::test]
    async fn test_runner_flags() {
        let outcome = run(script(
            "bru.runner.skipRequest(); bru.setNextRequest('logout'); bru.runner.stopExecution();",
            ScriptPhase::PreRequest,
        ))
        .await
        .unwrap();
        assert!(outcome.skip_request);
        assert!(outcome.stop_execution);
        assert_eq!(outcome.next_request_name.as_deref(), Some("logout"));
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let mut request = script("while (true) {}", ScriptPhase::PreRequest);
        request.timeout_ms = 100;
        assert_eq!(run(request).await.unwrap_err(), ScriptError::Timeout { timeout_ms: 100 });
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_script() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = QuickJsRuntime::default()
            .run_script(script("while (true) {}", ScriptPhase::PreRequest), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ScriptError::Cancelled);
    }

    #[tokio::test]
    async fn test_builtin_and_local_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greet.js"), "module.exports = (n) => 'hi ' + n;").unwrap();
        let mut request = script(
            r#"
            const greet = require("./greet");
            const { v4 } = require("uuid");
            bru.setVar("greeting", greet("bob"));
            bru.setVar("idLength", v4().length);
            bru.setVar("encoded", require("btoa")("abc"));
            "#,
            ScriptPhase::PreRequest,
        );
        request.collection_path = dir.path().to_path_buf();
        let outcome = run(request).await.unwrap();
        assert_eq!(outcome.runtime_variables["greeting"], json!("hi bob"));
        assert_eq!(outcome.runtime_variables["idLength"], json!(36));
        assert_eq!(outcome.runtime_variables["encoded"], json!("YWJj"));
    }

    #[tokio::test]
    async fn test_missing_module_and_denied_fs() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = script("require('left-pad')", ScriptPhase::PreRequest);
        request.collection_path = dir.path().to_path_buf();
        assert!(matches!(
            run(request.clone()).await,
            Err(ScriptError::ModuleNotFound { name, .. }) if name == "left-pad"
        ));

        request.script = "require('fs')".into();
        assert!(matches!(run(request).await, Err(ScriptError::ModuleNotFound { .. })));
    }

    #[tokio::test]
    async fn test_fs_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token.txt"), "secret").unwrap();
        let mut request = script(
            "bru.setVar('token', require('fs').readFileSync('token.txt'))",
            ScriptPhase::PreRequest,
        );
        request.collection_path = dir.path().to_path_buf();
        request.settings.filesystem_access = FilesystemAccess { allow: true };
        let outcome = run(request).await.unwrap();
        assert_eq!(outcome.runtime_variables["token"], json!("secret"));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_globals() {
        run(script("globalThis.leaked = 1;", ScriptPhase::PreRequest))
            .await
            .unwrap();
        let outcome = run(script(
            "bru.setVar('seen', typeof leaked)",
            ScriptPhase::PreRequest,
        ))
        .await
        .unwrap();
        assert_eq!(outcome.runtime_variables["seen"], json!("undefined"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_user_error() {
        let err = run(script("const = 1", ScriptPhase::PreRequest)).await.unwrap_err();
        assert!(matches!(err, ScriptError::UserScript { .. }));
    }

    fn scope() -> ExpressionScope {
        let mut variables = VariableMap::new();
        variables.insert("count".into(), json!(21));
        ExpressionScope {
            variables,
            process_env: VariableMap::new(),
            request: snapshot(),
            response: Some(response()),
        }
    }

    #[tokio::test]
    async fn test_expressions() {
        let runtime = QuickJsRuntime::default();
        let cancel = CancellationToken::new();
        let scope = scope();
        let eval = |expr: &'static str| {
            let runtime = runtime.clone();
            let cancel = cancel.clone();
            let scope = scope.clone();
            async move { runtime.evaluate_expression(expr, &scope, &cancel).await }
        };

        assert_eq!(eval("count * 2").await.unwrap(), ScriptValue::Json(json!(42)));
        assert_eq!(eval("res.status").await.unwrap(), ScriptValue::Json(json!(200)));
        assert_eq!(eval("res.body.user.tags").await.unwrap(), ScriptValue::Json(json!(["a", "b"])));
        assert_eq!(eval("res('user.missing')").await.unwrap(), ScriptValue::Undefined);
        assert_eq!(eval("req.method").await.unwrap(), ScriptValue::Json(json!("GET")));
        assert!(matches!(eval("nope.field").await, Err(ScriptError::UserScript { .. })));
    }

    #[test]
    fn test_base64_host_function() {
        assert_eq!(base64_call(r#"{"op": "encode", "text": "hi"}"#), "aGk=");
        assert_eq!(base64_call(r#"{"op": "decode", "text": "aGk="}"#), "hi");
    }
}
