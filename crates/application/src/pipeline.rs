//! The request pipeline orchestrator.
//!
//! Composes the stage functions in their fixed order. Every stage takes the
//! context and either mutates it or fails; the first failure before the
//! response is recorded becomes the terminal error. Later failures are kept
//! on the context next to the response.

use std::sync::Arc;
use std::time::Duration;

use courier_domain::events::{RequestEvent, SentRequest};
use courier_domain::wire::WireBody;
use tracing::{Instrument, debug, info_span, warn};

use crate::context::{ContextInputs, Outcome, RequestContext};
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{AuthorizationCodeFetcher, HttpTransport, ScriptRuntime};
use crate::post_response::{
    evaluate_post_response_vars, process_response, run_assertions, run_post_response_script,
    run_tests,
};
use crate::prepare::{
    apply_oauth2, build_request_options, collect_folder_data, evaluate_pre_request_vars,
    interpolate_request, merge_collection_settings, resolve_proxy_policy, run_pre_request_script,
};
use crate::request_handler::execute_request;

/// Adapters the pipeline talks to.
#[derive(Clone)]
pub struct PipelineServices {
    /// Sends one HTTP exchange.
    pub transport: Arc<dyn HttpTransport>,
    /// Runs scripts and evaluates expressions.
    pub scripts: Arc<dyn ScriptRuntime>,
    /// Obtains authorization codes for the `OAuth2` code grant.
    pub authorization: Option<Arc<dyn AuthorizationCodeFetcher>>,
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices")
            .field("authorization", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

async fn wait_for_delay(ctx: &RequestContext, delay_ms: u64) -> PipelineResult<()> {
    if delay_ms == 0 {
        return Ok(());
    }
    ctx.emit(RequestEvent::RequestDelayed {
        ids: ctx.ids(),
        delay_ms,
    });
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(()),
        () = ctx.cancel.cancelled() => Err(PipelineError::Cancelled),
    }
}

/// Everything before the wire: folder data through wire construction.
///
/// Stops early, without error, when the pre-request script skipped the
/// request.
///
/// # Errors
///
/// Returns the first stage failure.
pub async fn prepare_request(ctx: &mut RequestContext, services: &PipelineServices) -> PipelineResult<()> {
    ctx.folder_data = collect_folder_data(&ctx.collection, &ctx.request_item.uid)?;
    merge_collection_settings(&mut ctx.request, &ctx.collection, &ctx.folder_data);
    ctx.proxy = resolve_proxy_policy(&ctx.collection.config.proxy, &ctx.preferences.proxy);
    ctx.timings.mark("settings");

    evaluate_pre_request_vars(ctx, services.scripts.as_ref()).await?;
    ctx.check_cancelled()?;
    run_pre_request_script(ctx, services.scripts.as_ref()).await?;
    ctx.timings.mark("pre-request-script");
    if matches!(ctx.outcome(), Outcome::Skipped) {
        debug!("request skipped by pre-request script");
        return Ok(());
    }

    let unresolved = interpolate_request(ctx);
    if !unresolved.is_empty() {
        debug!(?unresolved, "placeholders left unresolved");
    }
    apply_oauth2(ctx, services.authorization.as_deref()).await?;
    ctx.http_request = Some(build_request_options(ctx)?);
    ctx.timings.mark("prepare");
    Ok(())
}

/// Preparation without side effects, for code generation.
///
/// Runs the settings, variable and interpolation stages and builds the
/// wire request. Scripts, `OAuth2` and the transport are left out.
///
/// # Errors
///
/// Returns the first stage failure.
pub async fn prepare_offline(ctx: &mut RequestContext, scripts: &dyn ScriptRuntime) -> PipelineResult<()> {
    ctx.folder_data = collect_folder_data(&ctx.collection, &ctx.request_item.uid)?;
    merge_collection_settings(&mut ctx.request, &ctx.collection, &ctx.folder_data);
    ctx.proxy = resolve_proxy_policy(&ctx.collection.config.proxy, &ctx.preferences.proxy);
    evaluate_pre_request_vars(ctx, scripts).await?;
    interpolate_request(ctx);
    ctx.http_request = Some(build_request_options(ctx)?);
    Ok(())
}

fn sent_request(ctx: &RequestContext) -> Option<SentRequest> {
    let options = ctx.http_request.as_ref()?;
    let data = match &options.body {
        WireBody::None => None,
        WireBody::Text(text) => Some(text.clone()),
        WireBody::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        WireBody::Multipart(parts) => Some(format!("<multipart: {} parts>", parts.len())),
    };
    Some(SentRequest {
        method: options.method.as_str().to_string(),
        url: options.url.clone(),
        headers: options.headers.clone(),
        data,
    })
}

async fn send_and_record(ctx: &mut RequestContext, services: &PipelineServices) -> PipelineResult<()> {
    if let Some(request) = sent_request(ctx) {
        ctx.emit(RequestEvent::RequestSent {
            ids: ctx.ids(),
            request,
        });
    }
    execute_request(ctx, services.transport.as_ref()).await?;
    ctx.timings.mark("send");

    process_response(ctx).await?;
    ctx.timings.mark("decode");
    if let Some(response) = ctx.response() {
        ctx.emit(RequestEvent::ResponseReceived {
            ids: ctx.ids(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            data: response.data.clone(),
            duration_ms: response.response_time_ms,
            size: response.size,
        });
    }
    Ok(())
}

async fn after_response(ctx: &mut RequestContext, services: &PipelineServices) {
    let scripts = services.scripts.as_ref();
    evaluate_post_response_vars(ctx, scripts).await;
    if ctx.cancel.is_cancelled() {
        return;
    }
    run_post_response_script(ctx, scripts).await;
    run_assertions(ctx, scripts).await;
    if ctx.cancel.is_cancelled() {
        return;
    }
    run_tests(ctx, scripts).await;
    ctx.timings.mark("post-response");
}

/// Runs every stage on `ctx`, recording the outcome on it.
pub async fn run_pipeline(ctx: &mut RequestContext, services: &PipelineServices, delay_ms: u64) {
    ctx.emit(RequestEvent::RequestQueued { ids: ctx.ids() });

    let result = async {
        wait_for_delay(ctx, delay_ms).await?;
        prepare_request(ctx, services).await?;
        if matches!(ctx.outcome(), Outcome::Skipped) {
            return Ok(());
        }
        send_and_record(ctx, services).await
    }
    .await;

    if let Err(error) = result {
        warn!(%error, "request failed");
        ctx.debug.log("pipeline", format!("request failed: {error}"));
        ctx.emit(RequestEvent::ResponseError {
            ids: ctx.ids(),
            error: error.to_string(),
        });
        ctx.set_error(error);
        return;
    }
    if ctx.response().is_some() {
        after_response(ctx, services).await;
    }
    debug!(total_ms = ctx.timings.total_ms(), "pipeline finished");
}

/// Creates a context from `inputs` and runs the pipeline on it.
pub async fn run_request(inputs: ContextInputs, services: &PipelineServices, delay_ms: u64) -> RequestContext {
    let mut ctx = RequestContext::new(inputs);
    let span = info_span!("request", uid = %ctx.uid, item = %ctx.request_item.name);
    run_pipeline(&mut ctx, services, delay_ms).instrument(span).await;
    ctx
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::ports::ScriptOutcome;
    use crate::test_support::{MockScriptRuntime, MockTransport, info};
    use courier_domain::collection::{Collection, CollectionItem};
    use courier_domain::events::{EventEnvelope, EventSink};
    use courier_domain::request::{HttpMethod, HttpRequest, KeyValue, RequestItem};
    use courier_domain::testing::AssertionSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn services(transport: MockTransport, scripts: MockScriptRuntime) -> (PipelineServices, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let services = PipelineServices {
            transport: transport.clone(),
            scripts: Arc::new(scripts),
            authorization: None,
        };
        (services, transport)
    }

    fn context(request: HttpRequest, dir: &std::path::Path) -> RequestContext {
        let item = RequestItem::new("req-1", "Request", request.clone());
        let collection = Collection::new("c", "C").with_item(CollectionItem::Http(item));
        let mut ctx = context_for(request, collection);
        ctx.data_dir = dir.to_path_buf();
        ctx
    }

    fn event_names(rx: &mut courier_domain::events::EventReceiver) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            let EventEnvelope::Request(event) = envelope else {
                continue;
            };
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn test_script_variable_reaches_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://api.test/items");
        request.script.req = "bru.setVar('x', 1 + 1)".into();
        request.headers.push(KeyValue::new("x-count", "{{x}}"));
        request.assertions.push(AssertionSpec::new("res.status", "eq 200"));
        let mut ctx = context(request, dir.path());
        let (sink, mut rx) = EventSink::channel();
        ctx.events = sink;

        let scripts = MockScriptRuntime::with_handler(|input| {
            let mut runtime = input.variables.runtime_variables().clone();
            runtime.insert("x".into(), json!(2));
            Ok(ScriptOutcome {
                runtime_variables: runtime,
                ..ScriptOutcome::default()
            })
        });
        let (services, transport) = services(MockTransport::new([info(200, &[], r#"{"id":1}"#)]), scripts);
        run_pipeline(&mut ctx, &services, 0).await;

        assert_eq!(transport.sent()[0].header("x-count"), Some("2"));
        let response = ctx.response().unwrap();
        assert_eq!(response.data, json!({"id": 1}));
        assert!(ctx.assertion_results[0].passed());
        assert_eq!(
            event_names(&mut rx),
            vec![
                "request-queued",
                "script-environment-update",
                "request-sent",
                "response-received",
                "assertion-results",
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_request_error_prevents_send() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://api.test/");
        request.script.req = "throw new Error('nope')".into();
        let mut ctx = context(request, dir.path());
        let scripts = MockScriptRuntime::with_handler(|input| {
            Err(crate::error::ScriptError::UserScript {
                message: "nope".into(),
                script: input.script.clone(),
            })
        });
        let (services, transport) = services(MockTransport::new([info(200, &[], "")]), scripts);
        run_pipeline(&mut ctx, &services, 0).await;

        assert!(transport.sent().is_empty());
        assert!(ctx.error().unwrap().is_script_error());
    }

    #[tokio::test]
    async fn test_skipped_request_is_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://api.test/");
        request.script.req = "bru.runner.skipRequest()".into();
        let mut ctx = context(request, dir.path());
        let scripts = MockScriptRuntime::with_handler(|_| {
            Ok(ScriptOutcome {
                skip_request: true,
                ..ScriptOutcome::default()
            })
        });
        let (services, transport) = services(MockTransport::default(), scripts);
        run_pipeline(&mut ctx, &services, 0).await;

        assert!(transport.sent().is_empty());
        assert!(matches!(ctx.outcome(), Outcome::Skipped));
    }

    #[tokio::test]
    async fn test_transport_failure_is_terminal_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(HttpRequest::new(HttpMethod::Get, "http://api.test/"), dir.path());
        let (services, _) = services(MockTransport::default(), MockScriptRuntime::default());
        run_pipeline(&mut ctx, &services, 0).await;

        assert_eq!(ctx.error().unwrap().to_string(), "connection refused");
        assert!(ctx.response().is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_delay() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(HttpRequest::new(HttpMethod::Get, "http://api.test/"), dir.path());
        let (services, transport) = services(MockTransport::default(), MockScriptRuntime::default());
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        run_pipeline(&mut ctx, &services, 60_000).await;

        assert!(matches!(ctx.error(), Some(PipelineError::Cancelled)));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_request_is_topology_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_for(
            HttpRequest::new(HttpMethod::Get, "http://api.test/"),
            Collection::new("c", "C"),
        );
        ctx.data_dir = dir.path().to_path_buf();
        let (services, _) = services(MockTransport::default(), MockScriptRuntime::default());
        run_pipeline(&mut ctx, &services, 0).await;
        assert!(matches!(
            ctx.error(),
            Some(PipelineError::Domain(courier_domain::DomainError::Topology(_)))
        ));
    }

    #[tokio::test]
    async fn test_offline_preparation_skips_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://api.test/{{path}}");
        request.script.req = "bru.setVar('path', 'other')".into();
        let mut ctx = context(request, dir.path());
        ctx.variables.set_runtime_variable("path", json!("items"));
        let scripts = MockScriptRuntime::default();

        prepare_offline(&mut ctx, &scripts).await.unwrap();
        assert!(scripts.runs().is_empty());
        assert_eq!(ctx.http_request.unwrap().url, "http://api.test/items");
    }
}
