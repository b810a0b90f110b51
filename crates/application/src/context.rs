//! The unit of work threaded through every pipeline stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use courier_domain::collection::Collection;
use courier_domain::cookie::SharedCookieJar;
use courier_domain::debug::DebugLog;
use courier_domain::environment::Environment;
use courier_domain::events::{EventIds, EventSink, RequestEvent};
use courier_domain::preferences::Preferences;
use courier_domain::preview::PreviewMode;
use courier_domain::proxy::ProxyPolicy;
use courier_domain::request::{HttpRequest, RequestItem};
use courier_domain::testing::{AssertionResult, TestResult};
use courier_domain::variables::VariablesContext;
use courier_domain::wire::{RequestOptions, Response, TimelineEntry};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, ScriptError};
use crate::ports::CancellationToken;
use crate::prepare::FolderData;

/// Who started the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A single request sent by the user.
    #[default]
    Standalone,
    /// Part of a folder or collection run.
    Runner,
}

/// Terminal state of a context.
#[derive(Debug, Default)]
pub enum Outcome {
    /// Still running.
    #[default]
    Pending,
    /// A final response was recorded.
    Response(Box<Response>),
    /// The pipeline stopped with an error.
    Error(PipelineError),
    /// A pre-request script called `bru.runner.skipRequest()`.
    Skipped,
}

/// Milliseconds spent per stage, in order.
#[derive(Debug, Clone)]
pub struct Timings {
    started: Instant,
    last: Instant,
    stages: Vec<(String, u64)>,
}

impl Timings {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Records the time since the previous mark under `stage`.
    pub fn mark(&mut self, stage: &str) {
        let now = Instant::now();
        let elapsed = u64::try_from(now.duration_since(self.last).as_millis()).unwrap_or(u64::MAX);
        self.stages.push((stage.to_string(), elapsed));
        self.last = now;
    }

    /// Stage durations in recording order.
    #[must_use]
    pub fn stages(&self) -> &[(String, u64)] {
        &self.stages
    }

    /// Milliseconds since the context was created.
    #[must_use]
    pub fn total_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Caller-supplied inputs of one request.
#[derive(Debug, Clone)]
pub struct ContextInputs {
    /// The request to run; its draft, if any, is what runs.
    pub request_item: RequestItem,
    /// The collection holding it.
    pub collection: Arc<Collection>,
    /// Selected environment.
    pub environment: Option<Environment>,
    /// Application preferences.
    pub preferences: Preferences,
    /// Long-lived cookie jar.
    pub cookie_jar: SharedCookieJar,
    /// Where response bodies are written.
    pub data_dir: PathBuf,
    /// Initial scopes.
    pub variables: VariablesContext,
    /// Progress events.
    pub events: EventSink,
    /// Cancels the pipeline.
    pub cancel: CancellationToken,
    /// Who started the request.
    pub execution_mode: ExecutionMode,
    /// Caller version, sent in the user agent.
    pub version: String,
}

/// Mutable state of one request execution.
#[derive(Debug)]
pub struct RequestContext {
    /// Context uid; also the response body file name.
    pub uid: String,
    /// Cancels the pipeline.
    pub cancel: CancellationToken,
    /// Who started the request.
    pub execution_mode: ExecutionMode,
    /// Caller version, sent in the user agent.
    pub version: String,
    /// The item as supplied.
    pub request_item: RequestItem,
    /// Working copy of the effective request.
    pub request: HttpRequest,
    /// The collection holding the item.
    pub collection: Arc<Collection>,
    /// Selected environment.
    pub environment: Option<Environment>,
    /// Application preferences.
    pub preferences: Preferences,
    /// Shared cookie jar.
    pub cookie_jar: SharedCookieJar,
    /// Where the response body is written.
    pub data_dir: PathBuf,
    /// Scope bag.
    pub variables: VariablesContext,
    /// Ancestor folders, outermost first.
    pub folder_data: Vec<FolderData>,
    /// Proxy decision before bypass matching.
    pub proxy: ProxyPolicy,
    /// Wire request, once built.
    pub http_request: Option<RequestOptions>,
    /// Exchange timeline across all hops.
    pub timeline: Vec<TimelineEntry>,
    /// How the body should be shown.
    pub preview_mode: Option<PreviewMode>,
    /// Stage timings.
    pub timings: Timings,
    /// Structured debug records.
    pub debug: DebugLog,
    /// Event sink.
    pub events: EventSink,
    /// Set by `bru.setNextRequest`.
    pub next_request_name: Option<String>,
    /// Set by `bru.runner.stopExecution()`.
    pub stop_execution: bool,
    /// Assertion results.
    pub assertion_results: Vec<AssertionResult>,
    /// Test results.
    pub test_results: Vec<TestResult>,
    /// Script failures after the response was recorded.
    pub post_response_errors: Vec<ScriptError>,
    outcome: Outcome,
}

impl RequestContext {
    /// Creates a pending context.
    #[must_use]
    pub fn new(inputs: ContextInputs) -> Self {
        let request = inputs.request_item.effective_request().clone();
        Self {
            uid: courier_domain::generate_id(),
            cancel: inputs.cancel,
            execution_mode: inputs.execution_mode,
            version: inputs.version,
            request_item: inputs.request_item,
            request,
            collection: inputs.collection,
            environment: inputs.environment,
            preferences: inputs.preferences,
            cookie_jar: inputs.cookie_jar,
            data_dir: inputs.data_dir,
            variables: inputs.variables,
            folder_data: Vec::new(),
            proxy: ProxyPolicy::Direct,
            http_request: None,
            timeline: Vec::new(),
            preview_mode: None,
            timings: Timings::new(),
            debug: DebugLog::new(),
            events: inputs.events,
            next_request_name: None,
            stop_execution: false,
            assertion_results: Vec::new(),
            test_results: Vec::new(),
            post_response_errors: Vec::new(),
            outcome: Outcome::Pending,
        }
    }

    /// Identifiers attached to events.
    #[must_use]
    pub fn ids(&self) -> EventIds {
        EventIds {
            collection_uid: self.collection.uid.clone(),
            item_uid: self.request_item.uid.clone(),
            request_uid: self.uid.clone(),
        }
    }

    /// Sends an event.
    pub fn emit(&self, event: RequestEvent) {
        self.events.emit(event);
    }

    /// Fails fast when cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] once the token fired.
    pub fn check_cancelled(&self) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Records the final response, replacing any earlier outcome.
    pub fn set_response(&mut self, response: Response) {
        self.outcome = Outcome::Response(Box::new(response));
    }

    /// Records a terminal error, replacing any earlier outcome.
    pub fn set_error(&mut self, error: PipelineError) {
        self.outcome = Outcome::Error(error);
    }

    /// Marks the request as skipped.
    pub fn set_skipped(&mut self) {
        self.outcome = Outcome::Skipped;
    }

    /// The terminal outcome.
    #[must_use]
    pub const fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// The final response, if one was recorded.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match &self.outcome {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Mutable access to the recorded response.
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        match &mut self.outcome {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }

    /// The terminal error, if the pipeline failed.
    #[must_use]
    pub const fn error(&self) -> Option<&PipelineError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    /// The response body as written to disk.
    #[must_use]
    pub fn response_body(&self) -> Option<&[u8]> {
        self.response().map(|r| r.body.as_slice())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use courier_domain::cookie::CookieJar;
    use courier_domain::request::HttpMethod;

    pub(crate) fn context_for(request: HttpRequest, collection: Collection) -> RequestContext {
        RequestContext::new(ContextInputs {
            request_item: RequestItem::new("req-1", "Request", request),
            collection: Arc::new(collection),
            environment: None,
            preferences: Preferences::default(),
            cookie_jar: SharedCookieJar::new(CookieJar::new()),
            data_dir: std::env::temp_dir(),
            variables: VariablesContext::default(),
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            execution_mode: ExecutionMode::Standalone,
            version: "0.0.0-test".into(),
        })
    }

    fn sample_response() -> Response {
        Response {
            url: "http://x.test".into(),
            status: 200,
            status_text: "OK".into(),
            http_version: "HTTP/1.1".into(),
            headers: Vec::new(),
            body: b"ok".to_vec(),
            data: serde_json::json!("ok"),
            size: 2,
            response_time_ms: 1,
            data_path: None,
            tls: None,
            info: None,
        }
    }

    #[test]
    fn test_outcome_is_exclusive() {
        let mut ctx = context_for(
            HttpRequest::new(HttpMethod::Get, "http://x.test"),
            Collection::new("c", "C"),
        );
        assert!(matches!(ctx.outcome(), Outcome::Pending));

        ctx.set_response(sample_response());
        assert!(ctx.response().is_some());
        assert!(ctx.error().is_none());

        ctx.set_error(PipelineError::Cancelled);
        assert!(ctx.response().is_none());
        assert!(ctx.error().is_some());
    }

    #[test]
    fn test_draft_shadows_saved_request() {
        let mut item = RequestItem::new(
            "r",
            "R",
            HttpRequest::new(HttpMethod::Get, "http://saved.test"),
        );
        item.draft = Some(HttpRequest::new(HttpMethod::Post, "http://draft.test"));
        let ctx = RequestContext::new(ContextInputs {
            request_item: item,
            collection: Arc::new(Collection::new("c", "C")),
            environment: None,
            preferences: Preferences::default(),
            cookie_jar: SharedCookieJar::new(CookieJar::new()),
            data_dir: std::env::temp_dir(),
            variables: VariablesContext::default(),
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            execution_mode: ExecutionMode::Runner,
            version: "0.0.0-test".into(),
        });
        assert_eq!(ctx.request.url, "http://draft.test");
        assert_eq!(ctx.request_item.request.url, "http://saved.test");
    }

    #[test]
    fn test_cancel_check() {
        let ctx = context_for(HttpRequest::default(), Collection::new("c", "C"));
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(PipelineError::Cancelled)));
    }
}
