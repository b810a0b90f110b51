//! Script runtime port and the plain data exchanged with it.
//!
//! Everything crosses the boundary by value. A script sees a request view
//! and, once a response exists, a response view; it hands back a
//! [`ScriptOutcome`] with the writable scopes after the run. Whether the
//! request may be changed is decided by the [`RequestBinding`] variant, not
//! by a runtime flag.

use std::path::PathBuf;

use courier_domain::collection::ScriptSettings;
use courier_domain::request::{HttpMethod, HttpRequest, KeyValue, MultipartField, RequestBody};
use courier_domain::scripting::{ConsoleEntry, ScriptPhase};
use courier_domain::testing::TestResult;
use courier_domain::variables::{VariableMap, VariablesContext};
use courier_domain::wire::{self, HeaderList, Response};
use courier_domain::DomainResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ScriptError;

use super::{BoxFuture, CancellationToken};

/// The request as a script sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Request name.
    pub name: String,
    /// URL.
    pub url: String,
    /// Method.
    pub method: String,
    /// Enabled headers in order.
    pub headers: HeaderList,
    /// Body: parsed JSON for JSON bodies, a string for text bodies, an
    /// object for forms, `null` when absent.
    pub body: Value,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Redirect budget.
    pub max_redirects: u32,
    /// Auth mode.
    pub auth_mode: String,
}

impl RequestSnapshot {
    /// Snapshot of a working request.
    #[must_use]
    pub fn from_request(name: &str, request: &HttpRequest) -> Self {
        Self {
            name: name.to_string(),
            url: request.url.clone(),
            method: request.method.as_str().to_string(),
            headers: request
                .headers
                .iter()
                .filter(|h| h.enabled)
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect(),
            body: body_to_value(&request.body),
            timeout_ms: request.settings.timeout_ms,
            max_redirects: request.max_redirects(),
            auth_mode: request.auth.mode().to_string(),
        }
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        wire::header_value(&self.headers, name)
    }
}

/// Request body as a script value.
#[must_use]
pub fn body_to_value(body: &RequestBody) -> Value {
    match body {
        RequestBody::None => Value::Null,
        RequestBody::Json { json } => {
            serde_json::from_str(json).unwrap_or_else(|_| Value::String(json.clone()))
        }
        RequestBody::Text { text } => Value::String(text.clone()),
        RequestBody::Xml { xml } => Value::String(xml.clone()),
        RequestBody::Sparql { sparql } => Value::String(sparql.clone()),
        RequestBody::FormUrlEncoded { fields } => Value::Object(
            fields
                .iter()
                .filter(|f| f.enabled)
                .map(|f| (f.name.clone(), Value::String(f.value.clone())))
                .collect(),
        ),
        RequestBody::MultipartForm { fields } => {
            let mut map = Map::new();
            for field in fields.iter().filter(|f| f.is_enabled()) {
                let (name, value) = match field {
                    MultipartField::Text { name, value, .. } => {
                        (name, Value::String(value.clone()))
                    }
                    MultipartField::File { name, paths, .. } => (
                        name,
                        Value::Array(paths.iter().cloned().map(Value::String).collect()),
                    ),
                };
                map.insert(name.clone(), value);
            }
            Value::Object(map)
        }
        RequestBody::Graphql { query, variables } => {
            let variables = if variables.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(variables).unwrap_or_else(|_| Value::String(variables.clone()))
            };
            serde_json::json!({ "query": query, "variables": variables })
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A request a pre-request script may change.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableRequestView(RequestSnapshot);

impl MutableRequestView {
    /// Wraps a snapshot.
    #[must_use]
    pub const fn new(snapshot: RequestSnapshot) -> Self {
        Self(snapshot)
    }

    /// Read access.
    #[must_use]
    pub const fn snapshot(&self) -> &RequestSnapshot {
        &self.0
    }

    /// Replaces the URL.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.0.url = url.into();
    }

    /// Replaces the method.
    pub fn set_method(&mut self, method: impl Into<String>) {
        self.0.method = method.into();
    }

    /// Sets a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        wire::set_header(&mut self.0.headers, name, value);
    }

    /// Removes a header.
    pub fn delete_header(&mut self, name: &str) {
        wire::remove_header(&mut self.0.headers, name);
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: Value) {
        self.0.body = body;
    }

    /// Replaces the timeout.
    pub const fn set_timeout(&mut self, timeout_ms: u64) {
        self.0.timeout_ms = Some(timeout_ms);
    }

    /// Replaces the redirect budget.
    pub const fn set_max_redirects(&mut self, max_redirects: u32) {
        self.0.max_redirects = max_redirects;
    }

    /// Unwraps the snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> RequestSnapshot {
        self.0
    }

    /// Writes the view back into a working request.
    ///
    /// The body is only rewritten when it differs from the request's own
    /// body, so untouched multipart and form bodies keep their shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is not a known HTTP method.
    pub fn apply_to(&self, request: &mut HttpRequest) -> DomainResult<()> {
        let view = &self.0;
        request.url.clone_from(&view.url);
        request.method = view.method.parse::<HttpMethod>()?;
        request.headers = view
            .headers
            .iter()
            .map(|(name, value)| KeyValue::new(name.clone(), value.clone()))
            .collect();
        request.settings.timeout_ms = view.timeout_ms;
        request.settings.max_redirects = Some(view.max_redirects);

        if body_to_value(&request.body) != view.body {
            request.body = match (&request.body, &view.body) {
                (_, Value::Null) => RequestBody::None,
                (RequestBody::Json { .. }, value) => RequestBody::Json {
                    json: value_to_text(value),
                },
                (RequestBody::Xml { .. }, value) => RequestBody::Xml {
                    xml: value_to_text(value),
                },
                (RequestBody::Sparql { .. }, value) => RequestBody::Sparql {
                    sparql: value_to_text(value),
                },
                (RequestBody::FormUrlEncoded { .. }, Value::Object(map)) => {
                    RequestBody::FormUrlEncoded {
                        fields: map
                            .iter()
                            .map(|(k, v)| KeyValue::new(k.clone(), value_to_text(v)))
                            .collect(),
                    }
                }
                (_, Value::String(text)) => RequestBody::Text { text: text.clone() },
                (_, value) => RequestBody::Json {
                    json: value.to_string(),
                },
            };
        }
        Ok(())
    }
}

/// A request after the response exists; scripts may only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequestView(RequestSnapshot);

impl ReadRequestView {
    /// Wraps a snapshot.
    #[must_use]
    pub const fn new(snapshot: RequestSnapshot) -> Self {
        Self(snapshot)
    }

    /// Read access.
    #[must_use]
    pub const fn snapshot(&self) -> &RequestSnapshot {
        &self.0
    }
}

/// The `req` binding of one script run.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBinding {
    /// Pre-request: setters are available.
    Mutable(MutableRequestView),
    /// After the response: setters throw.
    Read(ReadRequestView),
}

impl RequestBinding {
    /// Read access.
    #[must_use]
    pub const fn snapshot(&self) -> &RequestSnapshot {
        match self {
            Self::Mutable(view) => view.snapshot(),
            Self::Read(view) => view.snapshot(),
        }
    }

    /// Whether setters are available.
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        matches!(self, Self::Mutable(_))
    }
}

/// The response as a script sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseView {
    /// Final URL.
    pub url: String,
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Headers.
    pub headers: HeaderList,
    /// Body: parsed JSON or a string.
    pub body: Value,
    /// Total response time.
    pub response_time_ms: u64,
    /// Decoded size.
    pub size: usize,
}

impl ResponseView {
    /// View of a recorded response.
    #[must_use]
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.data.clone(),
            response_time_ms: response.response_time_ms,
            size: response.size,
        }
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        wire::header_value(&self.headers, name)
    }
}

/// Input of one script run.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    /// Source to run.
    pub script: String,
    /// Phase, which decides the injected test helpers.
    pub phase: ScriptPhase,
    /// `req` binding.
    pub request: RequestBinding,
    /// `res` binding, present once a response exists.
    pub response: Option<ResponseView>,
    /// All scopes, by value.
    pub variables: VariablesContext,
    /// Collection name, for `bru.getCollectionName()`.
    pub collection_name: String,
    /// Collection directory, the root for module resolution.
    pub collection_path: PathBuf,
    /// Selected environment, for `bru.getEnvName()`.
    pub environment_name: Option<String>,
    /// Module whitelist and filesystem access.
    pub settings: ScriptSettings,
    /// Deadline for the whole run.
    pub timeout_ms: u64,
}

/// Everything a script run hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    /// Body replaced through `res.setBody`.
    pub response_body: Option<Value>,
    /// Environment scope after the run.
    pub env_variables: VariableMap,
    /// Runtime scope after the run.
    pub runtime_variables: VariableMap,
    /// Global scope after the run.
    pub global_variables: VariableMap,
    /// Set by `bru.setNextRequest`.
    pub next_request_name: Option<String>,
    /// Results of `test(...)` blocks.
    pub results: Vec<TestResult>,
    /// The request after a mutable run.
    pub request: Option<RequestSnapshot>,
    /// Console output.
    pub logs: Vec<ConsoleEntry>,
    /// `bru.runner.skipRequest()` was called.
    pub skip_request: bool,
    /// `bru.runner.stopExecution()` was called.
    pub stop_execution: bool,
}

/// Bindings available to a standalone expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionScope {
    /// Merged variables, exposed as globals.
    pub variables: VariableMap,
    /// Process environment.
    pub process_env: VariableMap,
    /// `req`.
    pub request: RequestSnapshot,
    /// `res`.
    pub response: Option<ResponseView>,
}

/// A JavaScript value after crossing the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// `undefined`, which JSON cannot carry.
    Undefined,
    /// Any JSON-representable value.
    Json(Value),
}

impl ScriptValue {
    /// Whether this is `undefined`.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The JSON value, mapping `undefined` to `None`.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Undefined => None,
            Self::Json(value) => Some(value),
        }
    }

    /// JavaScript truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Json(Value::Null) => false,
            Self::Json(Value::Bool(b)) => *b,
            Self::Json(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Self::Json(Value::String(s)) => !s.is_empty(),
            Self::Json(Value::Array(_) | Value::Object(_)) => true,
        }
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Runs user JavaScript in an isolated sandbox.
pub trait ScriptRuntime: Send + Sync {
    /// Runs a pre-request, post-response or test script.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::UserScript`] when user code throws, and other
    /// variants for module, engine, timeout and cancellation failures.
    fn run_script<'a>(
        &'a self,
        request: ScriptRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptOutcome, ScriptError>>;

    /// Evaluates one expression with the scope's bindings.
    ///
    /// # Errors
    ///
    /// Returns a [`ScriptError`] when evaluation throws.
    fn evaluate_expression<'a>(
        &'a self,
        expression: &'a str,
        scope: &'a ExpressionScope,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptValue, ScriptError>>;
}
