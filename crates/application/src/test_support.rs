//! Port doubles shared by the unit tests of this crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use courier_domain::scripting::ScriptPhase;
use courier_domain::variables::VariableMap;
use courier_domain::wire::{HttpRequestInfo, RequestOptions};
use serde_json::Value;

use crate::error::{OAuth2Error, ScriptError};
use crate::ports::{
    AuthorizationCodeFetcher, BoxFuture, CancellationToken, ExpressionScope, HttpTransport,
    RequestSnapshot, ScriptOutcome, ScriptRequest, ScriptRuntime, ScriptValue,
};
use crate::variable_resolver::{lookup_path, render_value};

type RunHandler = dyn Fn(&ScriptRequest) -> Result<ScriptOutcome, ScriptError> + Send + Sync;

/// Script runtime double.
///
/// Scripts are answered by an optional handler. Expressions understand a
/// tiny subset: variable names, `res.status`, `res.body[.path]`,
/// `res.headers.<name>`, `req.url`, `req.method`, `${name}` templates and
/// `fail()`, which throws.
#[derive(Default)]
pub struct MockScriptRuntime {
    handler: Option<Arc<RunHandler>>,
    runs: Mutex<Vec<(ScriptPhase, String)>>,
    expressions: Mutex<Vec<String>>,
}

impl MockScriptRuntime {
    pub fn with_handler(
        handler: impl Fn(&ScriptRequest) -> Result<ScriptOutcome, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    pub fn runs(&self) -> Vec<(ScriptPhase, String)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn expressions(&self) -> Vec<String> {
        self.expressions.lock().unwrap().clone()
    }

    pub fn empty_scope() -> ExpressionScope {
        ExpressionScope {
            variables: VariableMap::new(),
            process_env: VariableMap::new(),
            request: RequestSnapshot::from_request("test", &Default::default()),
            response: None,
        }
    }

    fn evaluate(expression: &str, scope: &ExpressionScope) -> Result<ScriptValue, ScriptError> {
        if expression == "fail()" {
            return Err(ScriptError::UserScript {
                message: "fail is not defined".into(),
                script: expression.into(),
            });
        }
        if let Some(template) = expression.strip_prefix('`').and_then(|e| e.strip_suffix('`')) {
            let mut out = String::new();
            let mut rest = template;
            while let Some(start) = rest.find("${") {
                out.push_str(&rest[..start]);
                let Some(end) = rest[start..].find('}') else {
                    break;
                };
                let name = &rest[start + 2..start + end];
                if let Some(value) = lookup_path(&scope.variables, name.trim()) {
                    out.push_str(&render_value(value));
                }
                rest = &rest[start + end + 1..];
            }
            out.push_str(rest);
            return Ok(Value::String(out).into());
        }

        if let Some(response) = &scope.response {
            if expression == "res.status" {
                return Ok(Value::from(response.status).into());
            }
            if expression == "res.body" {
                return Ok(response.body.clone().into());
            }
            if let Some(path) = expression.strip_prefix("res.body.") {
                let mut wrapper = VariableMap::new();
                wrapper.insert("body".into(), response.body.clone());
                return Ok(lookup_path(&wrapper, &format!("body.{path}"))
                    .cloned()
                    .map_or(ScriptValue::Undefined, ScriptValue::Json));
            }
            if let Some(name) = expression.strip_prefix("res.headers.") {
                return Ok(response
                    .header(name)
                    .map_or(ScriptValue::Undefined, |v| Value::String(v.into()).into()));
            }
        }
        match expression {
            "req.url" => return Ok(Value::String(scope.request.url.clone()).into()),
            "req.method" => return Ok(Value::String(scope.request.method.clone()).into()),
            _ => {}
        }
        Ok(lookup_path(&scope.variables, expression)
            .cloned()
            .map_or(ScriptValue::Undefined, ScriptValue::Json))
    }
}

impl ScriptRuntime for MockScriptRuntime {
    fn run_script<'a>(
        &'a self,
        request: ScriptRequest,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptOutcome, ScriptError>> {
        Box::pin(async move {
            self.runs
                .lock()
                .unwrap()
                .push((request.phase, request.script.clone()));
            match &self.handler {
                Some(handler) => handler(&request),
                None => Ok(ScriptOutcome {
                    env_variables: request.variables.environment_variables().clone(),
                    runtime_variables: request.variables.runtime_variables().clone(),
                    global_variables: request.variables.global_variables().clone(),
                    ..ScriptOutcome::default()
                }),
            }
        })
    }

    fn evaluate_expression<'a>(
        &'a self,
        expression: &'a str,
        scope: &'a ExpressionScope,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ScriptValue, ScriptError>> {
        Box::pin(async move {
            self.expressions.lock().unwrap().push(expression.to_string());
            Self::evaluate(expression, scope)
        })
    }
}

/// Transport double answering from a queue and recording every send.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<HttpRequestInfo>>,
    sent: Mutex<Vec<RequestOptions>>,
}

impl MockTransport {
    pub fn new(responses: impl IntoIterator<Item = HttpRequestInfo>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            sent: Mutex::default(),
        }
    }

    pub fn sent(&self) -> Vec<RequestOptions> {
        self.sent.lock().unwrap().clone()
    }
}

impl HttpTransport for MockTransport {
    fn send<'a>(
        &'a self,
        options: &'a RequestOptions,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, HttpRequestInfo> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(options.clone());
            let next = self.responses.lock().unwrap().pop_front();
            next.map_or_else(
                || HttpRequestInfo::failed(&options.url, "connection refused"),
                |mut info| {
                    if info.url.is_empty() {
                        info.url.clone_from(&options.url);
                    }
                    info
                },
            )
        })
    }
}

/// A response record with the given status, headers and body.
pub fn info(status: u16, headers: &[(&str, &str)], body: &str) -> HttpRequestInfo {
    HttpRequestInfo {
        status: Some(status),
        status_text: String::new(),
        http_version: "HTTP/1.1".into(),
        headers: headers
            .iter()
            .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
            .collect(),
        body: body.as_bytes().to_vec(),
        duration_ms: 1,
        ..HttpRequestInfo::default()
    }
}

/// Authorization fetcher returning a fixed code and recording its inputs.
#[derive(Default)]
pub struct MockAuthorization {
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl AuthorizationCodeFetcher for MockAuthorization {
    fn fetch_authorization_code<'a>(
        &'a self,
        authorize_url: &'a str,
        callback_url: &'a str,
        collection_uid: &'a str,
    ) -> BoxFuture<'a, Result<String, OAuth2Error>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push((
                authorize_url.to_string(),
                callback_url.to_string(),
                collection_uid.to_string(),
            ));
            Ok("auth-code".to_string())
        })
    }
}
