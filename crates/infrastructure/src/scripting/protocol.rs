//! JSON exchanged with the sandbox prelude.
//!
//! Nothing but strings crosses into QuickJS: the input is one JSON document
//! read by the prelude, the output is one JSON document it writes back.

use courier_application::error::ScriptError;
use courier_application::ports::{
    ExpressionScope, RequestSnapshot, ScriptOutcome, ScriptRequest, ScriptValue,
};
use courier_domain::scripting::ConsoleEntry;
use courier_domain::testing::TestResult;
use courier_domain::variables::VariableMap;
use serde::Deserialize;
use serde_json::{Value, json};

/// Input document for a script run.
#[must_use]
pub fn script_input(request: &ScriptRequest) -> Value {
    let variables = &request.variables;
    json!({
        "mode": "script",
        "source": request.script,
        "phase": request.phase.label(),
        "mutable": request.request.is_mutable(),
        "request": request.request.snapshot(),
        "response": request.response,
        "variables": {
            "runtime": variables.runtime_variables(),
            "environment": variables.environment_variables(),
            "global": variables.global_variables(),
            "collection": variables.collection_variables(),
            "folder": variables.folder_variables(),
            "request": variables.request_variables(),
            "process": variables.process_variables(),
            "merged": variables.merge(),
        },
        "collectionName": request.collection_name,
        "collectionPath": request.collection_path.display().to_string(),
        "environmentName": request.environment_name,
        "fsAllowed": request.settings.filesystem_access.allow,
    })
}

/// Input document for an expression.
#[must_use]
pub fn expression_input(expression: &str, scope: &ExpressionScope) -> Value {
    json!({
        "mode": "expression",
        "source": expression,
        "phase": "expression",
        "mutable": false,
        "request": scope.request,
        "response": scope.response,
        "variables": {
            "runtime": {},
            "environment": {},
            "global": {},
            "collection": {},
            "folder": {},
            "request": {},
            "process": scope.process_env,
            "merged": scope.variables,
        },
        "collectionName": "",
        "collectionPath": "",
        "environmentName": null,
        "fsAllowed": false,
    })
}

#[derive(Debug, Deserialize)]
struct MissingModule {
    name: String,
    #[serde(default)]
    tried: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Failure {
    message: String,
    #[serde(default)]
    module_not_found: Option<MissingModule>,
}

impl Failure {
    fn into_error(self, source: &str) -> ScriptError {
        match self.module_not_found {
            Some(missing) => ScriptError::ModuleNotFound {
                name: missing.name,
                tried: missing.tried,
            },
            None => ScriptError::UserScript {
                message: self.message,
                script: source.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptOutput {
    #[serde(default)]
    error: Option<Failure>,
    #[serde(default)]
    env_variables: VariableMap,
    #[serde(default)]
    runtime_variables: VariableMap,
    #[serde(default)]
    global_variables: VariableMap,
    #[serde(default)]
    next_request_name: Option<String>,
    #[serde(default)]
    results: Vec<TestResult>,
    #[serde(default)]
    request: Option<RequestSnapshot>,
    #[serde(default)]
    has_response_body: bool,
    #[serde(default)]
    response_body: Value,
    #[serde(default)]
    logs: Vec<ConsoleEntry>,
    #[serde(default)]
    skip_request: bool,
    #[serde(default)]
    stop_execution: bool,
}

#[derive(Debug, Deserialize)]
struct ExpressionOutput {
    #[serde(default)]
    error: Option<Failure>,
    #[serde(default)]
    undefined: bool,
    #[serde(default)]
    value: Value,
}

fn parse<'a, T: Deserialize<'a>>(output: &'a str) -> Result<T, ScriptError> {
    serde_json::from_str(output)
        .map_err(|e| ScriptError::Runtime(format!("malformed sandbox output: {e}")))
}

/// Reads the output of a script run.
///
/// # Errors
///
/// Returns the user error the script threw, or [`ScriptError::Runtime`]
/// when the document does not parse.
pub fn script_outcome(output: &str, source: &str, mutable: bool) -> Result<ScriptOutcome, ScriptError> {
    let output: ScriptOutput = parse(output)?;
    if let Some(failure) = output.error {
        return Err(failure.into_error(source));
    }
    Ok(ScriptOutcome {
        response_body: output.has_response_body.then_some(output.response_body),
        env_variables: output.env_variables,
        runtime_variables: output.runtime_variables,
        global_variables: output.global_variables,
        next_request_name: output.next_request_name,
        results: output.results,
        request: if mutable { output.request } else { None },
        logs: output.logs,
        skip_request: output.skip_request,
        stop_execution: output.stop_execution,
    })
}

/// Reads the output of an expression.
///
/// # Errors
///
/// As for [`script_outcome`].
pub fn expression_value(output: &str, source: &str) -> Result<ScriptValue, ScriptError> {
    let output: ExpressionOutput = parse(output)?;
    if let Some(failure) = output.error {
        return Err(failure.into_error(source));
    }
    if output.undefined {
        return Ok(ScriptValue::Undefined);
    }
    Ok(ScriptValue::Json(output.value))
}
