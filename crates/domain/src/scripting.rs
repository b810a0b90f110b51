//! Pre-request and post-response scripting.
//!
//! Script sources and variable declarations attached to requests, folders
//! and the collection root, plus the console records a script run produces.

use serde::{Deserialize, Serialize};

/// Script sources for both phases of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestScripts {
    /// Runs before the request is sent.
    #[serde(default)]
    pub req: String,
    /// Runs after the response is received.
    #[serde(default)]
    pub res: String,
}

/// A declared variable whose value is an expression or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVariable {
    /// Variable name.
    pub name: String,
    /// Expression (post-response) or template literal (pre-request).
    #[serde(default)]
    pub value: String,
    /// Whether the variable is evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RequestVariable {
    /// Creates an enabled variable.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

/// Variables evaluated before the request and after the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestVars {
    /// Pre-request variables.
    #[serde(default)]
    pub req: Vec<RequestVariable>,
    /// Post-response variables.
    #[serde(default)]
    pub res: Vec<RequestVariable>,
}

fn default_enabled() -> bool {
    true
}

/// Which phase a script runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptPhase {
    /// Before the request; `req` is mutable.
    PreRequest,
    /// After the response; `req` is read-only.
    PostResponse,
    /// Test script; `test`/`expect` are available.
    Test,
}

impl ScriptPhase {
    /// Short label used in logs and errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PreRequest => "pre-request",
            Self::PostResponse => "post-response",
            Self::Test => "test",
        }
    }
}

/// Console method a script called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// `console.log`
    #[default]
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
    /// `console.debug`
    Debug,
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Console method.
    #[serde(rename = "type", default)]
    pub level: ConsoleLevel,
    /// Arguments after a JSON round trip.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}
