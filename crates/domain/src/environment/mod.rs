//! Environments selected by the caller.

use serde::{Deserialize, Serialize};

use crate::variables::VariableMap;

/// One environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    #[serde(default)]
    pub value: String,
    /// Whether the variable is visible to requests.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether the value is a secret (masked in output).
    #[serde(default)]
    pub secret: bool,
}

impl EnvironmentVariable {
    /// Creates an enabled, non-secret variable.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            secret: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A named set of variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Environment {
    /// Unique identifier.
    #[serde(default)]
    pub uid: String,
    /// Environment name, exposed as `bru.getEnvName()`.
    pub name: String,
    /// Variables in declaration order.
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: crate::generate_id(),
            name: name.into(),
            variables: Vec::new(),
        }
    }

    /// Adds a variable.
    pub fn add_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.push(EnvironmentVariable::new(name, value));
    }

    /// Enabled variables as a scope map; later duplicates win.
    #[must_use]
    pub fn to_variable_map(&self) -> VariableMap {
        self.variables
            .iter()
            .filter(|v| v.enabled)
            .map(|v| (v.name.clone(), serde_json::Value::String(v.value.clone())))
            .collect()
    }
}
