//! Variable scopes for one request execution.
//!
//! Seven scopes feed interpolation and scripts. Precedence, lowest to
//! highest: global, collection, environment, folder, request, runtime,
//! process. Only runtime, environment and global are writable once the
//! context exists; folder and request scopes are set exactly once during
//! pre-request preparation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};

/// A flat name to value map.
pub type VariableMap = BTreeMap<String, Value>;

/// Variable scope names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Global variables, shared across collections.
    Global,
    /// Collection variables.
    Collection,
    /// Selected environment.
    Environment,
    /// Ancestor folder variables.
    Folder,
    /// Request variables.
    Request,
    /// Runtime variables set by scripts.
    Runtime,
    /// Process environment.
    Process,
}

impl VariableScope {
    /// Scopes in merge order, lowest precedence first.
    pub const PRECEDENCE: [Self; 7] = [
        Self::Global,
        Self::Collection,
        Self::Environment,
        Self::Folder,
        Self::Request,
        Self::Runtime,
        Self::Process,
    ];

    /// Lowercase scope name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Collection => "collection",
            Self::Environment => "environment",
            Self::Folder => "folder",
            Self::Request => "request",
            Self::Runtime => "runtime",
            Self::Process => "process",
        }
    }
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial values for the scopes known before preparation starts.
#[derive(Debug, Clone, Default)]
pub struct InitialScopes {
    /// Process environment.
    pub process: VariableMap,
    /// Collection variables.
    pub collection: VariableMap,
    /// Environment variables.
    pub environment: VariableMap,
    /// Global variables.
    pub global: VariableMap,
    /// Runtime variables.
    pub runtime: VariableMap,
}

/// The scope bag owned by one request context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariablesContext {
    process: VariableMap,
    collection: VariableMap,
    environment: VariableMap,
    global: VariableMap,
    folder: Option<VariableMap>,
    request: Option<VariableMap>,
    runtime: VariableMap,
}

impl VariablesContext {
    /// Creates a context from the initial scopes.
    #[must_use]
    pub fn new(initial: InitialScopes) -> Self {
        Self {
            process: initial.process,
            collection: initial.collection,
            environment: initial.environment,
            global: initial.global,
            folder: None,
            request: None,
            runtime: initial.runtime,
        }
    }

    /// Flat view of every scope; higher precedence wins.
    #[must_use]
    pub fn merge(&self) -> VariableMap {
        let mut merged = VariableMap::new();
        for scope in VariableScope::PRECEDENCE {
            merged.extend(
                self.scope(scope)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        merged
    }

    /// Read access to any scope.
    #[must_use]
    pub fn scope(&self, scope: VariableScope) -> &VariableMap {
        static EMPTY: VariableMap = VariableMap::new();
        match scope {
            VariableScope::Global => &self.global,
            VariableScope::Collection => &self.collection,
            VariableScope::Environment => &self.environment,
            VariableScope::Folder => self.folder.as_ref().unwrap_or(&EMPTY),
            VariableScope::Request => self.request.as_ref().unwrap_or(&EMPTY),
            VariableScope::Runtime => &self.runtime,
            VariableScope::Process => &self.process,
        }
    }

    /// Process environment variables.
    #[must_use]
    pub fn process_variables(&self) -> &VariableMap {
        &self.process
    }

    /// Collection variables.
    #[must_use]
    pub fn collection_variables(&self) -> &VariableMap {
        &self.collection
    }

    /// Environment variables.
    #[must_use]
    pub fn environment_variables(&self) -> &VariableMap {
        &self.environment
    }

    /// Global variables.
    #[must_use]
    pub fn global_variables(&self) -> &VariableMap {
        &self.global
    }

    /// Folder variables.
    #[must_use]
    pub fn folder_variables(&self) -> &VariableMap {
        self.scope(VariableScope::Folder)
    }

    /// Request variables.
    #[must_use]
    pub fn request_variables(&self) -> &VariableMap {
        self.scope(VariableScope::Request)
    }

    /// Runtime variables.
    #[must_use]
    pub fn runtime_variables(&self) -> &VariableMap {
        &self.runtime
    }

    /// Sets a runtime variable.
    pub fn set_runtime_variable(&mut self, name: impl Into<String>, value: Value) {
        self.runtime.insert(name.into(), value);
    }

    /// Sets an environment variable.
    pub fn set_environment_variable(&mut self, name: impl Into<String>, value: Value) {
        self.environment.insert(name.into(), value);
    }

    /// Sets a global variable.
    pub fn set_global_variable(&mut self, name: impl Into<String>, value: Value) {
        self.global.insert(name.into(), value);
    }

    /// Replaces runtime variables wholesale with values returned by a script run.
    pub fn replace_runtime_variables(&mut self, variables: VariableMap) {
        self.runtime = variables;
    }

    /// Replaces environment variables wholesale.
    pub fn replace_environment_variables(&mut self, variables: VariableMap) {
        self.environment = variables;
    }

    /// Replaces global variables wholesale.
    pub fn replace_global_variables(&mut self, variables: VariableMap) {
        self.global = variables;
    }

    /// Injects folder variables after folder data collection.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ScopeAlreadySet`] on a second call.
    pub fn set_folder_variables(&mut self, variables: VariableMap) -> DomainResult<()> {
        if self.folder.is_some() {
            return Err(DomainError::ScopeAlreadySet("folder"));
        }
        self.folder = Some(variables);
        Ok(())
    }

    /// Injects evaluated request variables.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ScopeAlreadySet`] on a second call.
    pub fn set_request_variables(&mut self, variables: VariableMap) -> DomainResult<()> {
        if self.request.is_some() {
            return Err(DomainError::ScopeAlreadySet("request"));
        }
        self.request = Some(variables);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn one(key: &str, value: &str) -> VariableMap {
        VariableMap::from([(key.to_string(), json!(value))])
    }

    #[test]
    fn test_merge_precedence_process_highest() {
        let mut ctx = VariablesContext::new(InitialScopes {
            process: one("k", "process"),
            collection: one("k", "collection"),
            environment: one("k", "environment"),
            global: one("k", "global"),
            runtime: one("k", "runtime"),
        });
        ctx.set_folder_variables(one("k", "folder")).unwrap();
        ctx.set_request_variables(one("k", "request")).unwrap();
        assert_eq!(ctx.merge()["k"], json!("process"));
    }

    #[test]
    fn test_merge_precedence_each_level() {
        let mut scopes = InitialScopes {
            global: one("k", "global"),
            ..InitialScopes::default()
        };
        assert_eq!(
            VariablesContext::new(scopes.clone()).merge()["k"],
            json!("global")
        );

        scopes.collection = one("k", "collection");
        assert_eq!(
            VariablesContext::new(scopes.clone()).merge()["k"],
            json!("collection")
        );

        scopes.environment = one("k", "environment");
        let mut ctx = VariablesContext::new(scopes.clone());
        assert_eq!(ctx.merge()["k"], json!("environment"));

        ctx.set_folder_variables(one("k", "folder")).unwrap();
        assert_eq!(ctx.merge()["k"], json!("folder"));

        ctx.set_request_variables(one("k", "request")).unwrap();
        assert_eq!(ctx.merge()["k"], json!("request"));

        ctx.set_runtime_variable("k", json!("runtime"));
        assert_eq!(ctx.merge()["k"], json!("runtime"));
    }

    #[test]
    fn test_folder_variables_set_once() {
        let mut ctx = VariablesContext::default();
        ctx.set_folder_variables(VariableMap::new()).unwrap();
        let err = ctx.set_folder_variables(VariableMap::new()).unwrap_err();
        assert_eq!(err, DomainError::ScopeAlreadySet("folder"));
    }

    #[test]
    fn test_replace_scopes_by_value() {
        let mut ctx = VariablesContext::default();
        ctx.set_environment_variable("a", json!(1));
        ctx.replace_environment_variables(one("b", "2"));
        assert!(!ctx.environment_variables().contains_key("a"));
        assert_eq!(ctx.environment_variables()["b"], json!("2"));
    }

    #[test]
    fn test_unset_scopes_read_empty() {
        let ctx = VariablesContext::default();
        assert!(ctx.folder_variables().is_empty());
        assert!(ctx.request_variables().is_empty());
    }
}
