//! Variable resolution engine
//!
//! Resolves `{{variable}}` references against a merged variable map.

use std::collections::HashMap;

use courier_domain::variables::{VariableMap, VariablesContext};
use serde_json::Value;

use super::builtins::BuiltinVariables;
use super::parser::{has_variables, parse_variables, path_segments};

/// How many times a substituted value is itself interpolated.
pub const MAX_INTERPOLATION_DEPTH: usize = 5;

/// Result of variable resolution for a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    /// The resolved string; unresolved placeholders are kept verbatim.
    pub resolved: String,

    /// Placeholder names that could not be resolved.
    pub unresolved: Vec<String>,
}

impl ResolutionResult {
    /// Whether all placeholders were resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Text inserted for a value: strings verbatim, everything else as
/// compact JSON.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Looks `name` up as a flat key first, then as a dotted path into
/// object and array values.
#[must_use]
pub fn lookup_path<'a>(variables: &'a VariableMap, name: &str) -> Option<&'a Value> {
    if let Some(value) = variables.get(name) {
        return Some(value);
    }
    let segments = path_segments(name);
    let (first, rest) = segments.split_first()?;
    rest.iter().try_fold(variables.get(*first)?, |value, key| match value {
        Value::Object(map) => map.get(*key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// The variable resolution engine.
pub struct VariableResolver {
    variables: VariableMap,
    process_env: VariableMap,
    /// Built-ins keep one value per resolver so a request sees one `$uuid`.
    builtin_cache: HashMap<String, String>,
}

impl VariableResolver {
    /// Creates a resolver over a merged map and the process scope.
    #[must_use]
    pub fn new(variables: VariableMap, process_env: VariableMap) -> Self {
        Self {
            variables,
            process_env,
            builtin_cache: HashMap::new(),
        }
    }

    /// Creates a resolver over the current state of a scope bag.
    #[must_use]
    pub fn from_context(context: &VariablesContext) -> Self {
        Self::new(context.merge(), context.process_variables().clone())
    }

    /// The merged map this resolver reads.
    #[must_use]
    pub const fn variables(&self) -> &VariableMap {
        &self.variables
    }

    /// Resolves all placeholders in `input`.
    pub fn resolve(&mut self, input: &str) -> ResolutionResult {
        let mut unresolved = Vec::new();
        let resolved = self.resolve_depth(input, 0, &mut unresolved);
        ResolutionResult {
            resolved,
            unresolved,
        }
    }

    /// Resolves all placeholders, discarding the bookkeeping.
    pub fn interpolate(&mut self, input: &str) -> String {
        if !has_variables(input) {
            return input.to_string();
        }
        self.resolve(input).resolved
    }

    /// Value of one placeholder body, rendered as text.
    pub fn lookup(&mut self, name: &str) -> Option<String> {
        if name.starts_with('$') {
            if let Some(cached) = self.builtin_cache.get(name) {
                return Some(cached.clone());
            }
            let generated = BuiltinVariables::resolve(name)?;
            self.builtin_cache.insert(name.to_string(), generated.clone());
            return Some(generated);
        }
        if let Some(env_name) = name.strip_prefix("process.env.") {
            return self.process_env.get(env_name).map(render_value);
        }
        lookup_path(&self.variables, name).map(render_value)
    }

    fn resolve_depth(&mut self, input: &str, depth: usize, unresolved: &mut Vec<String>) -> String {
        let references = parse_variables(input);
        if references.is_empty() {
            return input.to_string();
        }

        let mut result = String::with_capacity(input.len());
        let mut last_end = 0;

        for var_ref in &references {
            result.push_str(&input[last_end..var_ref.span.start]);

            match self.lookup(&var_ref.name) {
                Some(value) if depth < MAX_INTERPOLATION_DEPTH && has_variables(&value) => {
                    let nested = self.resolve_depth(&value, depth + 1, unresolved);
                    result.push_str(&nested);
                }
                Some(value) => result.push_str(&value),
                None => {
                    result.push_str(&input[var_ref.span.clone()]);
                    unresolved.push(var_ref.name.clone());
                }
            }

            last_end = var_ref.span.end;
        }

        result.push_str(&input[last_end..]);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_domain::variables::InitialScopes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn resolver() -> VariableResolver {
        let mut variables = VariableMap::new();
        variables.insert("host".into(), json!("localhost:3000"));
        variables.insert("base_url".into(), json!("http://{{host}}"));
        variables.insert("user".into(), json!({"id": 7, "tags": ["a", "b"]}));
        variables.insert("count".into(), json!(3));
        variables.insert("loop".into(), json!("{{loop}}"));
        let mut process = VariableMap::new();
        process.insert("HOME".into(), json!("/home/me"));
        VariableResolver::new(variables, process)
    }

    #[test]
    fn test_resolve_no_variables() {
        let mut r = resolver();
        let result = r.resolve("Hello, World!");
        assert_eq!(result.resolved, "Hello, World!");
        assert!(result.is_complete());
    }

    #[test]
    fn test_nested_values_are_interpolated() {
        let mut r = resolver();
        assert_eq!(r.interpolate("{{base_url}}/users"), "http://localhost:3000/users");
    }

    #[test]
    fn test_non_strings_render_as_json() {
        let mut r = resolver();
        assert_eq!(r.interpolate("n={{count}}"), "n=3");
        assert_eq!(r.interpolate("{{user}}"), r#"{"id":7,"tags":["a","b"]}"#);
    }

    #[test]
    fn test_dotted_paths() {
        let mut r = resolver();
        assert_eq!(r.interpolate("{{user.id}}"), "7");
        assert_eq!(r.interpolate("{{user.tags[1]}}"), "b");
        assert_eq!(r.interpolate("{{user.missing}}"), "{{user.missing}}");
    }

    #[test]
    fn test_process_env() {
        let mut r = resolver();
        assert_eq!(r.interpolate("{{process.env.HOME}}"), "/home/me");
    }

    #[test]
    fn test_unresolved_kept() {
        let mut r = resolver();
        let result = r.resolve("{{host}}/{{unknown}}");
        assert_eq!(result.resolved, "localhost:3000/{{unknown}}");
        assert_eq!(result.unresolved, vec!["unknown"]);
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut r = resolver();
        assert_eq!(r.interpolate("{{loop}}"), "{{loop}}");
    }

    #[test]
    fn test_builtin_stable_within_resolver() {
        let mut r = resolver();
        let first = r.interpolate("{{$uuid}}");
        assert_eq!(first, r.interpolate("{{$uuid}}"));
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_from_context_uses_precedence() {
        let mut initial = InitialScopes::default();
        initial.global.insert("x".into(), json!("global"));
        initial.environment.insert("x".into(), json!("env"));
        let context = VariablesContext::new(initial);
        let mut r = VariableResolver::from_context(&context);
        assert_eq!(r.interpolate("{{x}}"), "env");
    }
}
