//! Template parser for `{{placeholder}}` syntax.
//!
//! Splits a template into literal text and placeholder segments, keeping the
//! byte span of each placeholder so unresolved ones can be emitted verbatim.

use std::ops::Range;

/// One placeholder found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableReference {
    /// Placeholder body, trimmed: `name`, `user.id`, `$uuid`,
    /// `process.env.HOME`.
    pub name: String,

    /// Byte range of `{{...}}` in the template.
    pub span: Range<usize>,
}

impl VariableReference {
    /// Creates a reference.
    #[must_use]
    pub fn new(name: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// `{{$name}}` dynamic values.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.name.starts_with('$')
    }

    /// Name after `process.env.`, if this reads the process scope.
    #[must_use]
    pub fn process_env_name(&self) -> Option<&str> {
        self.name.strip_prefix("process.env.")
    }
}

/// Finds every placeholder in `input`, in order.
///
/// A placeholder ends at the first `}}`; an unclosed `{{` ends parsing and
/// the rest of the input is literal. Empty placeholders are ignored.
#[must_use]
pub fn parse_variables(input: &str) -> Vec<VariableReference> {
    let mut references = Vec::new();
    let mut cursor = 0;

    while let Some(open) = input[cursor..].find("{{") {
        let start = cursor + open;
        let body_start = start + 2;
        let Some(close) = input[body_start..].find("}}") else {
            break;
        };
        let end = body_start + close + 2;
        let name = input[body_start..body_start + close].trim();
        if !name.is_empty() {
            references.push(VariableReference::new(name, start..end));
        }
        cursor = end;
    }

    references
}

/// Returns true if the input contains a closed placeholder.
#[must_use]
pub fn has_variables(input: &str) -> bool {
    input
        .find("{{")
        .is_some_and(|open| input[open + 2..].contains("}}"))
}

/// Splits a dotted path into keys and array indices:
/// `items[0].id` becomes `items`, `0`, `id`.
#[must_use]
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_variable() {
        let refs = parse_variables("{{name}}");
        assert_eq!(refs, vec![VariableReference::new("name", 0..8)]);
        assert!(!refs[0].is_builtin());
    }

    #[test]
    fn test_parse_builtin_and_process_env() {
        let refs = parse_variables("{{$uuid}}-{{process.env.HOME}}");
        assert!(refs[0].is_builtin());
        assert_eq!(refs[1].process_env_name(), Some("HOME"));
    }

    #[test]
    fn test_parse_with_whitespace_and_adjacent() {
        let names: Vec<String> = parse_variables("{{ a }}{{b}}{{c}}")
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unclosed_and_empty() {
        assert!(parse_variables("{{name").is_empty());
        assert!(parse_variables("{{}}").is_empty());
        assert!(parse_variables("{{   }}").is_empty());
        assert!(parse_variables("{name}").is_empty());
    }

    #[test]
    fn test_variable_in_json() {
        let input = r#"{"name": "{{user_name}}", "id": {{user.id}}}"#;
        let refs = parse_variables(input);
        assert_eq!(refs.len(), 2);
        assert_eq!(&input[refs[1].span.clone()], "{{user.id}}");
    }

    #[test]
    fn test_has_variables() {
        assert!(has_variables("Hello {{name}}!"));
        assert!(!has_variables("{{incomplete"));
        assert!(!has_variables("incomplete}} {{"));
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("items[0].id"), vec!["items", "0", "id"]);
        assert_eq!(path_segments("user.name"), vec!["user", "name"]);
    }
}
