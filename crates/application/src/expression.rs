//! Literal shortcuts and sandbox-backed evaluation of user expressions.
//!
//! Variable declarations and assertion operands are written as JavaScript
//! template literals or expressions. The common cases (booleans, `null`,
//! numbers, quoted strings) never reach the sandbox.

use serde_json::{Number, Value};

use crate::context::RequestContext;
use crate::error::ScriptError;
use crate::ports::{
    CancellationToken, ExpressionScope, RequestSnapshot, ResponseView, ScriptRuntime, ScriptValue,
};

/// Parses the literal forms a declaration may use without running JavaScript.
#[must_use]
pub fn literal_value(raw: &str) -> Option<ScriptValue> {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Some(Value::Bool(true).into()),
        "false" => return Some(Value::Bool(false).into()),
        "null" => return Some(Value::Null.into()),
        "undefined" => return Some(ScriptValue::Undefined),
        _ => {}
    }

    if let Some(inner) = strip_quotes(trimmed) {
        return Some(Value::String(inner.to_string()).into());
    }

    parse_number(trimmed).map(|n| Value::Number(n).into())
}

fn strip_quotes(text: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        text.strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
            .filter(|inner| !inner.contains(quote))
    })
}

/// JSON number for numeric text; `None` for anything else.
#[must_use]
pub fn parse_number(text: &str) -> Option<Number> {
    let looks_numeric = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && text.chars().any(|c| c.is_ascii_digit());
    if !looks_numeric {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Number::from(int));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Builds the expression scope for the current state of a context.
#[must_use]
pub fn expression_scope(ctx: &RequestContext) -> ExpressionScope {
    ExpressionScope {
        variables: ctx.variables.merge(),
        process_env: ctx.variables.process_variables().clone(),
        request: RequestSnapshot::from_request(&ctx.request_item.name, &ctx.request),
        response: ctx.response().map(ResponseView::from_response),
    }
}

/// Evaluates `raw` as a JavaScript template literal.
///
/// Literal forms are answered directly. Text containing `${` is evaluated
/// inside backticks; any other text is returned as a string.
///
/// # Errors
///
/// Returns the sandbox error when the template throws.
pub async fn evaluate_template_literal(
    raw: &str,
    scope: &ExpressionScope,
    runtime: &dyn ScriptRuntime,
    cancel: &CancellationToken,
) -> Result<ScriptValue, ScriptError> {
    if let Some(value) = literal_value(raw) {
        return Ok(value);
    }
    let trimmed = raw.trim();
    if !trimmed.contains("${") {
        return Ok(Value::String(trimmed.to_string()).into());
    }
    let template = format!("`{}`", trimmed.replace('`', "\\`"));
    runtime.evaluate_expression(&template, scope, cancel).await
}

/// Evaluates `raw` as a JavaScript expression, with literal shortcuts.
///
/// # Errors
///
/// Returns the sandbox error when the expression throws.
pub async fn evaluate_expression(
    raw: &str,
    scope: &ExpressionScope,
    runtime: &dyn ScriptRuntime,
    cancel: &CancellationToken,
) -> Result<ScriptValue, ScriptError> {
    if let Some(value) = literal_value(raw) {
        return Ok(value);
    }
    runtime.evaluate_expression(raw.trim(), scope, cancel).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::MockScriptRuntime;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_literal_shortcuts() {
        assert_eq!(literal_value("true"), Some(json!(true).into()));
        assert_eq!(literal_value(" null "), Some(json!(null).into()));
        assert_eq!(literal_value("undefined"), Some(ScriptValue::Undefined));
        assert_eq!(literal_value("'abc'"), Some(json!("abc").into()));
        assert_eq!(literal_value("\"a b\""), Some(json!("a b").into()));
        assert_eq!(literal_value("42"), Some(json!(42).into()));
        assert_eq!(literal_value("-1.5"), Some(json!(-1.5).into()));
        assert_eq!(literal_value("res.status"), None);
        assert_eq!(literal_value("'a' + 'b'"), None);
        assert_eq!(literal_value("e"), None);
    }

    #[tokio::test]
    async fn test_plain_text_skips_sandbox() {
        let runtime = MockScriptRuntime::default();
        let scope = MockScriptRuntime::empty_scope();
        let value = evaluate_template_literal("hello world", &scope, &runtime, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, json!("hello world").into());
        assert!(runtime.expressions().is_empty());
    }

    #[tokio::test]
    async fn test_template_goes_to_sandbox() {
        let runtime = MockScriptRuntime::default();
        let mut scope = MockScriptRuntime::empty_scope();
        scope.variables.insert("name".into(), json!("courier"));
        let value = evaluate_template_literal("hi ${name}", &scope, &runtime, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, json!("hi courier").into());
        assert_eq!(runtime.expressions(), vec!["`hi ${name}`".to_string()]);
    }
}
