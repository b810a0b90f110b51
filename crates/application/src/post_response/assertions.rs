//! Declarative assertions.
//!
//! The left-hand side is a JavaScript expression evaluated in the sandbox.
//! The right-hand side starts with an operator keyword, or is compared for
//! equality as a whole. Comparison happens here with chai-style messages.

use courier_domain::events::RequestEvent;
use courier_domain::testing::{AssertionOperator, AssertionResult, AssertionSpec};
use regex::RegexBuilder;
use serde_json::Value;
use tracing::debug;

use crate::context::RequestContext;
use crate::expression::{evaluate_expression, evaluate_template_literal, expression_scope};
use crate::ports::{CancellationToken, ExpressionScope, ScriptRuntime, ScriptValue};
use crate::variable_resolver::VariableResolver;

/// Operator and operand of a right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRhs {
    /// Operator to apply.
    pub operator: AssertionOperator,
    /// Raw operand; empty for unary operators.
    pub operand: String,
}

/// Splits `rhs` into operator and operand.
#[must_use]
pub fn parse_rhs(rhs: &str) -> ParsedRhs {
    let rhs = rhs.trim();
    let (first, rest) = rhs.split_once(char::is_whitespace).unwrap_or((rhs, ""));
    match first.parse::<AssertionOperator>() {
        Ok(operator) if operator.is_unary() => ParsedRhs {
            operator,
            operand: String::new(),
        },
        Ok(operator) => ParsedRhs {
            operator,
            operand: rest.trim().to_string(),
        },
        Err(()) => ParsedRhs {
            operator: AssertionOperator::Eq,
            operand: rhs.to_string(),
        },
    }
}

/// Pieces of a list operand: `[1, 2]` and `1,2` both give `["1", "2"]`.
#[must_use]
pub fn split_list(operand: &str) -> Vec<String> {
    let trimmed = operand.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// The evaluated operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// Unary operators take none.
    None,
    /// A single value.
    Value(ScriptValue),
    /// `in`, `notIn` and `between`.
    List(Vec<ScriptValue>),
}

fn inspect(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Undefined => "undefined".to_string(),
        ScriptValue::Json(Value::String(s)) => format!("'{s}'"),
        ScriptValue::Json(other) => other.to_string(),
    }
}

fn inspect_list(values: &[ScriptValue]) -> String {
    let items: Vec<String> = values.iter().map(inspect).collect();
    format!("[ {} ]", items.join(", "))
}

fn number(value: &ScriptValue) -> Option<f64> {
    value.as_json().and_then(Value::as_f64)
}

fn text(value: &ScriptValue) -> Option<&str> {
    value.as_json().and_then(Value::as_str)
}

fn values_equal(left: &ScriptValue, right: &ScriptValue) -> bool {
    match (number(left), number(right)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => left == right,
    }
}

fn length_of(value: &ScriptValue) -> Option<usize> {
    match value.as_json()? {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn includes(haystack: &ScriptValue, needle: &ScriptValue) -> Option<bool> {
    match haystack.as_json()? {
        Value::String(s) => {
            let needle = match needle.as_json()? {
                Value::String(n) => n.clone(),
                other => other.to_string(),
            };
            Some(s.contains(&needle))
        }
        Value::Array(items) => Some(
            items
                .iter()
                .any(|item| values_equal(&ScriptValue::Json(item.clone()), needle)),
        ),
        Value::Object(map) => Some(text(needle).is_some_and(|key| map.contains_key(key))),
        _ => None,
    }
}

fn regex_matches(subject: &str, pattern: &str) -> Result<bool, String> {
    let (source, flags) = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.rsplit_once('/'))
        .unwrap_or((pattern, ""));
    let regex = RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| format!("invalid regular expression {pattern}: {e}"))?;
    Ok(regex.is_match(subject))
}

fn check(pass: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if pass { Ok(()) } else { Err(message()) }
}

fn numeric(actual: &ScriptValue, expected: &ScriptValue) -> Result<(f64, f64), String> {
    let a = number(actual).ok_or_else(|| format!("expected {} to be a number", inspect(actual)))?;
    let e = number(expected).ok_or_else(|| format!("the argument to compare must be a number, got {}", inspect(expected)))?;
    Ok((a, e))
}

/// Applies `operator`; `Err` carries the failure message.
///
/// # Errors
///
/// Returns a chai-style message when the assertion does not hold.
#[allow(clippy::too_many_lines)]
pub fn compare(operator: AssertionOperator, actual: &ScriptValue, expected: &Expected) -> Result<(), String> {
    use AssertionOperator as Op;

    let single = match expected {
        Expected::Value(value) => value.clone(),
        Expected::None | Expected::List(_) => ScriptValue::Undefined,
    };
    let list: &[ScriptValue] = match expected {
        Expected::List(values) => values,
        _ => &[],
    };
    let a = inspect(actual);
    let e = inspect(&single);

    match operator {
        Op::Eq => check(values_equal(actual, &single), || format!("expected {a} to equal {e}")),
        Op::Neq => check(!values_equal(actual, &single), || format!("expected {a} to not equal {e}")),
        Op::Gt => {
            let (x, y) = numeric(actual, &single)?;
            check(x > y, || format!("expected {a} to be above {e}"))
        }
        Op::Gte => {
            let (x, y) = numeric(actual, &single)?;
            check(x >= y, || format!("expected {a} to be at least {e}"))
        }
        Op::Lt => {
            let (x, y) = numeric(actual, &single)?;
            check(x < y, || format!("expected {a} to be below {e}"))
        }
        Op::Lte => {
            let (x, y) = numeric(actual, &single)?;
            check(x <= y, || format!("expected {a} to be at most {e}"))
        }
        Op::In => check(list.iter().any(|v| values_equal(actual, v)), || {
            format!("expected {a} to be one of {}", inspect_list(list))
        }),
        Op::NotIn => check(!list.iter().any(|v| values_equal(actual, v)), || {
            format!("expected {a} to not be one of {}", inspect_list(list))
        }),
        Op::Contains => match includes(actual, &single) {
            Some(found) => check(found, || format!("expected {a} to include {e}")),
            None => Err(format!("expected {a} to be a string, array or object")),
        },
        Op::NotContains => match includes(actual, &single) {
            Some(found) => check(!found, || format!("expected {a} to not include {e}")),
            None => Err(format!("expected {a} to be a string, array or object")),
        },
        Op::Length => {
            let want = number(&single).ok_or_else(|| format!("the length must be a number, got {e}"))?;
            let have = length_of(actual).ok_or_else(|| format!("expected {a} to have a length"))?;
            #[allow(clippy::cast_precision_loss)]
            let matches = (have as f64 - want).abs() < f64::EPSILON;
            check(matches, || format!("expected {a} to have a length of {e} but got {have}"))
        }
        Op::Matches | Op::NotMatches => {
            let subject = text(actual).ok_or_else(|| format!("expected {a} to be a string"))?;
            let pattern = match single.as_json() {
                Some(Value::String(p)) => p.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let found = regex_matches(subject, &pattern)?;
            if operator == Op::Matches {
                check(found, || format!("expected {a} to match {pattern}"))
            } else {
                check(!found, || format!("expected {a} not to match {pattern}"))
            }
        }
        Op::StartsWith => {
            let subject = text(actual).ok_or_else(|| format!("expected {a} to be a string"))?;
            let prefix = text(&single).unwrap_or_default();
            check(subject.starts_with(prefix), || format!("expected {a} to start with {e}"))
        }
        Op::EndsWith => {
            let subject = text(actual).ok_or_else(|| format!("expected {a} to be a string"))?;
            let suffix = text(&single).unwrap_or_default();
            check(subject.ends_with(suffix), || format!("expected {a} to end with {e}"))
        }
        Op::Between => {
            let [low, high] = list else {
                return Err(format!("between needs two bounds, got {}", inspect_list(list)));
            };
            let (x, lo) = numeric(actual, low)?;
            let (_, hi) = numeric(actual, high)?;
            check(lo <= x && x <= hi, || {
                format!("expected {a} to be within {}..{}", inspect(low), inspect(high))
            })
        }
        Op::IsEmpty => check(length_of(actual) == Some(0), || format!("expected {a} to be empty")),
        Op::IsNotEmpty => check(length_of(actual).is_some_and(|n| n > 0), || {
            format!("expected {a} not to be empty")
        }),
        Op::IsNull => check(actual == &ScriptValue::Json(Value::Null), || format!("expected {a} to be null")),
        Op::IsUndefined => check(actual.is_undefined(), || format!("expected {a} to be undefined")),
        Op::IsDefined => check(!actual.is_undefined(), || format!("expected {a} to not be undefined")),
        Op::IsTruthy => check(actual.is_truthy(), || format!("expected {a} to be truthy")),
        Op::IsFalsy => check(!actual.is_truthy(), || format!("expected {a} to be falsy")),
        Op::IsJson => check(matches!(actual.as_json(), Some(Value::Object(_))), || {
            format!("expected {a} to be JSON")
        }),
        Op::IsNumber => check(matches!(actual.as_json(), Some(Value::Number(_))), || {
            format!("expected {a} to be a number")
        }),
        Op::IsString => check(matches!(actual.as_json(), Some(Value::String(_))), || {
            format!("expected {a} to be a string")
        }),
        Op::IsBoolean => check(matches!(actual.as_json(), Some(Value::Bool(_))), || {
            format!("expected {a} to be a boolean")
        }),
        Op::IsArray => check(matches!(actual.as_json(), Some(Value::Array(_))), || {
            format!("expected {a} to be an array")
        }),
    }
}

async fn expected_value(
    parsed: &ParsedRhs,
    scope: &ExpressionScope,
    runtime: &dyn ScriptRuntime,
    cancel: &CancellationToken,
) -> Result<Expected, String> {
    if parsed.operator.is_unary() {
        return Ok(Expected::None);
    }
    if parsed.operator.takes_list() {
        let mut values = Vec::new();
        for piece in split_list(&parsed.operand) {
            let value = evaluate_template_literal(&piece, scope, runtime, cancel)
                .await
                .map_err(|e| e.to_string())?;
            values.push(value);
        }
        return Ok(Expected::List(values));
    }
    evaluate_template_literal(&parsed.operand, scope, runtime, cancel)
        .await
        .map(Expected::Value)
        .map_err(|e| e.to_string())
}

/// Evaluates one assertion; failures are data, never errors.
pub async fn evaluate_assertion(
    spec: &AssertionSpec,
    scope: &ExpressionScope,
    resolver: &mut VariableResolver,
    runtime: &dyn ScriptRuntime,
    cancel: &CancellationToken,
) -> AssertionResult {
    let mut parsed = parse_rhs(&spec.value);
    parsed.operand = resolver.interpolate(&parsed.operand);
    let result = AssertionResult::pass(&spec.name, &spec.value, parsed.operator, &parsed.operand);

    let actual = match evaluate_expression(&spec.name, scope, runtime, cancel).await {
        Ok(value) => value,
        Err(error) => return result.into_failure(error.to_string()),
    };
    let outcome = match expected_value(&parsed, scope, runtime, cancel).await {
        Ok(expected) => compare(parsed.operator, &actual, &expected),
        Err(message) => Err(message),
    };
    match outcome {
        Ok(()) => result,
        Err(message) => result.into_failure(message),
    }
}

/// Runs every enabled assertion of the request and records the results.
pub async fn run_assertions(ctx: &mut RequestContext, runtime: &dyn ScriptRuntime) {
    let specs: Vec<AssertionSpec> = ctx
        .request
        .assertions
        .iter()
        .filter(|a| a.enabled && !a.name.trim().is_empty())
        .cloned()
        .collect();
    if specs.is_empty() {
        return;
    }

    let scope = expression_scope(ctx);
    let mut resolver = VariableResolver::from_context(&ctx.variables);
    let mut results = Vec::with_capacity(specs.len());
    for spec in &specs {
        results.push(evaluate_assertion(spec, &scope, &mut resolver, runtime, &ctx.cancel).await);
    }

    let failed = results.iter().filter(|r| !r.passed()).count();
    debug!(total = results.len(), failed, "assertions evaluated");
    ctx.debug.log_with(
        "assertions",
        "assertions evaluated",
        serde_json::json!({ "total": results.len(), "failed": failed }),
    );
    ctx.emit(RequestEvent::AssertionResults {
        ids: ctx.ids(),
        results: results.clone(),
    });
    ctx.assertion_results = results;
}
