//! Assertions and test results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A declarative assertion: `lhs` is an expression, `rhs` is `"<op> <operand>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSpec {
    /// Left-hand expression, e.g. `res.status`.
    pub name: String,
    /// Right-hand side, e.g. `eq 200`.
    #[serde(default)]
    pub value: String,
    /// Whether the assertion runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AssertionSpec {
    /// Creates an enabled assertion.
    #[must_use]
    pub fn new(lhs: impl Into<String>, rhs: impl Into<String>) -> Self {
        Self {
            name: lhs.into(),
            value: rhs.into(),
            enabled: true,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Assertion operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssertionOperator {
    /// Equal to.
    Eq,
    /// Not equal to.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Member of a list.
    In,
    /// Not a member of a list.
    NotIn,
    /// Contains (for strings/arrays).
    Contains,
    /// Does not contain.
    NotContains,
    /// Length equals.
    Length,
    /// Matches regex pattern.
    Matches,
    /// Does not match regex pattern.
    NotMatches,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Inclusive numeric range.
    Between,
    /// Empty string, array or object.
    IsEmpty,
    /// Non-empty string, array or object.
    IsNotEmpty,
    /// `null`
    IsNull,
    /// `undefined`
    IsUndefined,
    /// Anything but `undefined`.
    IsDefined,
    /// JS truthiness.
    IsTruthy,
    /// JS falsiness.
    IsFalsy,
    /// Object (parsed JSON).
    IsJson,
    /// Number.
    IsNumber,
    /// String.
    IsString,
    /// Boolean.
    IsBoolean,
    /// Array.
    IsArray,
}

impl AssertionOperator {
    const ALL: [Self; 28] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::NotIn,
        Self::Contains,
        Self::NotContains,
        Self::Length,
        Self::Matches,
        Self::NotMatches,
        Self::StartsWith,
        Self::EndsWith,
        Self::Between,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::IsNull,
        Self::IsUndefined,
        Self::IsDefined,
        Self::IsTruthy,
        Self::IsFalsy,
        Self::IsJson,
        Self::IsNumber,
        Self::IsString,
        Self::IsBoolean,
        Self::IsArray,
    ];

    /// Operator keyword as written in the right-hand side.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::Length => "length",
            Self::Matches => "matches",
            Self::NotMatches => "notMatches",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Between => "between",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
            Self::IsNull => "isNull",
            Self::IsUndefined => "isUndefined",
            Self::IsDefined => "isDefined",
            Self::IsTruthy => "isTruthy",
            Self::IsFalsy => "isFalsy",
            Self::IsJson => "isJson",
            Self::IsNumber => "isNumber",
            Self::IsString => "isString",
            Self::IsBoolean => "isBoolean",
            Self::IsArray => "isArray",
        }
    }

    /// Operators that take no operand.
    #[must_use]
    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            Self::IsEmpty
                | Self::IsNotEmpty
                | Self::IsNull
                | Self::IsUndefined
                | Self::IsDefined
                | Self::IsTruthy
                | Self::IsFalsy
                | Self::IsJson
                | Self::IsNumber
                | Self::IsString
                | Self::IsBoolean
                | Self::IsArray
        )
    }

    /// Operators whose operand is a comma-separated list.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::Between)
    }
}

impl fmt::Display for AssertionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssertionOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or(())
    }
}

/// Pass or fail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Passed.
    Pass,
    /// Failed.
    Fail,
}

/// Result of running a single assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionResult {
    /// Unique identifier of this result.
    pub uid: String,
    /// Left-hand expression.
    pub lhs_expr: String,
    /// Right-hand side as written.
    pub rhs_expr: String,
    /// Operand after the operator keyword.
    pub rhs_operand: String,
    /// Operator applied.
    pub operator: AssertionOperator,
    /// Outcome.
    pub status: TestStatus,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssertionResult {
    /// Create a passed result.
    #[must_use]
    pub fn pass(
        lhs_expr: impl Into<String>,
        rhs_expr: impl Into<String>,
        operator: AssertionOperator,
        rhs_operand: impl Into<String>,
    ) -> Self {
        Self {
            uid: crate::generate_id(),
            lhs_expr: lhs_expr.into(),
            rhs_expr: rhs_expr.into(),
            rhs_operand: rhs_operand.into(),
            operator,
            status: TestStatus::Pass,
            error: None,
        }
    }

    /// Turn this result into a failure with a message.
    #[must_use]
    pub fn into_failure(mut self, error: impl Into<String>) -> Self {
        self.status = TestStatus::Fail;
        self.error = Some(error.into());
        self
    }

    /// Whether the assertion passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

/// Result of one `test(...)` block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    /// Test description.
    pub description: String,
    /// Outcome.
    pub status: TestStatus,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Actual value reported by a failing expectation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
    /// Expected value reported by a failing expectation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
}

impl TestResult {
    /// Whether the test passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_round_trip_through_keyword() {
        for op in AssertionOperator::ALL {
            assert_eq!(op.as_str().parse::<AssertionOperator>(), Ok(op));
        }
        assert!("equals".parse::<AssertionOperator>().is_err());
    }

    #[test]
    fn test_unary_and_list_operators() {
        assert!(AssertionOperator::IsNull.is_unary());
        assert!(!AssertionOperator::Eq.is_unary());
        assert!(AssertionOperator::Between.takes_list());
        assert!(!AssertionOperator::Contains.takes_list());
    }

    #[test]
    fn test_failure_conversion() {
        let result = AssertionResult::pass("res.status", "eq 200", AssertionOperator::Eq, "200")
            .into_failure("expected 404 to equal 200");
        assert!(!result.passed());
        assert_eq!(result.error.as_deref(), Some("expected 404 to equal 200"));
    }

    #[test]
    fn test_operator_serde_is_camel_case() {
        let json = serde_json::to_string(&AssertionOperator::NotIn).unwrap();
        assert_eq!(json, "\"notIn\"");
    }
}
