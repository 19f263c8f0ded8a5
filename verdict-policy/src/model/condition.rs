//! Condition trees evaluated against a request context.

use serde::{Deserialize, Serialize};

use super::violation::Violation;

/// A condition node: either a leaf predicate over a context field or a
/// boolean combination of child conditions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Operator applied by this node.
    pub operator: ConditionOperator,
    /// Dotted field path for leaf predicates (e.g. `llm.maxTokens`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Literal the field is compared against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ConditionValue>,
    /// Child conditions for composite operators.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Condition {
    fn leaf(
        operator: ConditionOperator,
        field: impl Into<String>,
        value: Option<ConditionValue>,
    ) -> Self {
        Self {
            operator,
            field: Some(field.into()),
            value,
            conditions: Vec::new(),
        }
    }

    /// Equality predicate.
    pub fn equals(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::leaf(ConditionOperator::Equals, field, Some(value.into()))
    }

    /// Inequality predicate.
    pub fn not_equals(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::leaf(ConditionOperator::NotEquals, field, Some(value.into()))
    }

    /// Numeric strictly-greater predicate.
    pub fn greater_than(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::leaf(ConditionOperator::GreaterThan, field, Some(value.into()))
    }

    /// Numeric strictly-less predicate.
    pub fn less_than(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::leaf(ConditionOperator::LessThan, field, Some(value.into()))
    }

    /// Membership predicate over a literal list.
    pub fn is_in(field: impl Into<String>, values: Vec<ConditionValue>) -> Self {
        Self::leaf(
            ConditionOperator::In,
            field,
            Some(ConditionValue::Array(values)),
        )
    }

    /// Substring or element-membership predicate.
    pub fn contains(field: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        Self::leaf(ConditionOperator::Contains, field, Some(value.into()))
    }

    /// Field-presence predicate.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::leaf(ConditionOperator::Exists, field, None)
    }

    /// Regex predicate; the pattern is left-anchored unless it begins
    /// with `^`.
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::leaf(
            ConditionOperator::Matches,
            field,
            Some(ConditionValue::String(pattern.into())),
        )
    }

    /// Conjunction over children; short-circuits on the first false.
    #[must_use]
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            operator: ConditionOperator::All,
            field: None,
            value: None,
            conditions,
        }
    }

    /// Disjunction over children; short-circuits on the first true.
    #[must_use]
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            operator: ConditionOperator::Any,
            field: None,
            value: None,
            conditions,
        }
    }

    /// Negation of a single child.
    #[must_use]
    pub fn not(condition: Condition) -> Self {
        Self {
            operator: ConditionOperator::Not,
            field: None,
            value: None,
            conditions: vec![condition],
        }
    }

    /// Returns `true` for composite (all/any/not) nodes.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(
            self.operator,
            ConditionOperator::All | ConditionOperator::Any | ConditionOperator::Not
        )
    }

    /// Visits every leaf field path in the tree.
    pub fn for_each_field<F: FnMut(&str)>(&self, f: &mut F) {
        if let Some(field) = &self.field {
            f(field);
        }
        for child in &self.conditions {
            child.for_each_field(f);
        }
    }

    pub(crate) fn validate_into(&self, path: &str, violations: &mut Vec<Violation>) {
        if self.is_composite() {
            if self.conditions.is_empty() {
                violations.push(Violation::error(
                    "EMPTY_COMPOSITE",
                    format!("{:?} condition requires at least one child", self.operator),
                    path,
                ));
            }
            for (index, child) in self.conditions.iter().enumerate() {
                child.validate_into(&format!("{path}.conditions[{index}]"), violations);
            }
            return;
        }

        if self.field.is_none() {
            violations.push(Violation::error(
                "MISSING_CONDITION_FIELD",
                format!("{:?} condition requires a field path", self.operator),
                path,
            ));
        }

        let needs_value = !matches!(
            self.operator,
            ConditionOperator::Exists | ConditionOperator::NotExists
        );
        if needs_value && self.value.is_none() {
            violations.push(Violation::error(
                "MISSING_CONDITION_VALUE",
                format!("{:?} condition requires a comparison value", self.operator),
                path,
            ));
        }
    }
}

/// Operators usable in condition leaves and composites.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Deep value equality with numeric promotion.
    Equals,
    /// Negated deep equality.
    NotEquals,
    /// Numeric strictly-greater comparison.
    GreaterThan,
    /// Numeric greater-or-equal comparison.
    GreaterThanOrEqual,
    /// Numeric strictly-less comparison.
    LessThan,
    /// Numeric less-or-equal comparison.
    LessThanOrEqual,
    /// Substring for strings, element membership for sequences.
    Contains,
    /// Membership in a literal list.
    In,
    /// Negated membership in a literal list.
    NotIn,
    /// Regex match, left-anchored unless the pattern starts with `^`.
    Matches,
    /// Field resolves to a defined, non-null value.
    Exists,
    /// Field is absent or null.
    NotExists,
    /// Byte-exact string prefix.
    StartsWith,
    /// Byte-exact string suffix.
    EndsWith,
    /// Conjunction of children.
    #[serde(alias = "and")]
    All,
    /// Disjunction of children.
    #[serde(alias = "or")]
    Any,
    /// Negation of children.
    Not,
}

/// A literal usable in condition leaves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// String literal.
    String(String),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// List of literals.
    Array(Vec<ConditionValue>),
    /// Explicit null.
    Null,
}

impl ConditionValue {
    /// Converts the literal into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::json!(n),
            Self::Float(n) => serde_json::json!(n),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ConditionValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ConditionValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for ConditionValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for ConditionValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for ConditionValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl<T: Into<ConditionValue>> From<Vec<T>> for ConditionValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_requires_field() {
        let bare = Condition {
            operator: ConditionOperator::Equals,
            field: None,
            value: None,
            conditions: Vec::new(),
        };
        let mut violations = Vec::new();
        bare.validate_into("condition", &mut violations);
        assert!(violations.iter().any(|v| v.code == "MISSING_CONDITION_FIELD"));
        assert!(violations.iter().any(|v| v.code == "MISSING_CONDITION_VALUE"));
    }

    #[test]
    fn composite_requires_children() {
        let empty = Condition::all(Vec::new());
        let mut violations = Vec::new();
        empty.validate_into("condition", &mut violations);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, "EMPTY_COMPOSITE");
    }

    #[test]
    fn serde_accepts_and_alias() {
        let parsed: Condition = serde_json::from_str(
            r#"{"operator": "and", "conditions": [
                {"operator": "equals", "field": "llm.provider", "value": "openai"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parsed.operator, ConditionOperator::All);
        assert_eq!(parsed.conditions.len(), 1);
    }

    #[test]
    fn round_trips_through_json() {
        let condition = Condition::all(vec![
            Condition::equals("llm.provider", "openai"),
            Condition::greater_than("llm.maxTokens", 1000i64),
        ]);
        let json = serde_json::to_string(&condition).unwrap();
        let parsed: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, condition);
    }

    #[test]
    fn collects_leaf_fields() {
        let condition = Condition::any(vec![
            Condition::equals("user.id", "u1"),
            Condition::not(Condition::exists("request.ip")),
        ]);
        let mut fields = Vec::new();
        condition.for_each_field(&mut |f| fields.push(f.to_owned()));
        assert_eq!(fields, ["user.id", "request.ip"]);
    }
}
