//! Policy rules: condition-action pairs.

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::condition::Condition;
use super::violation::Violation;

/// A condition-action pair; the action fires when the condition evaluates
/// true against the request context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Identifier unique within the owning policy.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Disabled rules are inert but retained for audit.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Condition tree guarding the action.
    pub condition: Condition,
    /// Action applied when the condition matches.
    pub action: Action,
}

fn default_enabled() -> bool {
    true
}

impl PolicyRule {
    /// Creates an enabled rule.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: Condition,
        action: Action,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: true,
            condition,
            action,
        }
    }

    /// Sets the description, returning the updated rule.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Toggles the rule, returning the updated rule.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub(crate) fn validate_into(&self, path: &str, violations: &mut Vec<Violation>) {
        if self.id.trim().is_empty() {
            violations.push(Violation::error(
                "EMPTY_RULE_ID",
                "rule id cannot be empty",
                format!("{path}.id"),
            ));
        }
        self.condition
            .validate_into(&format!("{path}.condition"), violations);
        self.action
            .validate_into(&format!("{path}.action"), violations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_enabled() {
        let json = r#"{
            "id": "r1",
            "name": "limit",
            "condition": {"operator": "exists", "field": "user.id"},
            "action": {"decision": "allow"}
        }"#;
        let rule: PolicyRule = serde_json::from_str(json).unwrap();
        assert!(rule.enabled);
    }

    #[test]
    fn reports_nested_violations() {
        let rule = PolicyRule::new(
            "",
            "broken",
            Condition::all(Vec::new()),
            Action::Deny { reason: None },
        );
        let mut violations = Vec::new();
        rule.validate_into("rules[0]", &mut violations);
        let codes: Vec<_> = violations.iter().map(|v| v.code.as_str()).collect();
        assert!(codes.contains(&"EMPTY_RULE_ID"));
        assert!(codes.contains(&"EMPTY_COMPOSITE"));
        assert!(codes.contains(&"MISSING_DENY_REASON"));
    }
}
