//! Applied constraints derived from matched rules.

use serde::{Deserialize, Serialize};

use verdict_policy::{Action, Policy, PolicyRule, Severity};

/// Category of an applied constraint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    /// Derived from a matched policy rule.
    PolicyRule,
    /// Requires an approval gate before proceeding.
    ApprovalGate,
    /// Rate-limiting constraint.
    RateLimit,
    /// Budget or spend constraint.
    BudgetLimit,
    /// Security-classified constraint.
    SecurityRule,
    /// Governance-imposed constraint.
    GovernanceRule,
}

/// Scope a constraint applies to, from widest to narrowest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintScope {
    /// Applies platform-wide.
    Global,
    /// Applies within one namespace.
    Namespace,
    /// Applies within one project.
    Project,
    /// Applies to one user.
    User,
}

/// A matched rule reified as a satisfiable or violable item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedConstraint {
    /// Unique constraint identifier (`policy-id/rule-id` for derived ones).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Constraint category.
    #[serde(rename = "type")]
    pub constraint_type: ConstraintType,
    /// Severity derived from the originating action.
    pub severity: Severity,
    /// Scope the constraint applies to.
    pub scope: ConstraintScope,
    /// Whether the constraint is currently satisfied.
    pub satisfied: bool,
    /// Explanation of the constraint state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppliedConstraint {
    /// Derives a constraint from a matched rule. Severity maps from the
    /// action (allow → info, warn/modify → warning, deny → error); a deny
    /// match is a violated constraint, every other action a satisfied one.
    #[must_use]
    pub fn from_matched_rule(policy: &Policy, rule: &PolicyRule) -> Self {
        let (severity, satisfied) = match &rule.action {
            Action::Allow { .. } | Action::Log { .. } => (Severity::Info, true),
            Action::Warn { .. } | Action::RateLimit { .. } | Action::Modify { .. } => {
                (Severity::Warning, true)
            }
            Action::Deny { .. } => (Severity::Error, false),
        };

        Self {
            id: format!("{}/{}", policy.id, rule.id),
            name: rule.name.clone(),
            constraint_type: match &rule.action {
                Action::RateLimit { .. } => ConstraintType::RateLimit,
                Action::Deny { .. } => ConstraintType::SecurityRule,
                _ => ConstraintType::PolicyRule,
            },
            severity,
            scope: scope_for(policy, rule),
            satisfied,
            reason: rule.action.reason().map(ToOwned::to_owned),
        }
    }
}

/// Scope is inferred from the narrowest branch the rule's condition
/// inspects; a rule reading `user.*` is user-scoped even if the policy
/// governs a whole namespace.
fn scope_for(policy: &Policy, rule: &PolicyRule) -> ConstraintScope {
    let mut narrowest = if policy.namespace.is_empty() {
        ConstraintScope::Global
    } else {
        ConstraintScope::Namespace
    };
    rule.condition.for_each_field(&mut |field| {
        let candidate = if field.starts_with("user.") {
            ConstraintScope::User
        } else if field.starts_with("project.") {
            ConstraintScope::Project
        } else {
            return;
        };
        if rank(candidate) > rank(narrowest) {
            narrowest = candidate;
        }
    });
    narrowest
}

const fn rank(scope: ConstraintScope) -> u8 {
    match scope {
        ConstraintScope::Global => 0,
        ConstraintScope::Namespace => 1,
        ConstraintScope::Project => 2,
        ConstraintScope::User => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_policy::{Condition, PolicyStatus};

    fn policy() -> Policy {
        Policy::builder("p-1")
            .name("P")
            .namespace("llm-ops")
            .status(PolicyStatus::Active)
            .rule(PolicyRule::new(
                "r-deny",
                "deny big requests",
                Condition::greater_than("llm.maxTokens", 1000i64),
                Action::deny("too large"),
            ))
            .rule(PolicyRule::new(
                "r-warn",
                "warn on user t0",
                Condition::equals("user.id", "t0"),
                Action::warn("watchlist"),
            ))
            .build()
    }

    #[test]
    fn deny_becomes_violated_error_constraint() {
        let policy = policy();
        let constraint = AppliedConstraint::from_matched_rule(&policy, &policy.rules[0]);
        assert_eq!(constraint.severity, Severity::Error);
        assert!(!constraint.satisfied);
        assert_eq!(constraint.id, "p-1/r-deny");
        assert_eq!(constraint.constraint_type, ConstraintType::SecurityRule);
    }

    #[test]
    fn scope_narrows_to_the_inspected_branch() {
        let policy = policy();
        let namespace_scoped = AppliedConstraint::from_matched_rule(&policy, &policy.rules[0]);
        assert_eq!(namespace_scoped.scope, ConstraintScope::Namespace);

        let user_scoped = AppliedConstraint::from_matched_rule(&policy, &policy.rules[1]);
        assert_eq!(user_scoped.scope, ConstraintScope::User);
    }
}
