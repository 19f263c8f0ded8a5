//! Approval rule definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use verdict_policy::Condition;

/// Errors raised while validating approval rules.
#[derive(Debug, Error)]
pub enum ApprovalRuleError {
    /// An active rule has neither approvers nor auto-approve conditions.
    #[error("active rule `{id}` needs a non-empty approver pool or auto-approve conditions")]
    Unroutable {
        /// The offending rule id.
        id: String,
    },
}

/// How a rule's condition list combines.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCombinator {
    /// Every condition must match.
    #[default]
    All,
    /// At least one condition must match.
    Any,
}

/// Someone who can approve an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    /// Stable approver identifier.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the approver can currently be routed to.
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

impl Approver {
    /// Creates an available approver.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            available: true,
        }
    }

    /// Marks the approver unavailable.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

/// Escalation ladder attached to a rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Whether timeouts escalate.
    #[serde(default)]
    pub enabled: bool,
    /// Ordered escalation levels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<EscalationLevelConfig>,
}

/// One configured escalation level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevelConfig {
    /// Ladder position, starting at 1.
    pub level: u32,
    /// Approvers contacted at this level.
    pub approvers: Vec<Approver>,
    /// Seconds before this level itself escalates.
    pub timeout_seconds: u64,
}

/// Conditions under which an action skips human approval. Checks run in
/// declaration order; the first satisfied check wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoApproveConditions {
    /// Requester roles that auto-approve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_roles: Vec<String>,
    /// Resource types that auto-approve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_resource_types: Vec<String>,
    /// Operations that auto-approve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_operations: Vec<String>,
    /// Maximum `details.value` that auto-approves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Business-hours window that auto-approves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restrictions: Option<TimeRestrictions>,
}

impl AutoApproveConditions {
    /// Returns `true` when no check is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_roles.is_empty()
            && self.allowed_resource_types.is_empty()
            && self.allowed_operations.is_empty()
            && self.max_value.is_none()
            && self.time_restrictions.is_none()
    }
}

/// Business-hours window evaluated against a configured UTC offset, not
/// the server's local timezone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRestrictions {
    /// First allowed hour (inclusive, 0-23).
    pub start_hour: u8,
    /// Last allowed hour (exclusive, 0-23).
    pub end_hour: u8,
    /// Allowed weekdays as days-from-Monday (0 = Monday .. 6 = Sunday).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<u8>,
}

/// A rule deciding whether and how an action is routed for approval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRule {
    /// Unique rule identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Conditions selecting the actions this rule governs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// How the condition list combines.
    #[serde(default)]
    pub combinator: MatchCombinator,
    /// Approvals needed before the action proceeds.
    #[serde(default = "default_required")]
    pub required_approvers: u32,
    /// Pool the chain draws approvers from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approver_pool: Vec<Approver>,
    /// Seconds before the rule's step times out.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Escalation ladder applied on timeout.
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// Conditions that skip approval entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve: Option<AutoApproveConditions>,
    /// Routing priority; higher priority rules come first in the chain.
    #[serde(default)]
    pub priority: i32,
    /// Inactive rules are never matched.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_required() -> u32 {
    1
}

fn default_timeout() -> u64 {
    3600
}

impl ApprovalRule {
    /// Creates an active single-approval rule over the supplied pool.
    pub fn new(id: impl Into<String>, name: impl Into<String>, approver_pool: Vec<Approver>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            conditions: Vec::new(),
            combinator: MatchCombinator::All,
            required_approvers: 1,
            approver_pool,
            timeout_seconds: default_timeout(),
            escalation: EscalationConfig::default(),
            auto_approve: None,
            priority: 0,
            active: true,
        }
    }

    /// Returns the available approvers from the pool.
    #[must_use]
    pub fn available_approvers(&self) -> Vec<Approver> {
        self.approver_pool
            .iter()
            .filter(|approver| approver.available)
            .cloned()
            .collect()
    }

    /// Validates the routability invariant: an active rule must be able
    /// to either route to someone or auto-approve.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalRuleError::Unroutable`] when it cannot.
    pub fn validate(&self) -> Result<(), ApprovalRuleError> {
        if !self.active {
            return Ok(());
        }
        let has_pool = !self.approver_pool.is_empty();
        let has_auto = self
            .auto_approve
            .as_ref()
            .is_some_and(|auto| !auto.is_empty());
        if has_pool || has_auto {
            Ok(())
        } else {
            Err(ApprovalRuleError::Unroutable {
                id: self.id.clone(),
            })
        }
    }
}

/// Who is asking for the action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Requester identifier.
    pub id: String,
    /// Roles held by the requester.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Requester {
    /// Creates a requester with the supplied roles.
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }
}

/// Caller-declared urgency of the routed action.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Background work.
    Low,
    /// Normal interactive work.
    #[default]
    Normal,
    /// Elevated urgency; escalates immediately.
    High,
    /// Critical urgency; escalates immediately.
    Critical,
    /// Emergency change; escalates immediately.
    Emergency,
}

impl RequestPriority {
    /// Returns `true` when the priority forces escalation.
    #[must_use]
    pub const fn forces_escalation(self) -> bool {
        matches!(self, Self::High | Self::Critical | Self::Emergency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_rule_without_routing_is_invalid() {
        let rule = ApprovalRule::new("a-1", "Empty", Vec::new());
        assert!(rule.validate().is_err());
    }

    #[test]
    fn inactive_rule_skips_the_invariant() {
        let mut rule = ApprovalRule::new("a-1", "Empty", Vec::new());
        rule.active = false;
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn auto_approve_satisfies_the_invariant() {
        let mut rule = ApprovalRule::new("a-1", "Auto", Vec::new());
        rule.auto_approve = Some(AutoApproveConditions {
            allowed_roles: vec!["platform-admin".into()],
            ..AutoApproveConditions::default()
        });
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn available_approvers_filters_the_pool() {
        let rule = ApprovalRule::new(
            "a-1",
            "Pool",
            vec![Approver::new("alice"), Approver::new("bob").unavailable()],
        );
        let available = rule.available_approvers();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "alice");
    }
}
