//! Approval chain construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rule::{ApprovalRule, Approver};

/// How the approvers within a step are consulted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Approvers respond one after another.
    Sequential,
    /// Every listed approver must respond.
    Parallel,
    /// Any single approver suffices.
    AnyOf,
}

/// One step of an approval chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Rule that contributed the step.
    pub rule_id: String,
    /// Consultation mode.
    pub step_type: StepType,
    /// Approvers consulted in this step (available ones only).
    pub approvers: Vec<Approver>,
    /// Approvals needed to pass the step.
    pub required_approvals: u32,
    /// Seconds before the step times out.
    pub timeout_seconds: u64,
    /// Whether a timeout escalates rather than fails.
    pub escalation_on_timeout: bool,
}

impl ApprovalStep {
    /// Builds the step contributed by a rule, drawing only available
    /// approvers from its pool. Returns `None` when nobody is available.
    #[must_use]
    pub fn from_rule(rule: &ApprovalRule) -> Option<Self> {
        let approvers = rule.available_approvers();
        if approvers.is_empty() {
            return None;
        }
        Some(Self {
            rule_id: rule.id.clone(),
            step_type: if rule.required_approvers > 1 {
                StepType::Parallel
            } else {
                StepType::AnyOf
            },
            approvers,
            required_approvals: rule.required_approvers,
            timeout_seconds: rule.timeout_seconds,
            escalation_on_timeout: rule.escalation.enabled,
        })
    }
}

/// A merged escalation level across every contributing rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationLevel {
    /// Ladder position, starting at 1.
    pub level: u32,
    /// Union of the approvers configured at this level.
    pub approvers: Vec<Approver>,
    /// Minimum timeout across contributing rules.
    pub timeout_seconds: u64,
}

/// Merges the escalation ladders of the supplied rules by level: approver
/// sets union by id, timeouts take the minimum contributor.
#[must_use]
pub fn merge_escalations(rules: &[&ApprovalRule]) -> Vec<EscalationLevel> {
    let mut by_level: BTreeMap<u32, EscalationLevel> = BTreeMap::new();

    for rule in rules {
        if !rule.escalation.enabled {
            continue;
        }
        for configured in &rule.escalation.levels {
            let entry = by_level
                .entry(configured.level)
                .or_insert_with(|| EscalationLevel {
                    level: configured.level,
                    approvers: Vec::new(),
                    timeout_seconds: configured.timeout_seconds,
                });
            entry.timeout_seconds = entry.timeout_seconds.min(configured.timeout_seconds);
            for approver in &configured.approvers {
                if !entry.approvers.iter().any(|seen| seen.id == approver.id) {
                    entry.approvers.push(approver.clone());
                }
            }
        }
    }

    by_level.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{EscalationConfig, EscalationLevelConfig};

    fn rule_with_escalation(id: &str, timeout: u64, approver: &str) -> ApprovalRule {
        let mut rule = ApprovalRule::new(id, id, vec![Approver::new("pool")]);
        rule.escalation = EscalationConfig {
            enabled: true,
            levels: vec![EscalationLevelConfig {
                level: 1,
                approvers: vec![Approver::new(approver)],
                timeout_seconds: timeout,
            }],
        };
        rule
    }

    #[test]
    fn multi_approver_steps_are_parallel() {
        let mut rule = ApprovalRule::new("a", "A", vec![Approver::new("x"), Approver::new("y")]);
        rule.required_approvers = 2;
        let step = ApprovalStep::from_rule(&rule).unwrap();
        assert_eq!(step.step_type, StepType::Parallel);

        rule.required_approvers = 1;
        let step = ApprovalStep::from_rule(&rule).unwrap();
        assert_eq!(step.step_type, StepType::AnyOf);
    }

    #[test]
    fn unavailable_pool_yields_no_step() {
        let rule = ApprovalRule::new("a", "A", vec![Approver::new("x").unavailable()]);
        assert!(ApprovalStep::from_rule(&rule).is_none());
    }

    #[test]
    fn ladders_merge_by_level_with_min_timeout() {
        let a = rule_with_escalation("a", 600, "lead");
        let b = rule_with_escalation("b", 300, "director");
        let merged = merge_escalations(&[&a, &b]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].level, 1);
        assert_eq!(merged[0].timeout_seconds, 300);
        let ids: Vec<_> = merged[0].approvers.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["lead", "director"]);
    }

    #[test]
    fn duplicate_approvers_union_by_id() {
        let a = rule_with_escalation("a", 600, "lead");
        let b = rule_with_escalation("b", 900, "lead");
        let merged = merge_escalations(&[&a, &b]);
        assert_eq!(merged[0].approvers.len(), 1);
        assert_eq!(merged[0].timeout_seconds, 600);
    }
}
