//! Fail-closed governance validation.
//!
//! Gates every mutation that would make a policy active: structural
//! integrity, critical-resource deny scoping, conflicting-rule detection,
//! approval inference, and risk classification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::model::{Action, Condition, Policy, Severity, Violation};

/// Resource words that make an unscoped deny rule a critical finding.
/// Matching is against exact lowercased word segments of rule names,
/// descriptions, and leaf field paths, so `maxTokens` does not trip on
/// `token`.
const CRITICAL_RESOURCE_TOKENS: &[&str] = &[
    "admin",
    "root",
    "system",
    "database",
    "credentials",
    "secret",
    "key",
    "token",
    "password",
    "auth",
    "pii",
    "financial",
    "payment",
    "ssn",
    "health",
    "hipaa",
];

/// Field substrings that count as explicit scope narrowing.
const SCOPE_FIELD_MARKERS: &[&str] = &["scope", "namespace", "environment"];

/// Tags that mark a policy as explicitly non-production.
const NON_PROD_TAGS: &[&str] = &["dev", "development", "staging", "test", "qa"];

/// Classification of a policy derived from tags, namespace, and rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Guards privileged or sensitive resources.
    Security,
    /// Enforces regulatory or contractual obligations.
    Compliance,
    /// Enforces spend limits.
    Cost,
    /// Keeps the platform healthy (rate limits, quotas).
    Operational,
    /// Everything else.
    General,
}

/// Risk level attached to a governance report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No elevated findings.
    Low,
    /// Production or compliance context.
    Medium,
    /// Blocking findings or security classification.
    High,
    /// Critical findings present.
    Critical,
}

/// Result of governance validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GovernanceReport {
    /// `false` when any blocking violation was found; the mutation must
    /// be rejected.
    pub valid: bool,
    /// Every finding, blocking or advisory.
    pub violations: Vec<Violation>,
    /// Whether enabling this policy requires approval authority.
    pub requires_approval: bool,
    /// Why approval is required, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
    /// Overall risk classification.
    pub risk_level: RiskLevel,
    /// Derived policy kind.
    pub kind: PolicyKind,
}

/// Classifies a policy: tags first, namespace substrings second, and any
/// deny rule last (a denying policy defaults to security).
#[must_use]
pub fn classify_policy(policy: &Policy) -> PolicyKind {
    let tag_kind = policy.tags.iter().find_map(|tag| {
        match tag.to_ascii_lowercase().as_str() {
            "security" => Some(PolicyKind::Security),
            "compliance" => Some(PolicyKind::Compliance),
            "cost" | "budget" => Some(PolicyKind::Cost),
            "operational" | "ops" => Some(PolicyKind::Operational),
            _ => None,
        }
    });
    if let Some(kind) = tag_kind {
        return kind;
    }

    let namespace = policy.namespace.to_ascii_lowercase();
    for (needle, kind) in [
        ("security", PolicyKind::Security),
        ("compliance", PolicyKind::Compliance),
        ("cost", PolicyKind::Cost),
        ("ops", PolicyKind::Operational),
    ] {
        if namespace.contains(needle) {
            return kind;
        }
    }

    if policy.rules.iter().any(|rule| rule.action.is_deny()) {
        return PolicyKind::Security;
    }
    PolicyKind::General
}

/// Production heuristic: explicit prod markers make a policy production,
/// and the absence of any explicit non-prod tag also implies production
/// (conservative default).
#[must_use]
pub fn is_production_scoped(policy: &Policy) -> bool {
    let namespace = policy.namespace.to_ascii_lowercase();
    if namespace.contains("prod") {
        return true;
    }
    let tags: Vec<String> = policy
        .tags
        .iter()
        .map(|tag| tag.to_ascii_lowercase())
        .collect();
    if tags.iter().any(|tag| tag.contains("prod")) {
        return true;
    }
    !tags
        .iter()
        .any(|tag| NON_PROD_TAGS.contains(&tag.as_str()))
}

/// The fail-closed governance validator.
#[derive(Clone, Debug, Default)]
pub struct GovernanceValidator {
    capacity: Option<CapacityThresholds>,
}

/// Namespace capacity alerting thresholds.
#[derive(Clone, Copy, Debug)]
pub struct CapacityThresholds {
    /// Maximum policies tolerated per namespace.
    pub max_policies_per_namespace: usize,
    /// Percentage of the maximum that raises a warning finding.
    pub warning_threshold_percent: u8,
    /// Percentage of the maximum that raises a critical finding.
    pub critical_threshold_percent: u8,
}

impl GovernanceValidator {
    /// Creates a validator with no capacity alerting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables namespace capacity alerting with the supplied thresholds.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: CapacityThresholds) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Validates a single policy, producing the full governance report.
    #[must_use]
    pub fn validate(&self, policy: &Policy) -> GovernanceReport {
        let mut violations = Vec::new();

        for (index, rule) in policy.rules.iter().enumerate() {
            let path = format!("rules[{index}]");
            check_condition_structure(&rule.condition, &path, &mut violations);

            if rule.enabled && rule.action.is_deny() {
                check_deny_scope(policy, rule, &path, &mut violations);
            }
        }

        check_conflicting_rules(policy, &mut violations);

        let kind = classify_policy(policy);
        let production = is_production_scoped(policy);
        let enabling = policy.status.is_evaluated();

        let mut requires_approval = false;
        let mut approval_reason = None;
        if enabling {
            if matches!(kind, PolicyKind::Security | PolicyKind::Compliance) {
                requires_approval = true;
                approval_reason = Some(format!(
                    "{} policies require approval before activation",
                    kind_label(kind)
                ));
            } else if production && policy.rules.iter().any(|rule| rule.action.is_deny()) {
                requires_approval = true;
                approval_reason =
                    Some("production policies with deny rules require approval".to_owned());
            }
        }

        let valid = !violations.iter().any(Violation::is_blocking);
        let risk_level = risk_level(&violations, kind, production);

        debug!(
            policy_id = %policy.id,
            valid,
            ?risk_level,
            findings = violations.len(),
            "governance validation"
        );

        GovernanceReport {
            valid,
            violations,
            requires_approval,
            approval_reason,
            risk_level,
            kind,
        }
    }

    /// Advisory capacity findings for a namespace's active-policy count.
    #[must_use]
    pub fn check_capacity(&self, namespace: &str, active_count: usize) -> Option<Violation> {
        let capacity = self.capacity?;
        let max = capacity.max_policies_per_namespace.max(1);
        let used_percent = active_count.saturating_mul(100) / max;
        if used_percent >= usize::from(capacity.critical_threshold_percent) {
            Some(Violation::critical(
                "NAMESPACE_CAPACITY_CRITICAL",
                format!("namespace `{namespace}` holds {active_count}/{max} active policies"),
                namespace,
            ))
        } else if used_percent >= usize::from(capacity.warning_threshold_percent) {
            Some(Violation::warning(
                "NAMESPACE_CAPACITY_WARNING",
                format!("namespace `{namespace}` holds {active_count}/{max} active policies"),
                namespace,
            ))
        } else {
            None
        }
    }
}

const fn kind_label(kind: PolicyKind) -> &'static str {
    match kind {
        PolicyKind::Security => "security",
        PolicyKind::Compliance => "compliance",
        PolicyKind::Cost => "cost",
        PolicyKind::Operational => "operational",
        PolicyKind::General => "general",
    }
}

fn check_condition_structure(condition: &Condition, path: &str, violations: &mut Vec<Violation>) {
    if condition.is_composite() {
        if condition.conditions.is_empty() {
            violations.push(Violation::error(
                "EMPTY_COMPOSITE",
                "composite condition carries no children",
                path,
            ));
        }
        for (index, child) in condition.conditions.iter().enumerate() {
            check_condition_structure(child, &format!("{path}.conditions[{index}]"), violations);
        }
    } else if condition.field.is_none() {
        violations.push(Violation::error(
            "MISSING_CONDITION_FIELD",
            "leaf condition carries no field path",
            path,
        ));
    }
}

fn check_deny_scope(
    policy: &Policy,
    rule: &crate::model::PolicyRule,
    path: &str,
    violations: &mut Vec<Violation>,
) {
    let mut words = Vec::new();
    collect_words(&rule.name, &mut words);
    if let Some(description) = &rule.description {
        collect_words(description, &mut words);
    }
    rule.condition
        .for_each_field(&mut |field| collect_words(field, &mut words));

    let touches_critical = words
        .iter()
        .any(|word| CRITICAL_RESOURCE_TOKENS.contains(&word.as_str()));
    if !touches_critical {
        return;
    }

    let has_environment_tag = policy.tags.iter().any(|tag| {
        let tag = tag.to_ascii_lowercase();
        tag.contains("env") || tag.contains("prod") || NON_PROD_TAGS.contains(&tag.as_str())
    });

    let mut has_scope_condition = false;
    rule.condition.for_each_field(&mut |field| {
        let field = field.to_ascii_lowercase();
        if SCOPE_FIELD_MARKERS.iter().any(|marker| field.contains(marker)) {
            has_scope_condition = true;
        }
    });

    if !has_environment_tag && !has_scope_condition {
        violations.push(Violation::error(
            "DENY_WITHOUT_SCOPE",
            format!(
                "deny rule `{}` touches a critical resource without an environment tag or scope-narrowing condition",
                rule.id
            ),
            path,
        ));
        violations.push(Violation::critical(
            "CRITICAL_RESOURCE_DENY",
            format!("deny rule `{}` targets a critical resource", rule.id),
            path,
        ));
    }
}

/// Splits an identifier into lowercased words on camelCase and
/// non-alphanumeric boundaries.
fn collect_words(text: &str, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase();
            current.extend(ch.to_lowercase());
        } else {
            prev_lower = false;
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

fn check_conflicting_rules(policy: &Policy, violations: &mut Vec<Violation>) {
    // field -> (canonical literal -> labels of allow/deny rules seen).
    let mut by_field: HashMap<(String, String), (Vec<String>, Vec<String>)> = HashMap::new();

    for rule in policy.enabled_rules() {
        let outcome_bucket = match &rule.action {
            Action::Allow { .. } => 0,
            Action::Deny { .. } => 1,
            _ => continue,
        };
        collect_literals(&rule.condition, &mut |field, literal| {
            let entry = by_field
                .entry((field.to_owned(), literal))
                .or_default();
            let bucket = if outcome_bucket == 0 {
                &mut entry.0
            } else {
                &mut entry.1
            };
            bucket.push(rule.id.clone());
        });
    }

    for ((field, _literal), (allows, denies)) in by_field {
        if !allows.is_empty() && !denies.is_empty() {
            violations.push(Violation::error(
                "CONFLICTING_RULES",
                format!(
                    "field `{field}` is allowed by [{}] and denied by [{}] for the same value",
                    allows.join(", "),
                    denies.join(", ")
                ),
                field,
            ));
        }
    }
}

fn collect_literals(condition: &Condition, f: &mut impl FnMut(&str, String)) {
    if let (Some(field), Some(value)) = (&condition.field, &condition.value) {
        f(field, verdict_primitives::canonical_json(&value.to_json()));
    }
    for child in &condition.conditions {
        collect_literals(child, f);
    }
}

fn risk_level(violations: &[Violation], kind: PolicyKind, production: bool) -> RiskLevel {
    if violations
        .iter()
        .any(|violation| violation.severity == Severity::Critical)
    {
        return RiskLevel::Critical;
    }
    if violations
        .iter()
        .any(|violation| violation.severity == Severity::Error)
        || kind == PolicyKind::Security
    {
        return RiskLevel::High;
    }
    if production || kind == PolicyKind::Compliance {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PolicyRule, PolicyStatus};

    fn policy_with_rules(rules: Vec<PolicyRule>) -> Policy {
        let mut builder = Policy::builder("p-gov")
            .name("Governed")
            .namespace("llm-ops")
            .status(PolicyStatus::Active);
        for rule in rules {
            builder = builder.rule(rule);
        }
        builder.build()
    }

    #[test]
    fn unscoped_credential_deny_is_critical() {
        let policy = policy_with_rules(vec![PolicyRule::new(
            "r-pw",
            "deny password hash reads",
            Condition::exists("user.password_hash"),
            Action::deny("credential access forbidden"),
        )]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(!report.valid);
        let codes: Vec<_> = report.violations.iter().map(|v| v.code.as_str()).collect();
        assert!(codes.contains(&"DENY_WITHOUT_SCOPE"));
        assert!(codes.contains(&"CRITICAL_RESOURCE_DENY"));
        assert_eq!(report.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn scope_condition_satisfies_the_deny_check() {
        let policy = policy_with_rules(vec![PolicyRule::new(
            "r-pw",
            "deny password hash reads",
            Condition::all(vec![
                Condition::exists("user.password_hash"),
                Condition::equals("project.environment", "production"),
            ]),
            Action::deny("credential access forbidden"),
        )]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(report.valid);
    }

    #[test]
    fn max_tokens_does_not_trip_the_token_word() {
        let policy = policy_with_rules(vec![PolicyRule::new(
            "r-limit",
            "deny oversized requests",
            Condition::greater_than("llm.maxTokens", 1000i64),
            Action::deny("Request exceeds token limit"),
        )]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(report.valid, "violations: {:?}", report.violations);
    }

    #[test]
    fn conflicting_allow_and_deny_on_same_literal() {
        let policy = policy_with_rules(vec![
            PolicyRule::new(
                "r-allow",
                "allow gpt-4",
                Condition::equals("llm.model", "gpt-4"),
                Action::allow(),
            ),
            PolicyRule::new(
                "r-deny",
                "deny gpt-4",
                Condition::equals("llm.model", "gpt-4"),
                Action::deny("model under review"),
            ),
        ]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(report
            .violations
            .iter()
            .any(|v| v.code == "CONFLICTING_RULES"));
    }

    #[test]
    fn distinct_literals_do_not_conflict() {
        let policy = policy_with_rules(vec![
            PolicyRule::new(
                "r-allow",
                "allow gpt-4",
                Condition::equals("llm.model", "gpt-4"),
                Action::allow(),
            ),
            PolicyRule::new(
                "r-deny",
                "deny gpt-3.5",
                Condition::equals("llm.model", "gpt-3.5-turbo"),
                Action::deny("model retired"),
            ),
        ]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(!report
            .violations
            .iter()
            .any(|v| v.code == "CONFLICTING_RULES"));
    }

    #[test]
    fn security_policies_require_approval_on_enable() {
        let mut policy = policy_with_rules(vec![PolicyRule::new(
            "r-deny",
            "deny everything risky",
            Condition::equals("project.environment", "production"),
            Action::deny("blocked in production"),
        )]);
        policy.tags = vec!["security".into()];

        let report = GovernanceValidator::new().validate(&policy);
        assert!(report.requires_approval);
        assert_eq!(report.kind, PolicyKind::Security);
        assert_eq!(report.risk_level, RiskLevel::High);
    }

    #[test]
    fn absence_of_non_prod_tags_implies_production() {
        let policy = policy_with_rules(vec![PolicyRule::new(
            "r-allow",
            "allow",
            Condition::exists("llm.model"),
            Action::allow(),
        )]);
        assert!(is_production_scoped(&policy));

        let mut dev_policy = policy.clone();
        dev_policy.tags = vec!["dev".into()];
        assert!(!is_production_scoped(&dev_policy));
    }

    #[test]
    fn production_deny_requires_approval() {
        let policy = policy_with_rules(vec![PolicyRule::new(
            "r-deny",
            "deny oversized requests",
            Condition::greater_than("llm.maxTokens", 4000i64),
            Action::deny("too large"),
        )]);

        let report = GovernanceValidator::new().validate(&policy);
        assert!(report.requires_approval);
    }

    #[test]
    fn capacity_thresholds_escalate() {
        let validator = GovernanceValidator::new().with_capacity(CapacityThresholds {
            max_policies_per_namespace: 10,
            warning_threshold_percent: 70,
            critical_threshold_percent: 90,
        });
        assert!(validator.check_capacity("ns", 5).is_none());
        assert_eq!(
            validator.check_capacity("ns", 7).unwrap().code,
            "NAMESPACE_CAPACITY_WARNING"
        );
        assert_eq!(
            validator.check_capacity("ns", 9).unwrap().code,
            "NAMESPACE_CAPACITY_CRITICAL"
        );
    }
}
