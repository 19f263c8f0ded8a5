//! The rule and policy engine.
//!
//! Readers evaluate against an immutable snapshot published behind an
//! `RwLock<Arc<_>>`; mutations validate fail-closed, publish a replacement
//! snapshot, and bump a generation counter consumed by the decision cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::eval::evaluate_condition;
use crate::governance::{GovernanceReport, GovernanceValidator};
use crate::model::{Action, Policy, PolicyStatus};
use verdict_primitives::NULL_HASH;

/// Outcome of a synthesised decision.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// The request may proceed unchanged.
    Allow,
    /// The request is rejected.
    Deny,
    /// The request may proceed but is flagged.
    Warn,
    /// The request may proceed after modifications are applied.
    Modify,
}

impl DecisionOutcome {
    /// Returns `true` when the request may proceed.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Deny)
    }

    /// Returns the wire label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Warn => "warn",
            Self::Modify => "modify",
        }
    }
}

/// Request handed to [`PolicyEngine::evaluate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Caller-assigned request identifier.
    pub request_id: String,
    /// Context the policies are evaluated against.
    pub context: EvaluationContext,
    /// Restricts evaluation to the listed policy ids when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_ids: Option<Vec<String>>,
    /// Evaluate without caching or side effects.
    #[serde(default)]
    pub dry_run: bool,
    /// Record a full per-rule trace.
    #[serde(default)]
    pub trace: bool,
}

impl EvaluationRequest {
    /// Creates a request with default flags.
    pub fn new(request_id: impl Into<String>, context: EvaluationContext) -> Self {
        Self {
            request_id: request_id.into(),
            context,
            policy_ids: None,
            dry_run: false,
            trace: false,
        }
    }

    /// Restricts evaluation to the supplied policy ids.
    #[must_use]
    pub fn with_policies(mut self, ids: Vec<String>) -> Self {
        self.policy_ids = Some(ids);
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enables trace recording.
    #[must_use]
    pub const fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// Synthesised decision with matched-rule provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    /// Dominant outcome across all policy contributions.
    pub outcome: DecisionOutcome,
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Matched policy ids in evaluation order.
    pub matched_policies: Vec<String>,
    /// Matched rule ids in evaluation order.
    pub matched_rules: Vec<String>,
    /// Reason copied from the contribution that dictated the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Merged modifications (right-biased on key collision).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub modifications: Map<String, Value>,
    /// Wall-clock evaluation duration in milliseconds.
    pub evaluation_time_ms: f64,
    /// Per-rule trace, present when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<EvaluationTrace>,
}

/// Trace of one evaluation across policies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvaluationTrace {
    /// Per-policy traces in evaluation order.
    pub policies: Vec<PolicyTrace>,
    /// Whether the decision was served from cache.
    #[serde(default)]
    pub cached: bool,
}

/// Trace of one policy's rule walk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyTrace {
    /// The traced policy.
    pub policy_id: String,
    /// Per-rule outcomes in declaration order.
    pub rules: Vec<RuleTrace>,
}

/// Trace of one rule evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleTrace {
    /// The traced rule.
    pub rule_id: String,
    /// Whether the rule was enabled at evaluation time.
    pub enabled: bool,
    /// Whether the condition matched (always false for disabled rules).
    pub matched: bool,
}

/// Audit action attached to a mutation record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// A new policy was created.
    Create,
    /// An existing policy's content changed.
    Edit,
    /// A policy became active.
    Enable,
    /// A policy left the active set.
    Disable,
    /// A policy was archived (soft delete).
    Delete,
    /// A prior version was archived during an update.
    VersionUpdate,
}

/// Outcome of a successful mutation, consumed by the audit chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MutationRecord {
    /// The mutated policy.
    pub policy_id: String,
    /// Policy content version after the mutation.
    pub policy_version: String,
    /// What happened.
    pub action: MutationAction,
    /// Identity that performed the mutation.
    pub actor: String,
    /// Content hash before the mutation (`"null"` for create).
    pub before_hash: String,
    /// Content hash after the mutation.
    pub after_hash: String,
    /// Internal version after the mutation.
    pub internal_version: u64,
    /// Governance report that admitted the mutation.
    pub governance: GovernanceReport,
}

#[derive(Default)]
struct Snapshot {
    policies: Vec<Arc<Policy>>,
}

impl Snapshot {
    fn find(&self, id: &str) -> Option<&Arc<Policy>> {
        self.policies.iter().find(|policy| policy.id == id)
    }
}

/// The policy engine: snapshot-published corpus plus pure evaluation.
pub struct PolicyEngine {
    snapshot: RwLock<Arc<Snapshot>>,
    generation: AtomicU64,
    mutation_lock: Mutex<()>,
    governance: GovernanceValidator,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    /// Creates an engine with an empty corpus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            generation: AtomicU64::new(0),
            mutation_lock: Mutex::new(()),
            governance: GovernanceValidator::new(),
        }
    }

    /// Replaces the governance validator (custom thresholds).
    #[must_use]
    pub fn with_governance(mut self, governance: GovernanceValidator) -> Self {
        self.governance = governance;
        self
    }

    /// Returns the current mutation generation. The decision cache compares
    /// this against the generation an entry was written under.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns the number of policies in the corpus (any status).
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.snapshot.read().policies.len()
    }

    /// Returns a policy by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Policy>> {
        self.snapshot.read().find(id).cloned()
    }

    /// Returns the ids of all active policies.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.snapshot
            .read()
            .policies
            .iter()
            .filter(|policy| policy.status.is_evaluated())
            .map(|policy| policy.id.clone())
            .collect()
    }

    /// Creates a new policy. Fails closed on structural or governance
    /// violations; fails if the id already exists.
    ///
    /// # Errors
    ///
    /// [`PolicyError::Invalid`], [`PolicyError::GovernanceRejected`], or a
    /// parse-level duplicate error.
    pub fn create(&self, mut policy: Policy, actor: &str) -> PolicyResult<MutationRecord> {
        let _guard = self.mutation_lock.lock();
        if self.snapshot.read().find(&policy.id).is_some() {
            return Err(PolicyError::parse(format!(
                "policy `{}` already exists",
                policy.id
            )));
        }

        let governance = self.admit(&policy)?;
        policy.internal_version = policy.internal_version.max(1);

        let active_in_namespace = self
            .snapshot
            .read()
            .policies
            .iter()
            .filter(|existing| {
                existing.status.is_evaluated() && existing.namespace == policy.namespace
            })
            .count();
        if let Some(finding) = self
            .governance
            .check_capacity(&policy.namespace, active_in_namespace + 1)
        {
            warn!(%finding, "namespace capacity pressure");
        }

        let record = MutationRecord {
            policy_id: policy.id.clone(),
            policy_version: policy.version.clone(),
            action: MutationAction::Create,
            actor: actor.to_owned(),
            before_hash: NULL_HASH.to_owned(),
            after_hash: policy.content_hash(),
            internal_version: policy.internal_version,
            governance,
        };

        self.publish(|policies| policies.push(Arc::new(policy)));
        info!(policy_id = %record.policy_id, actor, "policy created");
        Ok(record)
    }

    /// Updates an existing policy, bumping `internal_version`.
    ///
    /// # Errors
    ///
    /// [`PolicyError::NotFound`] when the id is unknown, otherwise the same
    /// failure modes as [`Self::create`].
    pub fn update(&self, mut policy: Policy, actor: &str) -> PolicyResult<MutationRecord> {
        let _guard = self.mutation_lock.lock();
        let previous = self
            .snapshot
            .read()
            .find(&policy.id)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound {
                id: policy.id.clone(),
            })?;

        let governance = self.admit(&policy)?;
        policy.internal_version = previous.internal_version + 1;
        policy.created_at = previous.created_at;

        let record = MutationRecord {
            policy_id: policy.id.clone(),
            policy_version: policy.version.clone(),
            action: MutationAction::Edit,
            actor: actor.to_owned(),
            before_hash: previous.content_hash(),
            after_hash: policy.content_hash(),
            internal_version: policy.internal_version,
            governance,
        };

        let id = policy.id.clone();
        let replacement = Arc::new(policy);
        self.publish(|policies| {
            if let Some(slot) = policies.iter_mut().find(|p| p.id == id) {
                *slot = Arc::clone(&replacement);
            }
        });
        info!(policy_id = %record.policy_id, actor, internal_version = record.internal_version, "policy updated");
        Ok(record)
    }

    /// Transitions a policy's status, emitting the matching audit action.
    ///
    /// # Errors
    ///
    /// [`PolicyError::NotFound`] for unknown ids; governance failure when
    /// the transition activates the policy.
    pub fn set_status(
        &self,
        id: &str,
        status: PolicyStatus,
        actor: &str,
    ) -> PolicyResult<MutationRecord> {
        let _guard = self.mutation_lock.lock();
        let previous = self
            .snapshot
            .read()
            .find(id)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound { id: id.to_owned() })?;

        let mut next = (*previous).clone();
        next.status = status;

        // Activation is the gate governance protects; leaving the active
        // set is always permitted.
        let governance = if status.is_evaluated() {
            self.admit(&next)?
        } else {
            self.governance.validate(&next)
        };

        next.internal_version = previous.internal_version + 1;
        let action = match status {
            PolicyStatus::Active => MutationAction::Enable,
            PolicyStatus::Archived => MutationAction::Delete,
            PolicyStatus::Draft | PolicyStatus::Deprecated => MutationAction::Disable,
        };

        let record = MutationRecord {
            policy_id: next.id.clone(),
            policy_version: next.version.clone(),
            action,
            actor: actor.to_owned(),
            before_hash: previous.content_hash(),
            after_hash: next.content_hash(),
            internal_version: next.internal_version,
            governance,
        };

        let replacement = Arc::new(next);
        self.publish(|policies| {
            if let Some(slot) = policies.iter_mut().find(|p| p.id == id) {
                *slot = Arc::clone(&replacement);
            }
        });
        info!(policy_id = %id, ?status, actor, "policy status changed");
        Ok(record)
    }

    fn admit(&self, policy: &Policy) -> PolicyResult<GovernanceReport> {
        let structural = policy.validate();
        if !structural.is_empty() {
            return Err(PolicyError::Invalid {
                violations: structural,
            });
        }

        let report = self.governance.validate(policy);
        if report.valid {
            Ok(report)
        } else {
            let reason = report
                .violations
                .iter()
                .filter(|violation| violation.is_blocking())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Err(PolicyError::GovernanceRejected {
                reason,
                violations: report.violations,
            })
        }
    }

    fn publish<F: FnOnce(&mut Vec<Arc<Policy>>)>(&self, mutate: F) {
        let mut guard = self.snapshot.write();
        let mut policies = guard.policies.clone();
        mutate(&mut policies);
        *guard = Arc::new(Snapshot { policies });
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Evaluates a request against the current snapshot. Pure with respect
    /// to the snapshot: two calls against the same snapshot and context
    /// produce identical decisions (modulo timing).
    #[must_use]
    pub fn evaluate(&self, request: &EvaluationRequest) -> Decision {
        let started = Instant::now();
        let snapshot = Arc::clone(&*self.snapshot.read());

        let mut selected: Vec<&Arc<Policy>> = snapshot
            .policies
            .iter()
            .filter(|policy| policy.status.is_evaluated())
            .filter(|policy| match &request.policy_ids {
                Some(ids) => ids.iter().any(|id| *id == policy.id),
                None => true,
            })
            .collect();

        // Deterministic order: priority desc, newer first, id as the final
        // tiebreak.
        selected.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut contributions: Vec<(&Arc<Policy>, &crate::model::PolicyRule)> = Vec::new();
        let mut trace = request.trace.then(EvaluationTrace::default);

        for &policy in &selected {
            let mut first_match: Option<&crate::model::PolicyRule> = None;
            let mut rule_traces = Vec::new();

            for rule in &policy.rules {
                if !rule.enabled {
                    if trace.is_some() {
                        rule_traces.push(RuleTrace {
                            rule_id: rule.id.clone(),
                            enabled: false,
                            matched: false,
                        });
                    }
                    continue;
                }

                // Only the first match contributes; later rules are walked
                // solely to populate the trace.
                if first_match.is_none() || trace.is_some() {
                    let matched = evaluate_condition(&rule.condition, &request.context);
                    if trace.is_some() {
                        rule_traces.push(RuleTrace {
                            rule_id: rule.id.clone(),
                            enabled: true,
                            matched,
                        });
                    }
                    if matched && first_match.is_none() {
                        first_match = Some(rule);
                        debug!(policy_id = %policy.id, rule_id = %rule.id, "rule matched");
                    }
                }
            }

            if let Some(traces) = trace.as_mut() {
                traces.policies.push(PolicyTrace {
                    policy_id: policy.id.clone(),
                    rules: rule_traces,
                });
            }
            if let Some(rule) = first_match {
                contributions.push((policy, rule));
            }
        }

        let mut decision = synthesise(&contributions);
        decision.trace = trace;
        decision.evaluation_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        decision
    }
}

fn synthesise(contributions: &[(&Arc<Policy>, &crate::model::PolicyRule)]) -> Decision {
    let matched_policies: Vec<String> = contributions
        .iter()
        .map(|(policy, _)| policy.id.clone())
        .collect();
    let matched_rules: Vec<String> = contributions
        .iter()
        .map(|(_, rule)| rule.id.clone())
        .collect();

    let first_where = |predicate: fn(&Action) -> bool| {
        contributions
            .iter()
            .find(|(_, rule)| predicate(&rule.action))
            .map(|(_, rule)| rule)
    };

    let (outcome, reason, modifications) = if let Some(rule) =
        first_where(|action| matches!(action, Action::Deny { .. }))
    {
        let reason = rule
            .action
            .reason()
            .map_or_else(|| format!("Denied by rule: {}", rule.name), ToOwned::to_owned);
        (DecisionOutcome::Deny, Some(reason), Map::new())
    } else if contributions
        .iter()
        .any(|(_, rule)| matches!(rule.action, Action::Modify { .. }))
    {
        // Right-bias: later policies overwrite earlier keys.
        let mut merged = Map::new();
        let mut reason = None;
        for (_, rule) in contributions {
            if let Action::Modify {
                modifications,
                reason: rule_reason,
            } = &rule.action
            {
                if reason.is_none() {
                    reason = rule_reason.clone();
                }
                for (key, value) in modifications {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        (DecisionOutcome::Modify, reason, merged)
    } else if let Some(rule) =
        first_where(|action| matches!(action, Action::Warn { .. } | Action::RateLimit { .. }))
    {
        (
            DecisionOutcome::Warn,
            rule.action.reason().map(ToOwned::to_owned),
            Map::new(),
        )
    } else if let Some(rule) =
        first_where(|action| matches!(action, Action::Allow { .. } | Action::Log { .. }))
    {
        (
            DecisionOutcome::Allow,
            rule.action.reason().map(ToOwned::to_owned),
            Map::new(),
        )
    } else {
        (
            DecisionOutcome::Allow,
            Some("no matching policy".to_owned()),
            Map::new(),
        )
    };

    Decision {
        allowed: outcome.is_allowed(),
        outcome,
        matched_policies,
        matched_rules,
        reason,
        modifications,
        evaluation_time_ms: 0.0,
        trace: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, PolicyRule};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn token_limit_policy() -> Policy {
        Policy::builder("p-tokens")
            .name("Token Limit")
            .namespace("llm-ops")
            .priority(100)
            .status(PolicyStatus::Active)
            .created_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
            .rule(PolicyRule::new(
                "r-limit",
                "deny oversized requests",
                Condition::greater_than("llm.maxTokens", 1000i64),
                Action::deny("Request exceeds token limit"),
            ))
            .build()
    }

    fn provider_allow_policy() -> Policy {
        Policy::builder("p-provider")
            .name("Provider Allow")
            .namespace("llm-ops")
            .priority(10)
            .status(PolicyStatus::Active)
            .created_at(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
            .rule(PolicyRule::new(
                "r-openai",
                "allow openai",
                Condition::equals("llm.provider", "openai"),
                Action::allow(),
            ))
            .build()
    }

    fn engine_with(policies: Vec<Policy>) -> PolicyEngine {
        let engine = PolicyEngine::new();
        for policy in policies {
            engine.create(policy, "tests").unwrap();
        }
        engine
    }

    fn context(max_tokens: u32) -> EvaluationContext {
        EvaluationContext::builder()
            .provider("openai")
            .model("gpt-4")
            .max_tokens(max_tokens)
            .build()
    }

    #[test]
    fn deny_dominates_allow() {
        let engine = engine_with(vec![token_limit_policy(), provider_allow_policy()]);
        let decision = engine.evaluate(&EvaluationRequest::new("req-1", context(2000)));

        assert_eq!(decision.outcome, DecisionOutcome::Deny);
        assert!(!decision.allowed);
        assert_eq!(decision.matched_policies, ["p-tokens", "p-provider"]);
        assert!(decision.reason.as_deref().unwrap().contains("token limit"));
    }

    #[test]
    fn allow_path_skips_non_matching_rules() {
        let engine = engine_with(vec![token_limit_policy(), provider_allow_policy()]);
        let decision = engine.evaluate(&EvaluationRequest::new("req-2", context(500)));

        assert_eq!(decision.outcome, DecisionOutcome::Allow);
        assert!(decision.matched_rules.contains(&"r-openai".to_owned()));
        assert!(!decision.matched_rules.contains(&"r-limit".to_owned()));
    }

    #[test]
    fn empty_corpus_allows_with_reason() {
        let engine = PolicyEngine::new();
        let decision =
            engine.evaluate(&EvaluationRequest::new("req-3", EvaluationContext::new()));

        assert_eq!(decision.outcome, DecisionOutcome::Allow);
        assert!(decision.matched_policies.is_empty());
        assert_eq!(decision.reason.as_deref(), Some("no matching policy"));
        assert!(decision.evaluation_time_ms >= 0.0);
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut policy = token_limit_policy();
        policy.rules[0].enabled = false;
        // A second rule keeps the policy structurally valid and observable.
        policy.rules.push(PolicyRule::new(
            "r-echo",
            "allow all",
            Condition::exists("llm.provider"),
            Action::allow(),
        ));
        let engine = engine_with(vec![policy]);
        let decision = engine.evaluate(&EvaluationRequest::new("req-4", context(2000)));

        assert!(decision.allowed);
        assert!(!decision.matched_rules.contains(&"r-limit".to_owned()));
    }

    #[test]
    fn modifications_merge_right_biased() {
        let older = Policy::builder("p-old")
            .name("Older")
            .namespace("llm-ops")
            .priority(50)
            .status(PolicyStatus::Active)
            .created_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
            .rule(PolicyRule::new(
                "r-cap-a",
                "cap tokens",
                Condition::exists("llm.model"),
                Action::modify(
                    json!({"llm.maxTokens": 1000, "llm.temperature": 0.5})
                        .as_object()
                        .unwrap()
                        .clone(),
                ),
            ))
            .build();
        let newer = Policy::builder("p-new")
            .name("Newer")
            .namespace("llm-ops")
            .priority(10)
            .status(PolicyStatus::Active)
            .created_at(Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap())
            .rule(PolicyRule::new(
                "r-cap-b",
                "cap tokens harder",
                Condition::exists("llm.model"),
                Action::modify(json!({"llm.maxTokens": 500}).as_object().unwrap().clone()),
            ))
            .build();

        let engine = engine_with(vec![older, newer]);
        let decision = engine.evaluate(&EvaluationRequest::new("req-5", context(2000)));

        assert_eq!(decision.outcome, DecisionOutcome::Modify);
        // p-old has higher priority and is processed first; p-new wins the
        // colliding key.
        assert_eq!(decision.modifications["llm.maxTokens"], json!(500));
        assert_eq!(decision.modifications["llm.temperature"], json!(0.5));
    }

    #[test]
    fn ordering_is_fully_deterministic() {
        let mut a = provider_allow_policy();
        a.id = "a".into();
        let mut b = provider_allow_policy();
        b.id = "b".into();
        b.created_at = a.created_at;
        b.priority = a.priority;

        let engine = engine_with(vec![b, a]);
        let decision = engine.evaluate(&EvaluationRequest::new("req-6", context(100)));
        assert_eq!(decision.matched_policies, ["a", "b"]);
    }

    #[test]
    fn restricting_set_limits_selection() {
        let engine = engine_with(vec![token_limit_policy(), provider_allow_policy()]);
        let request = EvaluationRequest::new("req-7", context(2000))
            .with_policies(vec!["p-provider".into()]);
        let decision = engine.evaluate(&request);

        assert_eq!(decision.outcome, DecisionOutcome::Allow);
        assert_eq!(decision.matched_policies, ["p-provider"]);
    }

    #[test]
    fn trace_records_every_enabled_rule() {
        let engine = engine_with(vec![token_limit_policy(), provider_allow_policy()]);
        let request = EvaluationRequest::new("req-8", context(2000)).with_trace(true);
        let decision = engine.evaluate(&request);

        let trace = decision.trace.unwrap();
        assert_eq!(trace.policies.len(), 2);
        assert!(trace.policies[0].rules[0].matched);
    }

    #[test]
    fn mutations_bump_generation_and_version() {
        let engine = PolicyEngine::new();
        let g0 = engine.generation();
        let record = engine.create(token_limit_policy(), "tests").unwrap();
        assert_eq!(record.action, MutationAction::Create);
        assert_eq!(record.before_hash, NULL_HASH);
        assert!(engine.generation() > g0);

        let mut updated = token_limit_policy();
        updated.priority = 5;
        let record = engine.update(updated, "tests").unwrap();
        assert_eq!(record.action, MutationAction::Edit);
        assert_eq!(record.internal_version, 2);
        assert_ne!(record.before_hash, record.after_hash);
    }

    #[test]
    fn governance_rejects_before_publishing() {
        let engine = PolicyEngine::new();
        let policy = Policy::builder("p-bad")
            .name("Credential deny")
            .namespace("llm-ops")
            .status(PolicyStatus::Active)
            .rule(PolicyRule::new(
                "r-pw",
                "deny password access",
                Condition::exists("user.password_hash"),
                Action::deny("credential access is forbidden"),
            ))
            .build();

        let err = engine.create(policy, "tests").unwrap_err();
        assert!(matches!(err, PolicyError::GovernanceRejected { .. }));
        assert_eq!(engine.policy_count(), 0);
    }

    #[test]
    fn archived_policies_leave_the_active_set() {
        let engine = engine_with(vec![token_limit_policy()]);
        engine
            .set_status("p-tokens", PolicyStatus::Archived, "tests")
            .unwrap();
        let decision = engine.evaluate(&EvaluationRequest::new("req-9", context(2000)));
        assert!(decision.allowed);
        assert!(engine.active_ids().is_empty());
    }
}
