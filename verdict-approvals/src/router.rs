//! The approval router.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use verdict_policy::{evaluate_condition, EvaluationContext};

use crate::chain::{merge_escalations, ApprovalStep, EscalationLevel};
use crate::rule::{
    ApprovalRule, AutoApproveConditions, MatchCombinator, Requester, RequestPriority,
};

/// Priority at or above which a justification must accompany the action.
const JUSTIFICATION_PRIORITY: i32 = 80;

/// Closed set of routing outcomes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// A chain must be walked before the action proceeds.
    ApprovalRequired,
    /// An auto-approve condition was satisfied; no chain.
    AutoApproved,
    /// High-urgency request; the chain starts escalated.
    EscalationRequired,
    /// No rule governs the action; approval is not needed.
    ApprovalBypassed,
    /// An approval request exists and is awaiting responses.
    PendingApproval,
}

impl ApprovalOutcome {
    /// Returns the wire label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApprovalRequired => "approval_required",
            Self::AutoApproved => "auto_approved",
            Self::EscalationRequired => "escalation_required",
            Self::ApprovalBypassed => "approval_bypassed",
            Self::PendingApproval => "pending_approval",
        }
    }
}

/// Status of a previously created approval request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting approver responses.
    Pending,
    /// Approved by the chain.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// The chain timed out without resolution.
    Expired,
}

/// Lookup contract for approval request state. Approval state lives with
/// the external approval collaborator; the router only defines the
/// interface.
pub trait ApprovalStatusSource: Send + Sync {
    /// Returns the status of an approval request, or `None` when the
    /// request is unknown.
    fn status(&self, approval_request_id: &str) -> Option<ApprovalStatus>;
}

/// One routing request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// The action context rules are matched against. Conventional fields:
    /// `resource_type`, `operation`, and `details.value`.
    pub context: EvaluationContext,
    /// Who is asking.
    pub requester: Requester,
    /// Caller-declared urgency.
    #[serde(default)]
    pub priority: RequestPriority,
    /// Restricts matching to the listed rule ids when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_filter: Option<Vec<String>>,
}

impl RoutingRequest {
    /// Creates a normal-priority request.
    #[must_use]
    pub fn new(context: EvaluationContext, requester: Requester) -> Self {
        Self {
            context,
            requester,
            priority: RequestPriority::Normal,
            rule_filter: None,
        }
    }

    /// Sets the urgency.
    #[must_use]
    pub const fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts matching to the supplied rule ids.
    #[must_use]
    pub fn with_rule_filter(mut self, ids: Vec<String>) -> Self {
        self.rule_filter = Some(ids);
        self
    }
}

/// Result of one routing decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingOutput {
    /// Outcome classification.
    pub outcome: ApprovalOutcome,
    /// Ordered approval chain (empty for auto-approved and bypassed).
    pub chain: Vec<ApprovalStep>,
    /// Merged escalation ladder across matched rules.
    pub escalation: Vec<EscalationLevel>,
    /// Ids of matched rules, highest priority first.
    pub rules_matched: Vec<String>,
    /// Sum of step and escalation timeouts.
    pub total_timeout_seconds: u64,
    /// Whether a justification must accompany the action.
    pub justification_required: bool,
    /// Heuristic risk score in `[0, 100]`.
    pub risk_score: u32,
}

/// Routes policy-gated actions to approval chains.
#[derive(Clone, Debug, Default)]
pub struct ApprovalRouter {
    rules: Vec<ApprovalRule>,
    /// Offset applied to UTC before business-hours checks.
    utc_offset_hours: i8,
}

impl ApprovalRouter {
    /// Creates a router over the supplied rules with no UTC offset.
    #[must_use]
    pub fn new(rules: Vec<ApprovalRule>) -> Self {
        Self {
            rules,
            utc_offset_hours: 0,
        }
    }

    /// Sets the UTC offset used for business-hours auto-approval.
    #[must_use]
    pub const fn with_utc_offset(mut self, hours: i8) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn rules(&self) -> &[ApprovalRule] {
        &self.rules
    }

    /// Routes a request using the current wall clock.
    #[must_use]
    pub fn route(&self, request: &RoutingRequest) -> RoutingOutput {
        self.route_at(request, Utc::now())
    }

    /// Routes a request against an explicit instant (tests, replays).
    #[must_use]
    pub fn route_at(&self, request: &RoutingRequest, now: DateTime<Utc>) -> RoutingOutput {
        let mut matched: Vec<&ApprovalRule> = self
            .rules
            .iter()
            .filter(|rule| rule.active)
            .filter(|rule| match &request.rule_filter {
                Some(ids) => ids.iter().any(|id| *id == rule.id),
                None => true,
            })
            .filter(|rule| rule_matches(rule, &request.context))
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let rules_matched: Vec<String> = matched.iter().map(|rule| rule.id.clone()).collect();
        let justification_required = matched
            .iter()
            .any(|rule| rule.priority >= JUSTIFICATION_PRIORITY);
        let risk_score = risk_score(&request.context, &matched);

        let auto_approved = matched.iter().any(|rule| {
            rule.auto_approve
                .as_ref()
                .is_some_and(|auto| auto_approves(auto, request, self.utc_offset_hours, now))
        });
        if auto_approved {
            debug!(requester = %request.requester.id, "action auto-approved");
            return RoutingOutput {
                outcome: ApprovalOutcome::AutoApproved,
                chain: Vec::new(),
                escalation: Vec::new(),
                rules_matched,
                total_timeout_seconds: 0,
                justification_required,
                risk_score,
            };
        }

        if matched.is_empty() {
            return RoutingOutput {
                outcome: ApprovalOutcome::ApprovalBypassed,
                chain: Vec::new(),
                escalation: Vec::new(),
                rules_matched,
                total_timeout_seconds: 0,
                justification_required: false,
                risk_score,
            };
        }

        let chain: Vec<ApprovalStep> = matched
            .iter()
            .filter_map(|rule| ApprovalStep::from_rule(rule))
            .collect();
        let escalation = merge_escalations(&matched);
        let total_timeout_seconds = chain
            .iter()
            .map(|step| step.timeout_seconds)
            .chain(escalation.iter().map(|level| level.timeout_seconds))
            .sum();

        let outcome = if request.priority.forces_escalation() {
            ApprovalOutcome::EscalationRequired
        } else {
            ApprovalOutcome::ApprovalRequired
        };

        debug!(
            requester = %request.requester.id,
            rules = rules_matched.len(),
            steps = chain.len(),
            ?outcome,
            "approval chain constructed"
        );

        RoutingOutput {
            outcome,
            chain,
            escalation,
            rules_matched,
            total_timeout_seconds,
            justification_required,
            risk_score,
        }
    }
}

fn rule_matches(rule: &ApprovalRule, context: &EvaluationContext) -> bool {
    match rule.combinator {
        MatchCombinator::All => rule
            .conditions
            .iter()
            .all(|condition| evaluate_condition(condition, context)),
        MatchCombinator::Any => rule
            .conditions
            .iter()
            .any(|condition| evaluate_condition(condition, context)),
    }
}

/// Runs the ordered auto-approve checks; the first satisfied check wins.
fn auto_approves(
    auto: &AutoApproveConditions,
    request: &RoutingRequest,
    utc_offset_hours: i8,
    now: DateTime<Utc>,
) -> bool {
    if !auto.allowed_roles.is_empty()
        && request
            .requester
            .roles
            .iter()
            .any(|role| auto.allowed_roles.contains(role))
    {
        return true;
    }

    if !auto.allowed_resource_types.is_empty() {
        if let Some(resource_type) = request
            .context
            .resolve("resource_type")
            .and_then(|value| value.as_str())
        {
            if auto
                .allowed_resource_types
                .iter()
                .any(|allowed| allowed == resource_type)
            {
                return true;
            }
        }
    }

    if !auto.allowed_operations.is_empty() {
        if let Some(operation) = request
            .context
            .resolve("operation")
            .and_then(|value| value.as_str())
        {
            if auto
                .allowed_operations
                .iter()
                .any(|allowed| allowed == operation)
            {
                return true;
            }
        }
    }

    if let Some(max_value) = auto.max_value {
        if let Some(value) = request
            .context
            .resolve("details.value")
            .and_then(serde_json::Value::as_f64)
        {
            if value <= max_value {
                return true;
            }
        }
    }

    if let Some(window) = &auto.time_restrictions {
        let local = now + Duration::hours(i64::from(utc_offset_hours));
        let hour = u8::try_from(local.hour()).unwrap_or(0);
        let weekday = u8::try_from(local.weekday().num_days_from_monday()).unwrap_or(0);
        let day_ok = window.days.is_empty() || window.days.contains(&weekday);
        if day_ok && hour >= window.start_hour && hour < window.end_hour {
            return true;
        }
    }

    false
}

fn risk_score(context: &EvaluationContext, matched: &[&ApprovalRule]) -> u32 {
    let operation = context
        .resolve("operation")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    let operation_weight: u32 = match operation {
        "delete" => 30,
        "execute" => 25,
        "update" => 20,
        "create" => 15,
        _ => 0,
    };

    let priority_sum: u32 = matched
        .iter()
        .map(|rule| u32::try_from(rule.priority.max(0)).unwrap_or(0) / 10)
        .sum();
    let matched_weight = u32::try_from(matched.len()).unwrap_or(u32::MAX).saturating_mul(10);

    (operation_weight + matched_weight + priority_sum).min(100)
}
