//! The canonical decision event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use verdict_primitives::{Environment, EventId, SpanId, TraceId};
use verdict_solver::AppliedConstraint;

/// Which agent produced a decision event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Primary policy evaluation by the enforcement agent.
    PolicyEnforcementDecision,
    /// Constraint conflict resolution by the solver agent.
    ConstraintResolution,
    /// Approval routing by the routing agent.
    ApprovalRoutingDecision,
}

impl DecisionType {
    /// Returns the wire label for the decision type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyEnforcementDecision => "policy_enforcement_decision",
            Self::ConstraintResolution => "constraint_resolution",
            Self::ApprovalRoutingDecision => "approval_routing_decision",
        }
    }
}

/// Where a decision happened in the distributed execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRef {
    /// Caller-assigned request identifier.
    pub request_id: String,
    /// Trace the decision belongs to.
    pub trace_id: TraceId,
    /// Span the decision was produced under.
    pub span_id: SpanId,
    /// Deployment environment.
    pub environment: Environment,
    /// Optional conversational or batch session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// The auditable record of one agent decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Unique event identifier.
    pub event_id: EventId,
    /// Identifier of the emitting agent.
    pub agent_id: String,
    /// Semantic version of the emitting agent.
    pub agent_version: String,
    /// Which agent family produced the event.
    pub decision_type: DecisionType,
    /// 16-hex-char fingerprint of the canonicalised inputs.
    pub inputs_hash: String,
    /// Agent-specific decision payload.
    pub outputs: Value,
    /// Confidence in `[0, 1]`; exactly 0 for error events.
    pub confidence: f64,
    /// Constraints evaluated while reaching the decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints_applied: Vec<AppliedConstraint>,
    /// Execution coordinates.
    pub execution_ref: ExecutionRef,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Open metadata map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DecisionEvent {
    /// Returns `true` when the event records a failed invocation.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.confidence == 0.0
    }
}
