//! Assembly of decision events: fingerprinting and confidence scoring.

use chrono::Utc;
use serde_json::{Map, Value};

use verdict_primitives::{fingerprint, EventId};
use verdict_solver::AppliedConstraint;

use crate::event::{DecisionEvent, DecisionType, ExecutionRef};

/// Builds a [`DecisionEvent`] from evaluation results.
///
/// Confidence is multiplicative from 1.0: ×0.8 when no policy matched,
/// ×0.9 when constraint satisfaction was mixed, ×0.95 for modify
/// outcomes, ×0.9 for warn outcomes, clamped to `[0, 1]`. An error event
/// carries exactly 0.
#[derive(Debug)]
pub struct DecisionEventBuilder {
    agent_id: String,
    agent_version: String,
    decision_type: DecisionType,
    inputs_hash: String,
    outputs: Value,
    constraints: Vec<AppliedConstraint>,
    metadata: Map<String, Value>,
    no_policy_match: bool,
    outcome_label: Option<String>,
    error: Option<String>,
}

impl DecisionEventBuilder {
    /// Starts a builder for the given agent identity.
    pub fn new(
        agent_id: impl Into<String>,
        agent_version: impl Into<String>,
        decision_type: DecisionType,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_version: agent_version.into(),
            decision_type,
            inputs_hash: fingerprint(&Value::Null),
            outputs: Value::Null,
            constraints: Vec::new(),
            metadata: Map::new(),
            no_policy_match: false,
            outcome_label: None,
            error: None,
        }
    }

    /// Fingerprints the canonicalised inputs. Identical inputs always
    /// produce an identical hash regardless of key order.
    #[must_use]
    pub fn inputs(mut self, inputs: &Value) -> Self {
        self.inputs_hash = fingerprint(inputs);
        self
    }

    /// Sets the agent-specific output payload.
    #[must_use]
    pub fn outputs(mut self, outputs: Value) -> Self {
        self.outputs = outputs;
        self
    }

    /// Attaches the constraints evaluated for this decision.
    #[must_use]
    pub fn constraints(mut self, constraints: Vec<AppliedConstraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Records that no policy matched (reduces confidence).
    #[must_use]
    pub const fn no_policy_match(mut self, no_match: bool) -> Self {
        self.no_policy_match = no_match;
        self
    }

    /// Records the decision outcome label (modify/warn reduce confidence).
    #[must_use]
    pub fn outcome_label(mut self, label: impl Into<String>) -> Self {
        self.outcome_label = Some(label.into());
        self
    }

    /// Marks the event as an error event; confidence drops to 0 and the
    /// message lands in the outputs.
    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    fn confidence(&self) -> f64 {
        if self.error.is_some() {
            return 0.0;
        }
        let mut confidence = 1.0_f64;
        if self.no_policy_match {
            confidence *= 0.8;
        }
        let satisfied = self.constraints.iter().filter(|c| c.satisfied).count();
        if satisfied > 0 && satisfied < self.constraints.len() {
            confidence *= 0.9;
        }
        match self.outcome_label.as_deref() {
            Some("modify") => confidence *= 0.95,
            Some("warn") => confidence *= 0.9,
            _ => {}
        }
        confidence.clamp(0.0, 1.0)
    }

    /// Builds the event under the supplied execution reference.
    #[must_use]
    pub fn build(self, execution_ref: ExecutionRef) -> DecisionEvent {
        let confidence = self.confidence();
        let outputs = match self.error {
            Some(message) => match self.outputs {
                Value::Object(mut map) => {
                    map.insert("error".into(), Value::String(message));
                    Value::Object(map)
                }
                Value::Null => {
                    let mut map = Map::new();
                    map.insert("error".into(), Value::String(message));
                    Value::Object(map)
                }
                other => {
                    let mut map = Map::new();
                    map.insert("error".into(), Value::String(message));
                    map.insert("partial".into(), other);
                    Value::Object(map)
                }
            },
            None => self.outputs,
        };

        DecisionEvent {
            event_id: EventId::random(),
            agent_id: self.agent_id,
            agent_version: self.agent_version,
            decision_type: self.decision_type,
            inputs_hash: self.inputs_hash,
            outputs,
            confidence,
            constraints_applied: self.constraints,
            execution_ref,
            timestamp: Utc::now(),
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdict_policy::Severity;
    use verdict_primitives::{Environment, SpanId, TraceId};
    use verdict_solver::{ConstraintScope, ConstraintType};

    fn execution_ref() -> ExecutionRef {
        ExecutionRef {
            request_id: "req-1".into(),
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            environment: Environment::Dev,
            session_id: None,
        }
    }

    fn constraint(satisfied: bool) -> AppliedConstraint {
        AppliedConstraint {
            id: format!("c-{satisfied}"),
            name: "c".into(),
            constraint_type: ConstraintType::PolicyRule,
            severity: Severity::Info,
            scope: ConstraintScope::Global,
            satisfied,
            reason: None,
        }
    }

    fn builder() -> DecisionEventBuilder {
        DecisionEventBuilder::new(
            "policy-enforcement",
            "0.3.0",
            DecisionType::PolicyEnforcementDecision,
        )
    }

    #[test]
    fn identical_inputs_share_a_hash() {
        let a = builder()
            .inputs(&json!({"x": 1, "y": 2}))
            .build(execution_ref());
        let b = builder()
            .inputs(&json!({"y": 2, "x": 1}))
            .build(execution_ref());
        assert_eq!(a.inputs_hash, b.inputs_hash);
        assert_eq!(a.inputs_hash.len(), 16);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn no_match_reduces_confidence_to_point_eight() {
        let event = builder().no_policy_match(true).build(execution_ref());
        assert!((event.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn factors_multiply() {
        let event = builder()
            .no_policy_match(true)
            .outcome_label("warn")
            .build(execution_ref());
        assert!((event.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn mixed_constraints_reduce_confidence() {
        let event = builder()
            .constraints(vec![constraint(true), constraint(false)])
            .build(execution_ref());
        assert!((event.confidence - 0.9).abs() < 1e-9);

        let uniform = builder()
            .constraints(vec![constraint(true), constraint(true)])
            .build(execution_ref());
        assert!((uniform.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn error_events_carry_zero_confidence() {
        let event = builder()
            .outputs(json!({"outcome": "policy_deny"}))
            .error("record sink exploded")
            .build(execution_ref());
        assert_eq!(event.confidence, 0.0);
        assert!(event.is_error());
        assert_eq!(event.outputs["error"], "record sink exploded");
        assert_eq!(event.outputs["outcome"], "policy_deny");
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let event = builder()
            .no_policy_match(true)
            .outcome_label("modify")
            .constraints(vec![constraint(true), constraint(false)])
            .build(execution_ref());
        assert!(event.confidence > 0.0 && event.confidence <= 1.0);
    }
}
