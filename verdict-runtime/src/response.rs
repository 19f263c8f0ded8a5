//! The wire response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use verdict_events::{DecisionEvent, ExecutionSpan};

/// Structured error body carried when `success` is false.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Creates an error body without details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The span tree produced by one invocation; always present.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The repo-level span.
    pub repo_span: ExecutionSpan,
    /// Agent spans under the repo span.
    pub agent_spans: Vec<ExecutionSpan>,
}

/// Response returned by every agent entry point: `data` xor `error`,
/// plus the execution report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// The decision event on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DecisionEvent>,
    /// The error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Span tree for this invocation.
    pub execution: ExecutionReport,
}

impl AgentResponse {
    /// Builds a success response, enforcing the span invariant: a
    /// successful invocation without a single agent span is converted
    /// into an `EXECUTION_INVARIANT_ERROR` failure.
    #[must_use]
    pub fn success(event: DecisionEvent, execution: ExecutionReport) -> Self {
        if execution.agent_spans.is_empty() {
            return Self::failure(
                ErrorBody::new(
                    "EXECUTION_INVARIANT_ERROR",
                    "no agent span was produced for a successful invocation",
                ),
                execution,
            );
        }
        Self {
            success: true,
            data: Some(event),
            error: None,
            execution,
        }
    }

    /// Builds a failure response.
    #[must_use]
    pub fn failure(error: ErrorBody, execution: ExecutionReport) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            execution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(with_agent: bool) -> ExecutionReport {
        let repo = ExecutionSpan::repo("verdict", "ext");
        let agent_spans = if with_agent {
            vec![ExecutionSpan::agent("verdict", "policy-enforcement", &repo)]
        } else {
            Vec::new()
        };
        ExecutionReport {
            repo_span: repo,
            agent_spans,
        }
    }

    fn event() -> DecisionEvent {
        use verdict_events::{DecisionType, ExecutionRef};
        use verdict_primitives::{Environment, SpanId, TraceId};
        verdict_events::DecisionEventBuilder::new(
            "policy-enforcement",
            "0.3.0",
            DecisionType::PolicyEnforcementDecision,
        )
        .build(ExecutionRef {
            request_id: "req".into(),
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            environment: Environment::Dev,
            session_id: None,
        })
    }

    #[test]
    fn success_without_agent_span_is_an_invariant_error() {
        let response = AgentResponse::success(event(), report(false));
        assert!(!response.success);
        assert_eq!(
            response.error.unwrap().code,
            "EXECUTION_INVARIANT_ERROR"
        );
        assert!(response.data.is_none());
    }

    #[test]
    fn success_with_agent_span_carries_data() {
        let response = AgentResponse::success(event(), report(true));
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn envelope_serialises_spans_without_loss() {
        let response = AgentResponse::success(event(), report(true));
        let json = serde_json::to_string(&response).unwrap();
        let parsed: AgentResponse = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.execution.agent_spans.len(), 1);
    }
}
