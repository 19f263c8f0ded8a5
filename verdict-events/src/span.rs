//! Execution spans: the causal call tree around a decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use verdict_primitives::SpanId;

/// Level of a span in the tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    /// Wraps one inbound call into this repository.
    Repo,
    /// Wraps one agent invocation under a repo span.
    Agent,
}

/// Lifecycle status of a span.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Work in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Errors raised by span lifecycle operations.
#[derive(Debug, Error)]
pub enum SpanError {
    /// The span already left the running state.
    #[error("span {span_id} already finalised as {status:?}")]
    AlreadyFinalised {
        /// The offending span.
        span_id: SpanId,
        /// Its terminal status.
        status: SpanStatus,
    },
}

/// An opaque artifact produced under a span.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact identifier.
    pub id: String,
    /// Artifact kind (e.g. `decision_event`, `audit_entry`).
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// Opaque reference: id, URI, or hash.
    pub reference: String,
    /// Span that produced the artifact.
    pub producer_span_id: SpanId,
}

/// One node in the causal call tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionSpan {
    /// Tree level.
    #[serde(rename = "type")]
    pub span_type: SpanType,
    /// This span's identifier.
    pub span_id: SpanId,
    /// Parent identifier: the orchestrator's span for repo spans, the
    /// repo span for agent spans.
    pub parent_span_id: String,
    /// Repository the span runs in.
    pub repo_name: String,
    /// Agent name; present exactly when `span_type` is `Agent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Lifecycle status.
    pub status: SpanStatus,
    /// When the span started.
    pub start_time: DateTime<Utc>,
    /// When the span finished; always `>= start_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Artifacts produced under this span.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    /// Failure detail when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSpan {
    /// Opens a repo-level span under the orchestrator's parent span.
    pub fn repo(repo_name: impl Into<String>, parent_span_id: impl Into<String>) -> Self {
        Self {
            span_type: SpanType::Repo,
            span_id: SpanId::random(),
            parent_span_id: parent_span_id.into(),
            repo_name: repo_name.into(),
            agent_name: None,
            status: SpanStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Opens an agent-level span under a repo span.
    pub fn agent(
        repo_name: impl Into<String>,
        agent_name: impl Into<String>,
        parent: &ExecutionSpan,
    ) -> Self {
        Self {
            span_type: SpanType::Agent,
            span_id: SpanId::random(),
            parent_span_id: parent.span_id.to_string(),
            repo_name: repo_name.into(),
            agent_name: Some(agent_name.into()),
            status: SpanStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Returns `true` while the span is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.status, SpanStatus::Running)
    }

    /// Finalises the span as completed.
    ///
    /// # Errors
    ///
    /// Returns [`SpanError::AlreadyFinalised`] when the span left the
    /// running state earlier.
    pub fn complete(&mut self) -> Result<(), SpanError> {
        self.finalise(SpanStatus::Completed, None)
    }

    /// Finalises the span as failed with an error message.
    ///
    /// # Errors
    ///
    /// Returns [`SpanError::AlreadyFinalised`] when the span left the
    /// running state earlier.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), SpanError> {
        self.finalise(SpanStatus::Failed, Some(error.into()))
    }

    fn finalise(&mut self, status: SpanStatus, error: Option<String>) -> Result<(), SpanError> {
        if !self.is_running() {
            return Err(SpanError::AlreadyFinalised {
                span_id: self.span_id,
                status: self.status,
            });
        }
        self.status = status;
        self.error = error;
        let now = Utc::now();
        self.end_time = Some(now.max(self.start_time));
        Ok(())
    }

    /// Attaches an artifact; only live spans accept artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`SpanError::AlreadyFinalised`] after finalisation.
    pub fn attach_artifact(
        &mut self,
        artifact_type: impl Into<String>,
        reference: impl Into<String>,
    ) -> Result<(), SpanError> {
        if !self.is_running() {
            return Err(SpanError::AlreadyFinalised {
                span_id: self.span_id,
                status: self.status,
            });
        }
        let id = format!("artifact-{}", self.artifacts.len() + 1);
        self.artifacts.push(Artifact {
            id,
            artifact_type: artifact_type.into(),
            reference: reference.into(),
            producer_span_id: self.span_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_and_agent_spans_link_up() {
        let repo = ExecutionSpan::repo("verdict", "ext-span-1");
        let agent = ExecutionSpan::agent("verdict", "policy-enforcement", &repo);

        assert_eq!(repo.parent_span_id, "ext-span-1");
        assert_eq!(agent.parent_span_id, repo.span_id.to_string());
        assert_eq!(agent.agent_name.as_deref(), Some("policy-enforcement"));
        assert_eq!(agent.span_type, SpanType::Agent);
    }

    #[test]
    fn completion_sets_a_consistent_end_time() {
        let mut span = ExecutionSpan::repo("verdict", "ext");
        span.complete().unwrap();
        assert_eq!(span.status, SpanStatus::Completed);
        assert!(span.end_time.unwrap() >= span.start_time);
    }

    #[test]
    fn finalised_spans_reject_further_transitions() {
        let mut span = ExecutionSpan::repo("verdict", "ext");
        span.fail("boom").unwrap();
        assert!(span.complete().is_err());
        assert_eq!(span.error.as_deref(), Some("boom"));
    }

    #[test]
    fn artifacts_attach_only_while_running() {
        let mut span = ExecutionSpan::repo("verdict", "ext");
        span.attach_artifact("decision_event", "evt-1").unwrap();
        span.complete().unwrap();
        assert!(span.attach_artifact("decision_event", "evt-2").is_err());
        assert_eq!(span.artifacts.len(), 1);
        assert_eq!(span.artifacts[0].producer_span_id, span.span_id);
    }

    #[test]
    fn spans_serialise_without_loss() {
        let mut span = ExecutionSpan::repo("verdict", "ext");
        span.attach_artifact("audit_entry", "audit-1").unwrap();
        span.complete().unwrap();

        let json = serde_json::to_string(&span).unwrap();
        let parsed: ExecutionSpan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.span_id, span.span_id);
        assert_eq!(parsed.artifacts.len(), 1);
        assert_eq!(parsed.status, SpanStatus::Completed);
    }
}
