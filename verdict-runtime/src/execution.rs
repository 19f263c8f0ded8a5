//! Orchestrator execution-context contract.
//!
//! Externally-invoked entry points carry the umbrella execution id and
//! parent span id as headers; both are required. The correlation id is
//! generated when absent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the umbrella execution id.
pub const EXECUTION_ID_HEADER: &str = "x-execution-id";
/// Header carrying the orchestrator's parent span id.
pub const PARENT_SPAN_ID_HEADER: &str = "x-parent-span-id";
/// Optional header carrying the request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// Optional header carrying the session id.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Errors raised while establishing the execution context.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A required orchestrator header is missing.
    #[error("missing required header `{header}`")]
    MissingHeader {
        /// The absent header name.
        header: &'static str,
    },
}

impl ExecutionError {
    /// Returns the wire error code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingHeader { .. } => "EXECUTION_CONTEXT_ERROR",
        }
    }
}

/// The umbrella execution one agent invocation belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Orchestrator-assigned execution id.
    pub execution_id: String,
    /// Orchestrator span the repo span hangs under.
    pub parent_span_id: String,
    /// Correlation id; generated when the caller omits it.
    pub correlation_id: String,
    /// Optional session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ExecutionContext {
    /// Creates a context directly (tests, CLI).
    pub fn new(execution_id: impl Into<String>, parent_span_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            parent_span_id: parent_span_id.into(),
            correlation_id: Uuid::new_v4().to_string(),
            session_id: None,
        }
    }

    /// Builds a context from orchestrator headers (lowercase keys).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::MissingHeader`] when `x-execution-id` or
    /// `x-parent-span-id` is absent or empty.
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, ExecutionError> {
        let required = |header: &'static str| -> Result<String, ExecutionError> {
            headers
                .get(header)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or(ExecutionError::MissingHeader { header })
        };

        Ok(Self {
            execution_id: required(EXECUTION_ID_HEADER)?,
            parent_span_id: required(PARENT_SPAN_ID_HEADER)?,
            correlation_id: headers
                .get(CORRELATION_ID_HEADER)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            session_id: headers.get(SESSION_ID_HEADER).cloned(),
        })
    }
}
