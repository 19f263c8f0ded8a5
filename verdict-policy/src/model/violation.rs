//! Structured validation violations.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Severity attached to a violation or applied constraint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Worth surfacing; does not block.
    Warning,
    /// Blocks the mutation or marks the constraint violated.
    Error,
    /// Blocks and escalates the risk level.
    Critical,
}

/// One structural or governance finding about a policy document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable machine-readable code (e.g. `DUPLICATE_RULE_ID`).
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Document path the finding refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Violation {
    /// Creates a violation with the supplied severity.
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        path: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            path: Some(path.into()),
        }
    }

    /// Creates an error-severity violation.
    pub fn error(code: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(code, message, Severity::Error, path)
    }

    /// Creates a warning-severity violation.
    pub fn warning(
        code: impl Into<String>,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::new(code, message, Severity::Warning, path)
    }

    /// Creates a critical-severity violation.
    pub fn critical(
        code: impl Into<String>,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::new(code, message, Severity::Critical, path)
    }

    /// Returns `true` when the violation blocks a mutation.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {} at {}", self.code, self.message, path),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
