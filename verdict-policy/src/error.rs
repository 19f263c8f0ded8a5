//! Error definitions for the policy crate.

use thiserror::Error;

use crate::model::Violation;

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors surfaced by parsing, validation, and engine mutations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The document could not be parsed at all.
    #[error("policy parse error: {message}")]
    Parse {
        /// Human-readable parser diagnostic.
        message: String,
    },

    /// The document parsed but failed schema validation.
    #[error("policy validation failed with {} violation(s)", violations.len())]
    Invalid {
        /// Structural violations found in the document.
        violations: Vec<Violation>,
    },

    /// The governance validator rejected a mutation.
    #[error("governance rejected mutation: {reason}")]
    GovernanceRejected {
        /// Summary of the dominating violation.
        reason: String,
        /// Full violation list from the validator.
        violations: Vec<Violation>,
    },

    /// A referenced policy does not exist in the active corpus.
    #[error("policy not found: {id}")]
    NotFound {
        /// The missing policy identifier.
        id: String,
    },

    /// File I/O failure while loading a policy document.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    /// Creates a parse error from any displayable diagnostic.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Returns the violations attached to this error, if any.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations } | Self::GovernanceRejected { violations, .. } => {
                violations
            }
            _ => &[],
        }
    }
}
