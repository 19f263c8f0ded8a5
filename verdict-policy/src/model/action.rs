//! Rule actions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::violation::Violation;

/// The action a rule fires when its condition evaluates true.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Action {
    /// Permit the request.
    Allow {
        /// Optional explanation attached to the decision.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Reject the request. A reason is required by schema validation.
    Deny {
        /// Explanation surfaced to the caller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Permit the request while flagging it.
    Warn {
        /// Explanation surfaced to the caller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Permit the request after applying field modifications.
    Modify {
        /// Field-path to replacement-value map; must be non-empty.
        #[serde(default)]
        modifications: Map<String, Value>,
        /// Optional explanation attached to the decision.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Record the match without affecting the outcome.
    Log {
        /// Optional annotation for the log record.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Flag the request for rate limiting downstream.
    RateLimit {
        /// Optional explanation surfaced to the caller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Action {
    /// Allow action with no annotation.
    #[must_use]
    pub const fn allow() -> Self {
        Self::Allow { reason: None }
    }

    /// Deny action with the required reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: Some(reason.into()),
        }
    }

    /// Warn action with a reason.
    pub fn warn(reason: impl Into<String>) -> Self {
        Self::Warn {
            reason: Some(reason.into()),
        }
    }

    /// Modify action with the supplied field modifications.
    #[must_use]
    pub fn modify(modifications: Map<String, Value>) -> Self {
        Self::Modify {
            modifications,
            reason: None,
        }
    }

    /// Returns the annotation attached to the action, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow { reason }
            | Self::Deny { reason }
            | Self::Warn { reason }
            | Self::Modify { reason, .. }
            | Self::Log { reason }
            | Self::RateLimit { reason } => reason.as_deref(),
        }
    }

    /// Returns `true` for deny actions.
    #[must_use]
    pub const fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    /// Returns the wire label of the action's decision.
    #[must_use]
    pub const fn decision_label(&self) -> &'static str {
        match self {
            Self::Allow { .. } | Self::Log { .. } => "allow",
            Self::Deny { .. } => "deny",
            Self::Warn { .. } | Self::RateLimit { .. } => "warn",
            Self::Modify { .. } => "modify",
        }
    }

    pub(crate) fn validate_into(&self, path: &str, violations: &mut Vec<Violation>) {
        match self {
            Self::Deny { reason } => {
                if reason.as_deref().is_none_or(|r| r.trim().is_empty()) {
                    violations.push(Violation::error(
                        "MISSING_DENY_REASON",
                        "deny actions require a reason",
                        path,
                    ));
                }
            }
            Self::Modify { modifications, .. } => {
                if modifications.is_empty() {
                    violations.push(Violation::error(
                        "EMPTY_MODIFICATION",
                        "modify actions require at least one modification",
                        path,
                    ));
                }
            }
            _ => {}
        }
    }
}
