//! Shared error definitions for decision-point primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed.
    #[error("invalid identifier: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// An environment label was not one of the recognised values.
    #[error("unknown environment `{value}`")]
    UnknownEnvironment {
        /// The offending label.
        value: String,
    },

    /// A value could not be rendered canonically.
    #[error("value cannot be canonicalised: {reason}")]
    NotCanonicalisable {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
