//! Core shared types for the Verdict policy decision point.

#![warn(missing_docs, clippy::pedantic)]

mod canonical;
mod environment;
mod error;
mod fingerprint;
mod ids;

/// Canonical JSON rendering used for hashing and fingerprints.
pub use canonical::canonical_json;
/// Deployment environment tag embedded in execution references.
pub use environment::Environment;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Fingerprinting and content hashing helpers.
pub use fingerprint::{fingerprint, hash_full, policy_content_hash, NULL_HASH};
/// Identifier newtypes for events, spans, and traces.
pub use ids::{EventId, SpanId, TraceId};
