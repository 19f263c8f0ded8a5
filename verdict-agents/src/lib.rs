//! Verdict decision-point SDK facade.
//!
//! Depend on this crate via `cargo add verdict-agents`. It bundles the
//! workspace crates behind feature flags so hosts can enable only the
//! components they embed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use verdict_primitives as primitives;

/// Policy model, evaluator, engine, and governance (enabled by `policy`).
#[cfg(feature = "policy")]
pub use verdict_policy as policy;

/// Constraint solving (enabled by `solver`).
#[cfg(feature = "solver")]
pub use verdict_solver as solver;

/// Approval routing (enabled by `approvals`).
#[cfg(feature = "approvals")]
pub use verdict_approvals as approvals;

/// Decision events, spans, and the audit chain (enabled by `events`).
#[cfg(feature = "events")]
pub use verdict_events as events;

/// Decision cache (enabled by `cache`).
#[cfg(feature = "cache")]
pub use verdict_cache as cache;

/// Configuration (enabled by `config`).
#[cfg(feature = "config")]
pub use verdict_config as config;

/// The three agents and the integration façade (enabled by `runtime`).
#[cfg(feature = "runtime")]
pub use verdict_runtime as runtime;
