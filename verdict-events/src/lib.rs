//! Decision events, execution spans, and the audit chain.
//!
//! Every agent invocation produces exactly one [`DecisionEvent`]: a
//! hash-fingerprinted, confidence-scored record of how a decision was
//! reached. Spans capture the causal call tree around it, and the audit
//! chain records every policy mutation with verifiable before/after
//! hashes.

#![warn(missing_docs, clippy::pedantic)]

mod audit;
mod builder;
mod event;
mod span;

pub use audit::{AuditChainReport, AuditEntry, AuditStore, ChainGap, InMemoryAuditStore};
pub use builder::DecisionEventBuilder;
pub use event::{DecisionEvent, DecisionType, ExecutionRef};
pub use span::{Artifact, ExecutionSpan, SpanError, SpanStatus, SpanType};
