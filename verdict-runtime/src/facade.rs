//! Interfaces the core consumes from its host.
//!
//! Each capability is a trait, not a library: the host decides where
//! policies come from and where records and telemetry go. In-memory and
//! system implementations back tests and the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use verdict_events::{AuditEntry, DecisionEvent, ExecutionSpan};
use verdict_policy::Policy;

use crate::registration::AgentRegistration;

/// Where policies are loaded from at startup and reload.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Returns every active policy.
    async fn list_active(&self) -> Vec<Policy>;

    /// Finds one policy, optionally pinned to a content version.
    async fn find(&self, id: &str, version: Option<&str>) -> Option<Policy>;
}

/// Acknowledgement returned by the record sink.
#[derive(Clone, Debug)]
pub struct Ack {
    /// Whether the sink accepted the record.
    pub accepted: bool,
    /// Optional rejection reason.
    pub reason: Option<String>,
}

impl Ack {
    /// An accepting acknowledgement.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    /// A rejecting acknowledgement with a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Everything the record sink can absorb.
#[derive(Clone, Debug)]
pub enum RecordPayload {
    /// One decision event.
    Decision(DecisionEvent),
    /// One audit entry.
    Audit(AuditEntry),
    /// One agent registration.
    Registration(AgentRegistration),
}

/// Persists decisions, audit entries, and registrations. Best-effort: a
/// failing sink never alters the decision flowing back to the caller.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persists one record.
    async fn persist(&self, payload: RecordPayload) -> Ack;
}

/// Absorbs spans and events for observability. Same best-effort contract
/// as the record sink.
pub trait TelemetrySink: Send + Sync {
    /// Exports a finished span.
    fn emit_span(&self, span: &ExecutionSpan);

    /// Exports an emitted decision event.
    fn emit_event(&self, event: &DecisionEvent);
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Identifier source for events and spans.
pub trait IdSource: Send + Sync {
    /// Returns a fresh UUIDv4.
    fn next_id(&self) -> Uuid;
}

/// System wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Random UUIDv4 source.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Policy source backed by a static list.
#[derive(Debug, Default)]
pub struct InMemoryPolicySource {
    policies: Vec<Policy>,
}

impl InMemoryPolicySource {
    /// Creates a source over the supplied policies.
    #[must_use]
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl PolicySource for InMemoryPolicySource {
    async fn list_active(&self) -> Vec<Policy> {
        self.policies
            .iter()
            .filter(|policy| policy.status.is_evaluated())
            .cloned()
            .collect()
    }

    async fn find(&self, id: &str, version: Option<&str>) -> Option<Policy> {
        self.policies
            .iter()
            .find(|policy| {
                policy.id == id && version.is_none_or(|version| policy.version == version)
            })
            .cloned()
    }
}

/// Record sink that collects payloads in memory (tests, CLI).
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    records: RwLock<Vec<RecordPayload>>,
}

impl InMemoryRecordSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything persisted so far.
    #[must_use]
    pub fn records(&self) -> Vec<RecordPayload> {
        self.records.read().clone()
    }

    /// Returns the persisted decision events.
    #[must_use]
    pub fn decisions(&self) -> Vec<DecisionEvent> {
        self.records
            .read()
            .iter()
            .filter_map(|payload| match payload {
                RecordPayload::Decision(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the persisted audit entries.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.records
            .read()
            .iter()
            .filter_map(|payload| match payload {
                RecordPayload::Audit(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn persist(&self, payload: RecordPayload) -> Ack {
        self.records.write().push(payload);
        Ack::accepted()
    }
}

/// Telemetry sink that logs through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit_span(&self, span: &ExecutionSpan) {
        debug!(
            span_id = %span.span_id,
            parent = %span.parent_span_id,
            kind = ?span.span_type,
            status = ?span.status,
            "span finalised"
        );
    }

    fn emit_event(&self, event: &DecisionEvent) {
        info!(
            event_id = %event.event_id,
            agent = %event.agent_id,
            decision_type = ?event.decision_type,
            confidence = event.confidence,
            "decision event emitted"
        );
    }
}
