//! The Verdict runtime: three agents over one evaluation substrate.
//!
//! [`PolicyDecisionPoint`] wires the policy engine, constraint solver,
//! approval router, decision cache, and audit chain behind the façade
//! interfaces its host supplies (policy source, record sink, telemetry
//! sink). Every agent invocation emits exactly one decision event and a
//! repo/agent span pair, succeed or fail.

#![warn(missing_docs, clippy::pedantic)]

mod agents;
mod execution;
mod facade;
mod registration;
mod response;

pub use agents::{PolicyDecisionPoint, PolicyEnforcementOutcome};
pub use execution::{
    ExecutionContext, ExecutionError, CORRELATION_ID_HEADER, EXECUTION_ID_HEADER,
    PARENT_SPAN_ID_HEADER, SESSION_ID_HEADER,
};
pub use facade::{
    Ack, Clock, IdSource, InMemoryPolicySource, InMemoryRecordSink, PolicySource, RecordPayload,
    RecordSink, SystemClock, TelemetrySink, TracingTelemetrySink, UuidIdSource,
};
pub use registration::AgentRegistration;
pub use response::{AgentResponse, ErrorBody, ExecutionReport};
