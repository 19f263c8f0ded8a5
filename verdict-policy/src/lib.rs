//! Policy corpus model, condition evaluation, and the decision engine.
//!
//! This crate is the evaluation substrate shared by every Verdict agent:
//! the typed policy document model with JSON and YAML ingest, the pure
//! condition evaluator, the snapshot-published policy engine, and the
//! fail-closed governance validator that gates mutations.

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod engine;
mod error;
mod eval;
mod governance;
mod model;

pub use context::{ContextBuilder, EvaluationContext};
pub use engine::{
    Decision, DecisionOutcome, EvaluationRequest, EvaluationTrace, MutationAction,
    MutationRecord, PolicyEngine, PolicyTrace, RuleTrace,
};
pub use error::{PolicyError, PolicyResult};
pub use eval::evaluate_condition;
pub use governance::{
    classify_policy, is_production_scoped, CapacityThresholds, GovernanceReport,
    GovernanceValidator, PolicyKind, RiskLevel,
};
pub use model::{
    Action, Condition, ConditionOperator, ConditionValue, Policy, PolicyBuilder, PolicyDocument,
    PolicyRule, PolicyStatus, Severity, Violation,
};
