//! Approval routing for policy-gated actions.
//!
//! Decides whether an action needs human approval, whether it can be
//! auto-approved, and constructs the approval chain with escalation
//! ladders when it cannot.

#![warn(missing_docs, clippy::pedantic)]

mod chain;
mod router;
mod rule;

pub use chain::{ApprovalStep, EscalationLevel, StepType};
pub use router::{
    ApprovalOutcome, ApprovalRouter, ApprovalStatus, ApprovalStatusSource, RoutingOutput,
    RoutingRequest,
};
pub use rule::{
    ApprovalRule, ApprovalRuleError, Approver, AutoApproveConditions, EscalationConfig,
    MatchCombinator, Requester, RequestPriority, TimeRestrictions,
};
