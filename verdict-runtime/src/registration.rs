//! Agent registration metadata.

use serde::{Deserialize, Serialize};

use verdict_events::DecisionType;

/// Metadata identifying one agent to the record sink and the CLI `info`
/// surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    /// Stable agent identifier.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Semantic version of the running build.
    pub version: String,
    /// Decision types the agent emits.
    pub decision_types: Vec<DecisionType>,
}

impl AgentRegistration {
    /// Registration for the policy enforcement agent.
    #[must_use]
    pub fn enforcement() -> Self {
        Self {
            agent_id: "policy-enforcement-agent".into(),
            name: "Policy Enforcement Agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            decision_types: vec![DecisionType::PolicyEnforcementDecision],
        }
    }

    /// Registration for the constraint solver agent.
    #[must_use]
    pub fn solver() -> Self {
        Self {
            agent_id: "constraint-solver-agent".into(),
            name: "Constraint Solver Agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            decision_types: vec![DecisionType::ConstraintResolution],
        }
    }

    /// Registration for the approval routing agent.
    #[must_use]
    pub fn routing() -> Self {
        Self {
            agent_id: "approval-routing-agent".into(),
            name: "Approval Routing Agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            decision_types: vec![DecisionType::ApprovalRoutingDecision],
        }
    }

    /// Registrations for every agent this runtime hosts.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::enforcement(), Self::solver(), Self::routing()]
    }
}
