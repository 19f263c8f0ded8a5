//! The constraint solver.

use serde::{Deserialize, Serialize};
use tracing::debug;

use verdict_policy::Severity;

use crate::constraint::AppliedConstraint;

/// Kinds of conflicts between two applied constraints.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Constraints that cannot both hold.
    MutualExclusion,
    /// One side is satisfied while the other is violated.
    PriorityConflict,
    /// Two distinct constraints of the same type govern the same scope.
    ScopeOverlap,
    /// Constraints valid in disjoint time windows.
    TemporalConflict,
    /// Constraints competing for the same resource budget.
    ResourceContention,
}

/// Strategy applied to resolve conflicts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the most restrictive side of every conflict.
    MostRestrictive,
    /// Rank by severity and satisfaction.
    PriorityBased,
    /// Narrow overlapping scopes.
    ScopeNarrowing,
    /// A human has to resolve; conflicts stay unresolved.
    ManualRequired,
}

/// A detected conflict between two constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConflict {
    /// Deterministic identifier derived from both endpoints.
    pub id: String,
    /// Conflict classification.
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// First constraint id.
    pub first: String,
    /// Second constraint id.
    pub second: String,
    /// Max severity across the endpoints.
    pub severity: Severity,
    /// Whether the chosen strategy resolved the conflict.
    pub resolved: bool,
    /// Strategy used, set when resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
}

/// Overall outcome of one solver invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverOutcome {
    /// The input carried no constraints.
    NoConstraints,
    /// Every constraint is satisfied and nothing conflicted.
    ConstraintsSatisfied,
    /// Conflicts were found and all of them resolved.
    ConstraintsResolved,
    /// Some conflicts remain unresolved.
    PartialResolution,
    /// Violated constraints remain with nothing to resolve.
    ConstraintsViolated,
}

impl SolverOutcome {
    /// Returns the wire label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoConstraints => "no_constraints",
            Self::ConstraintsSatisfied => "constraints_satisfied",
            Self::ConstraintsResolved => "constraints_resolved",
            Self::PartialResolution => "partial_resolution",
            Self::ConstraintsViolated => "constraints_violated",
        }
    }
}

/// Full result of a solver invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverOutput {
    /// Outcome classification.
    pub outcome: SolverOutcome,
    /// The input constraints, unchanged.
    pub constraints: Vec<AppliedConstraint>,
    /// Detected conflicts with their resolution state.
    pub conflicts: Vec<ConstraintConflict>,
    /// Strategy chosen for this invocation, when conflicts existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
    /// Constraints still in force after resolution.
    pub effective: Vec<AppliedConstraint>,
    /// Number of conflicts the strategy resolved.
    pub conflicts_resolved: usize,
}

/// Detects and resolves conflicts between applied constraints.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintSolver {
    /// Forces every conflict to stay unresolved for human review.
    manual_only: bool,
}

impl ConstraintSolver {
    /// Creates a solver with automatic resolution.
    #[must_use]
    pub const fn new() -> Self {
        Self { manual_only: false }
    }

    /// Creates a solver that never auto-resolves.
    #[must_use]
    pub const fn manual() -> Self {
        Self { manual_only: true }
    }

    /// Runs conflict detection and resolution over the supplied
    /// constraints.
    #[must_use]
    pub fn solve(&self, constraints: Vec<AppliedConstraint>) -> SolverOutput {
        if constraints.is_empty() {
            return SolverOutput {
                outcome: SolverOutcome::NoConstraints,
                constraints,
                conflicts: Vec::new(),
                strategy: None,
                effective: Vec::new(),
                conflicts_resolved: 0,
            };
        }

        let mut conflicts = detect_conflicts(&constraints);
        let strategy = if conflicts.is_empty() {
            None
        } else if self.manual_only {
            Some(ResolutionStrategy::ManualRequired)
        } else {
            Some(select_strategy(&constraints, &conflicts))
        };

        let mut resolved_count = 0;
        if let Some(strategy) = strategy {
            for conflict in &mut conflicts {
                if strategy != ResolutionStrategy::ManualRequired {
                    conflict.resolved = true;
                    conflict.strategy = Some(strategy);
                    resolved_count += 1;
                }
            }
        }

        // Both endpoints of every unresolved conflict are removed from
        // the effective set; nothing in force may be ambiguous.
        let removed: Vec<&str> = conflicts
            .iter()
            .filter(|conflict| !conflict.resolved)
            .flat_map(|conflict| [conflict.first.as_str(), conflict.second.as_str()])
            .collect();
        let effective: Vec<AppliedConstraint> = constraints
            .iter()
            .filter(|constraint| !removed.contains(&constraint.id.as_str()))
            .cloned()
            .collect();

        let all_satisfied = constraints.iter().all(|constraint| constraint.satisfied);
        let any_unresolved = conflicts.iter().any(|conflict| !conflict.resolved);
        let outcome = if any_unresolved {
            SolverOutcome::PartialResolution
        } else if !conflicts.is_empty() {
            SolverOutcome::ConstraintsResolved
        } else if all_satisfied {
            SolverOutcome::ConstraintsSatisfied
        } else {
            SolverOutcome::ConstraintsViolated
        };

        debug!(
            total = constraints.len(),
            conflicts = conflicts.len(),
            resolved = resolved_count,
            ?outcome,
            "constraint resolution finished"
        );

        SolverOutput {
            outcome,
            constraints,
            conflicts,
            strategy,
            effective,
            conflicts_resolved: resolved_count,
        }
    }
}

fn detect_conflicts(constraints: &[AppliedConstraint]) -> Vec<ConstraintConflict> {
    let mut conflicts = Vec::new();
    for (i, a) in constraints.iter().enumerate() {
        for b in &constraints[i + 1..] {
            let conflict_type = if a.satisfied != b.satisfied {
                Some(ConflictType::PriorityConflict)
            } else if a.scope == b.scope && a.constraint_type == b.constraint_type && a.id != b.id
            {
                Some(ConflictType::ScopeOverlap)
            } else {
                None
            };

            if let Some(conflict_type) = conflict_type {
                conflicts.push(ConstraintConflict {
                    id: format!("{}|{}", a.id, b.id),
                    conflict_type,
                    first: a.id.clone(),
                    second: b.id.clone(),
                    severity: a.severity.max(b.severity),
                    resolved: false,
                    strategy: None,
                });
            }
        }
    }
    conflicts
}

fn select_strategy(
    constraints: &[AppliedConstraint],
    conflicts: &[ConstraintConflict],
) -> ResolutionStrategy {
    if constraints
        .iter()
        .any(|constraint| constraint.severity == Severity::Critical)
    {
        return ResolutionStrategy::MostRestrictive;
    }
    if conflicts
        .iter()
        .any(|conflict| conflict.conflict_type == ConflictType::PriorityConflict)
    {
        return ResolutionStrategy::PriorityBased;
    }
    if conflicts
        .iter()
        .any(|conflict| conflict.conflict_type == ConflictType::ScopeOverlap)
    {
        return ResolutionStrategy::ScopeNarrowing;
    }
    ResolutionStrategy::PriorityBased
}
