//! Constraint conflict detection and resolution.
//!
//! Matched rules are reified as applied constraints; the solver finds
//! pairwise conflicts between them, picks a resolution strategy, and
//! computes the effective constraint set.

#![warn(missing_docs, clippy::pedantic)]

mod constraint;
mod solver;

pub use constraint::{AppliedConstraint, ConstraintScope, ConstraintType};
pub use solver::{
    ConflictType, ConstraintConflict, ConstraintSolver, ResolutionStrategy, SolverOutcome,
    SolverOutput,
};
