//! Semantic validation of Datalog programs
//!
//! The [`SemanticChecker`] judges a parsed program well-formed: it
//! verifies declarations, clause shape, grounding, typing against the
//! lattice, stratification of negation and aggregation, aggregator
//! witness legality, and inlining safety. Diagnostics accumulate in the
//! translation unit's error report; the checker never aborts and leaves
//! the program unchanged apart from warning-suppression qualifiers.
//!
//! The [`ExecutionPlanChecker`] is a separate pass validating
//! user-supplied execution plan versions against the recursion
//! structure.

mod inlining;
mod plan;
mod semantic;
mod witness;

pub use plan::ExecutionPlanChecker;
pub use semantic::SemanticChecker;
