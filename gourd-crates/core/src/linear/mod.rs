//! The incremental propagation engine for enforcement-guarded linear sum
//! constraints.
//!
//! Constraints are selected from a queue by an online ordering heuristic
//! which approximates a topological order of the push dependencies; cycles in
//! that order are classified by walking the last-pusher chain instead of a
//! full graph analysis.

mod order;
mod propagator;

pub use propagator::ConstraintIndex;
pub use propagator::LinearPropagator;
pub use propagator::LinearStatistics;
