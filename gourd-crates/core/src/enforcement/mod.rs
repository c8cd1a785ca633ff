//! Tracks which conditionally-active constraints are currently enforced.
//!
//! A constraint guarded by a list of enforcement literals is only allowed to
//! propagate once all of its guards are true; the tracker maintains a
//! four-state activation status per registered list and reports changes to
//! subscribers, watching only two literals per list irrespective of its
//! length.

mod propagator;

pub use propagator::EnforcementId;
pub use propagator::EnforcementPropagator;
pub use propagator::EnforcementStatus;
