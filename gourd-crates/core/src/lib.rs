//! The incremental linear-arithmetic propagation core of the Gourd constraint
//! solver.
//!
//! Given integer variables with closed bounds, linear inequalities guarded by
//! enforcement literals, and two-variable relations, this crate maintains the
//! tightest bound information consistent with the current search branch,
//! propagates deductions into variable bounds, detects infeasibility, and
//! produces compact conflict explanations. All of this is incremental: state
//! is restored exactly across backtracking through [`set_level`] calls rather
//! than by rescanning the constraint set.
//!
//! [`set_level`]: Revertible::set_level

pub(crate) mod basic_types;
pub mod containers;
pub(crate) mod gourd_asserts;
pub(crate) mod math;
pub mod statistics;

pub mod booleans;
pub mod enforcement;
pub mod linear;
pub mod relations;
pub mod state;
pub mod variables;

pub use crate::basic_types::Conflict;
pub use crate::basic_types::ConstraintOperationError;
pub use crate::basic_types::Explanation;
pub use crate::basic_types::Revertible;

#[doc(hidden)]
pub mod asserts {
    pub use crate::gourd_asserts::*;
}
