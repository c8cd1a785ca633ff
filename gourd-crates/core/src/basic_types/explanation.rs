use thiserror::Error;

use crate::booleans::Literal;
use crate::variables::IntegerLiteral;

/// The reason attached to a deduction or a conflict.
///
/// An explanation is a conjunction of Boolean literals and integer bound
/// literals which together imply the deduced fact (or, for a conflict, are
/// jointly inconsistent). Explanations are consumed by the clause-level
/// engine; this core only constructs them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Explanation {
    pub literal_reason: Vec<Literal>,
    pub integer_reason: Vec<IntegerLiteral>,
}

impl Explanation {
    pub fn new(literal_reason: Vec<Literal>, integer_reason: Vec<IntegerLiteral>) -> Self {
        Explanation {
            literal_reason,
            integer_reason,
        }
    }

    pub fn from_integer_reason(integer_reason: Vec<IntegerLiteral>) -> Self {
        Explanation {
            literal_reason: Vec::new(),
            integer_reason,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.literal_reason.is_empty() && self.integer_reason.is_empty()
    }
}

impl std::fmt::Debug for Explanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let literals = self
            .literal_reason
            .iter()
            .map(|literal| literal.to_string());
        let bounds = self.integer_reason.iter().map(|bound| bound.to_string());
        write!(f, "{}", literals.chain(bounds).collect::<Vec<_>>().join(" /\\ "))
    }
}

/// An infeasibility discovered under the current enforcement and bounds.
///
/// A conflict is recovered from by backtracking; it is never fatal inside
/// this core.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conflict {
    pub explanation: Explanation,
}

impl From<Explanation> for Conflict {
    fn from(explanation: Explanation) -> Self {
        Conflict { explanation }
    }
}

/// Errors which can occur while registering constraints with the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintOperationError {
    /// A constraint was added while the model is already infeasible at the
    /// root.
    #[error("adding a constraint to an infeasible model")]
    InfeasibleState,
    /// The added constraint is violated under the root bounds; the model is
    /// infeasible from this point on.
    #[error("the constraint conflicts with the root bounds")]
    RootConflict(Conflict),
}

/// Mutable state which is undone when the search backtracks.
///
/// `set_level` is called exactly once per decision-level change, before any
/// propagation at the new level. Moving to a smaller level is the sole
/// rollback mechanism in this core.
pub trait Revertible {
    fn set_level(&mut self, level: u32);
}
