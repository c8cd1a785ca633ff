//! Boolean literals and the minimal assignment trail the enforcement tracker
//! consumes. The clause-level satisfiability engine itself is an external
//! collaborator; this module only mirrors the state this core needs to read
//! and push to.

mod boolean_assignments;
mod literal;

pub use boolean_assignments::BooleanAssignments;
pub use literal::Literal;
pub use literal::PropositionalVariable;
