//! The repository of two-variable linear relations `a*x + b*y <= ub`.
//!
//! Relations are keyed by their canonical form through a parity-paired index,
//! so a form and its negation resolve to adjacent indices and a lower bound
//! query is an upper bound query on the negation. Four stores back the
//! repository: unconditional root facts, conditionally-live enforced facts,
//! bounds derived from loaded three-variable relations, and reified literal
//! encodings.

mod enforced_store;
mod index;
mod reified_store;
mod repository;
mod root_store;
mod ternary_store;

pub use enforced_store::BoundSource;
pub use enforced_store::EnforcedBound;
pub use enforced_store::EnforcedRelationsStore;
pub use index::Expr2Index;
pub use index::RelationIndex;
pub use reified_store::ReifiedRelationsStore;
pub use repository::RelationRepository;
pub use repository::RelationStatus;
pub use root_store::RootRelationsStore;
pub use ternary_store::TernaryRelationsStore;
