mod explanation;
mod trail;
mod trailed_values;

pub use explanation::Conflict;
pub use explanation::ConstraintOperationError;
pub use explanation::Explanation;
pub use explanation::Revertible;
pub(crate) use trail::Trail;
pub(crate) use trailed_values::TrailedInteger;
pub(crate) use trailed_values::TrailedValues;
