//! The variable-bound table and its trail.

mod integer_trail;

pub use integer_trail::IntegerTrail;
pub use integer_trail::WatcherId;
