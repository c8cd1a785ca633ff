//! Containers which the solver core uses to store id-keyed data.

mod keyed_vec;

pub use keyed_vec::KeyedVec;
pub use keyed_vec::StorageKey;
