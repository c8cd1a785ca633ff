use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::math::saturating::MAX_INTEGER_VALUE;
use crate::relations::Expr2Index;

/// Unconditional `expr <= ub` facts established at the root.
///
/// Only the tightest bound ever seen per index is kept; entries are never
/// reverted, since root facts hold on every branch.
#[derive(Default, Debug)]
pub struct RootRelationsStore {
    bounds: KeyedVec<Expr2Index, i64>,
}

impl RootRelationsStore {
    /// Records `index <= upper_bound`; a looser bound than the stored one is
    /// ignored. Returns whether the stored bound changed.
    pub fn add_upper_bound(&mut self, index: Expr2Index, upper_bound: i64) -> bool {
        self.bounds.accomodate(index, MAX_INTEGER_VALUE);
        if upper_bound < self.bounds[index] {
            self.bounds[index] = upper_bound;
            true
        } else {
            false
        }
    }

    pub fn upper_bound(&self, index: Expr2Index) -> i64 {
        if index.index() < self.bounds.len() {
            self.bounds[index]
        } else {
            MAX_INTEGER_VALUE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_tighter_bounds_are_stored() {
        let mut store = RootRelationsStore::default();
        let index = Expr2Index::create_from_index(0);

        assert_eq!(store.upper_bound(index), MAX_INTEGER_VALUE);
        assert!(store.add_upper_bound(index, 7));
        assert_eq!(store.upper_bound(index), 7);

        assert!(!store.add_upper_bound(index, 9));
        assert_eq!(store.upper_bound(index), 7);

        assert!(store.add_upper_bound(index, -2));
        assert_eq!(store.upper_bound(index), -2);
    }
}
