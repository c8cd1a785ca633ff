use crate::basic_types::Explanation;
use crate::basic_types::Revertible;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::enforcement::EnforcementId;
use crate::math::saturating::MAX_INTEGER_VALUE;
use crate::relations::Expr2Index;

/// Where a conditionally-live bound came from, for later reason building.
#[derive(Debug, Clone)]
pub enum BoundSource {
    /// The bound is implied by an enforcement list which is currently true.
    Enforcement(EnforcementId),
    /// The bound was derived elsewhere; its reason was captured at push time.
    Derived(Explanation),
}

#[derive(Debug, Clone)]
pub struct EnforcedBound {
    pub upper_bound: i64,
    pub source: BoundSource,
}

/// `enforcement => expr <= rhs` facts which are live on the current branch.
///
/// Pushing a bound for an index records the prior entry on an explicit undo
/// stack; a per-level stack-size marker lets `set_level` pop back exactly to
/// the entry which was live at the target level.
#[derive(Default, Debug)]
pub struct EnforcedRelationsStore {
    current: KeyedVec<Expr2Index, Option<EnforcedBound>>,
    undo: Vec<(Expr2Index, Option<EnforcedBound>)>,
    /// At position i, the undo stack length when level i + 1 was entered.
    level_marks: Vec<usize>,
}

impl EnforcedRelationsStore {
    /// Makes `index <= upper_bound` live; a bound looser than the live one is
    /// ignored.
    pub fn push_upper_bound(&mut self, index: Expr2Index, upper_bound: i64, source: BoundSource) {
        self.current.accomodate(index, None);
        let prior = self.current[index].clone();
        if prior
            .as_ref()
            .is_some_and(|bound| bound.upper_bound <= upper_bound)
        {
            return;
        }
        self.undo.push((index, prior));
        self.current[index] = Some(EnforcedBound {
            upper_bound,
            source,
        });
    }

    pub fn upper_bound(&self, index: Expr2Index) -> i64 {
        self.bound(index)
            .map_or(MAX_INTEGER_VALUE, |bound| bound.upper_bound)
    }

    pub fn bound(&self, index: Expr2Index) -> Option<&EnforcedBound> {
        if index.index() < self.current.len() {
            self.current[index].as_ref()
        } else {
            None
        }
    }
}

impl Revertible for EnforcedRelationsStore {
    fn set_level(&mut self, level: u32) {
        let current_level = self.level_marks.len() as u32;
        if level > current_level {
            for _ in current_level..level {
                self.level_marks.push(self.undo.len());
            }
        } else if level < current_level {
            let mark = self.level_marks[level as usize];
            self.level_marks.truncate(level as usize);
            while self.undo.len() > mark {
                let (index, prior) = self.undo.pop().expect("the stack is longer than the mark");
                self.current[index] = prior;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(store: &mut EnforcedRelationsStore, index: Expr2Index, upper_bound: i64) {
        store.push_upper_bound(
            index,
            upper_bound,
            BoundSource::Derived(Explanation::default()),
        );
    }

    #[test]
    fn backtracking_restores_the_entry_live_at_the_target_level() {
        let mut store = EnforcedRelationsStore::default();
        let index = Expr2Index::create_from_index(0);

        store.set_level(1);
        push(&mut store, index, 10);
        store.set_level(2);
        push(&mut store, index, 4);
        assert_eq!(store.upper_bound(index), 4);

        store.set_level(1);
        assert_eq!(store.upper_bound(index), 10);
        store.set_level(0);
        assert_eq!(store.upper_bound(index), MAX_INTEGER_VALUE);
    }

    #[test]
    fn looser_pushes_are_ignored() {
        let mut store = EnforcedRelationsStore::default();
        let index = Expr2Index::create_from_index(2);

        store.set_level(1);
        push(&mut store, index, 3);
        push(&mut store, index, 8);
        assert_eq!(store.upper_bound(index), 3);

        store.set_level(0);
        assert_eq!(store.upper_bound(index), MAX_INTEGER_VALUE);
    }
}
