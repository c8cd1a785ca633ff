use crate::basic_types::Trail;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;

/// A reference to an `i64` stored in [`TrailedValues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrailedInteger {
    id: u32,
}

impl StorageKey for TrailedInteger {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        TrailedInteger { id: index as u32 }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrailedChange {
    old_value: i64,
    reference: TrailedInteger,
}

/// Storage for integers whose values are automatically restored when the
/// search backtracks past the checkpoint they were written at.
///
/// The linear engine keeps its per-constraint mutable cache fields here so
/// that `set_level` restores them exactly without per-constraint bookkeeping.
#[derive(Default, Debug, Clone)]
pub(crate) struct TrailedValues {
    trail: Trail<TrailedChange>,
    values: KeyedVec<TrailedInteger, i64>,
}

impl TrailedValues {
    pub(crate) fn grow(&mut self, initial_value: i64) -> TrailedInteger {
        self.values.push(initial_value)
    }

    pub(crate) fn new_checkpoint(&mut self) {
        self.trail.new_checkpoint()
    }

    pub(crate) fn get_checkpoint(&self) -> usize {
        self.trail.get_checkpoint()
    }

    pub(crate) fn read(&self, trailed_integer: TrailedInteger) -> i64 {
        self.values[trailed_integer]
    }

    pub(crate) fn synchronise(&mut self, new_checkpoint: usize) {
        self.trail
            .synchronise(new_checkpoint)
            .for_each(|state_change| self.values[state_change.reference] = state_change.old_value)
    }

    pub(crate) fn assign(&mut self, trailed_integer: TrailedInteger, value: i64) {
        let old_value = self.values[trailed_integer];
        if old_value == value {
            return;
        }
        let entry = TrailedChange {
            old_value,
            reference: trailed_integer,
        };
        self.trail.push(entry);
        self.values[trailed_integer] = value;
    }

    pub(crate) fn add_assign(&mut self, trailed_integer: TrailedInteger, addition: i64) {
        self.assign(trailed_integer, self.values[trailed_integer] + addition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_reverted_per_checkpoint() {
        let mut values = TrailedValues::default();
        let trailed_integer = values.grow(0);

        values.new_checkpoint();
        values.add_assign(trailed_integer, 5);
        values.add_assign(trailed_integer, 5);
        assert_eq!(values.read(trailed_integer), 10);

        values.new_checkpoint();
        values.assign(trailed_integer, 11);
        assert_eq!(values.read(trailed_integer), 11);

        values.synchronise(1);
        assert_eq!(values.read(trailed_integer), 10);

        values.synchronise(0);
        assert_eq!(values.read(trailed_integer), 0);
    }
}
