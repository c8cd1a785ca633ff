use fnv::FnvHashMap;

use crate::containers::KeyedVec;
use crate::linear::ConstraintIndex;
use crate::variables::IntegerVariable;

/// Decides which scheduled constraint to propagate next.
///
/// Per variable with a pending push, the single constraint credited with
/// producing that push is tracked (ties go to the first creditor). Selecting
/// a constraint whose variables still have pending pushes is wasteful, since
/// its inputs will improve again; [`next_id`] therefore scans the queue once,
/// computing each candidate's degree (how many of its variables are pending)
/// and returns a degree-zero candidate immediately, or the minimum-degree one
/// after the full scan, ties to smaller constraints.
///
/// This approximates a topological order over a graph which is not guaranteed
/// acyclic; cycles are the caller's concern.
///
/// [`next_id`]: PropagationOrder::next_id
#[derive(Default, Debug)]
pub(crate) struct PropagationOrder {
    queue: Vec<ConstraintIndex>,
    in_queue: KeyedVec<ConstraintIndex, bool>,
    pending: FnvHashMap<IntegerVariable, ConstraintIndex>,
}

impl PropagationOrder {
    /// Extends the bookkeeping to one more constraint.
    pub(crate) fn grow(&mut self) -> ConstraintIndex {
        self.in_queue.push(false)
    }

    pub(crate) fn schedule(&mut self, index: ConstraintIndex) {
        if !self.in_queue[index] {
            self.in_queue[index] = true;
            self.queue.push(index);
        }
    }

    /// Credits `index` with the pending push on `var`; an existing credit is
    /// kept.
    pub(crate) fn credit(&mut self, var: IntegerVariable, index: ConstraintIndex) {
        let _ = self.pending.entry(var).or_insert(index);
    }

    pub(crate) fn uncredit(&mut self, var: IntegerVariable) {
        let _ = self.pending.remove(&var);
    }

    /// Drops all scheduling state; used after backtracking, where the queue
    /// and credits are caches which are cheaper to rebuild than to revert.
    pub(crate) fn clear(&mut self) {
        for index in self.queue.drain(..) {
            self.in_queue[index] = false;
        }
        self.pending.clear();
    }

    /// Removes and returns the next constraint to propagate, if any.
    ///
    /// The credits pointing at the returned constraint are consumed: its
    /// pending pushes are about to be delivered.
    pub(crate) fn next_id<I: IntoIterator<Item = IntegerVariable>>(
        &mut self,
        vars_of: impl Fn(ConstraintIndex) -> I,
    ) -> Option<ConstraintIndex> {
        if self.queue.is_empty() {
            return None;
        }

        let mut best: Option<(usize, usize, usize)> = None;
        for (position, &candidate) in self.queue.iter().enumerate() {
            let mut degree = 0;
            let mut size = 0;
            for var in vars_of(candidate) {
                size += 1;
                if self.pending.contains_key(&var) {
                    degree += 1;
                }
            }
            if degree == 0 {
                best = Some((0, size, position));
                break;
            }
            let improves = match best {
                None => true,
                Some((best_degree, best_size, _)) => (degree, size) < (best_degree, best_size),
            };
            if improves {
                best = Some((degree, size, position));
            }
        }

        let (_, _, position) = best.expect("the queue is non-empty");
        let index = self.queue.swap_remove(position);
        self.in_queue[index] = false;
        self.pending.retain(|_, credited| *credited != index);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::StorageKey;

    fn var(pair: usize) -> IntegerVariable {
        IntegerVariable::from_pair_index(pair)
    }

    #[test]
    fn scheduling_is_deduplicated() {
        let mut order = PropagationOrder::default();
        let c0 = order.grow();

        order.schedule(c0);
        order.schedule(c0);

        assert_eq!(order.next_id(|_| []), Some(c0));
        assert_eq!(order.next_id(|_| []), None);
    }

    #[test]
    fn degree_zero_candidates_go_first() {
        let mut order = PropagationOrder::default();
        let c0 = order.grow();
        let c1 = order.grow();

        // c1 still waits on a pending push of x, credited to c0.
        let x = var(0);
        order.credit(x, c0);
        order.schedule(c0);
        order.schedule(c1);

        let vars_of = |index: ConstraintIndex| {
            if index.index() == 1 {
                vec![x, var(1)]
            } else {
                vec![var(2)]
            }
        };
        assert_eq!(order.next_id(vars_of), Some(c0));
        // Selecting c0 consumed its credit, so c1 is now degree zero.
        assert_eq!(order.next_id(vars_of), Some(c1));
    }

    #[test]
    fn ties_go_to_the_smaller_constraint() {
        let mut order = PropagationOrder::default();
        let big = order.grow();
        let small = order.grow();

        let x = var(0);
        // Neither candidate's creditor is in the queue, so both have degree
        // one and the smaller window wins.
        order.credit(x, ConstraintIndex::create_from_index(7));
        order.schedule(big);
        order.schedule(small);

        let vars_of = |index: ConstraintIndex| {
            if index == big {
                vec![x, var(1), var(2)]
            } else {
                vec![x, var(3)]
            }
        };
        assert_eq!(order.next_id(vars_of), Some(small));
    }
}
