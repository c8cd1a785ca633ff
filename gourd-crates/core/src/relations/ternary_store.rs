use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::gourd_assert_simple;
use crate::math::num_ext::NumExt;
use crate::math::saturating::MAX_INTEGER_VALUE;
use crate::math::saturating::is_unbounded;
use crate::relations::Expr2Index;
use crate::state::IntegerTrail;
use crate::variables::AffineExpression;

/// The best variable upper bound on a two-variable form inferred from a
/// loaded three-variable relation: `divisor * expr <= affine`.
///
/// Entries are not reverted on backtrack. That is sound only because every
/// entry is a root fact, which is why [`add_upper_bound`] refuses non-root
/// insertions; the store degrades gracefully (it keeps a valid but possibly
/// weaker bound) rather than rolling back exactly.
///
/// [`add_upper_bound`]: TernaryRelationsStore::add_upper_bound
#[derive(Default, Debug)]
pub struct TernaryRelationsStore {
    bounds: KeyedVec<Expr2Index, Option<(AffineExpression, i64)>>,
}

impl TernaryRelationsStore {
    /// Records `divisor * index <= affine`, keeping whichever entry evaluates
    /// to the tighter bound under the current (root) domains.
    pub fn add_upper_bound(
        &mut self,
        index: Expr2Index,
        affine: AffineExpression,
        divisor: i64,
        integer_trail: &IntegerTrail,
    ) {
        gourd_assert_simple!(
            integer_trail.decision_level() == 0,
            "ternary-derived bounds are root facts"
        );
        gourd_assert_simple!(divisor >= 1);

        self.bounds.accomodate(index, None);
        let candidate = evaluate(&affine, divisor, integer_trail);
        let incumbent = self.bounds[index]
            .as_ref()
            .map_or(MAX_INTEGER_VALUE, |(affine, divisor)| {
                evaluate(affine, *divisor, integer_trail)
            });
        if candidate < incumbent {
            self.bounds[index] = Some((affine, divisor));
        }
    }

    pub fn upper_bound(&self, index: Expr2Index, integer_trail: &IntegerTrail) -> i64 {
        self.entry(index)
            .map_or(MAX_INTEGER_VALUE, |(affine, divisor)| {
                evaluate(affine, *divisor, integer_trail)
            })
    }

    pub fn entry(&self, index: Expr2Index) -> Option<&(AffineExpression, i64)> {
        if index.index() < self.bounds.len() {
            self.bounds[index].as_ref()
        } else {
            None
        }
    }
}

fn evaluate(affine: &AffineExpression, divisor: i64, integer_trail: &IntegerTrail) -> i64 {
    let affine_upper_bound = integer_trail.affine_upper_bound(affine);
    if is_unbounded(affine_upper_bound) {
        return MAX_INTEGER_VALUE;
    }
    affine_upper_bound.div_floor(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_tighter_entry_wins() {
        let mut integer_trail = IntegerTrail::default();
        let z = integer_trail.new_variable(0, 5);
        let w = integer_trail.new_variable(0, 9);
        let mut store = TernaryRelationsStore::default();
        let index = Expr2Index::create_from_index(0);

        store.add_upper_bound(index, AffineExpression::new(w, 1, 0), 1, &integer_trail);
        assert_eq!(store.upper_bound(index, &integer_trail), 9);

        // 2 * expr <= z + 1, i.e. expr <= floor(6 / 2) = 3.
        store.add_upper_bound(index, AffineExpression::new(z, 1, 1), 2, &integer_trail);
        assert_eq!(store.upper_bound(index, &integer_trail), 3);

        // A weaker relation does not replace the incumbent.
        store.add_upper_bound(index, AffineExpression::new(w, 2, 0), 1, &integer_trail);
        assert_eq!(store.upper_bound(index, &integer_trail), 3);
    }

    #[test]
    fn unknown_indices_are_unbounded() {
        let store = TernaryRelationsStore::default();
        let integer_trail = IntegerTrail::default();

        let index = Expr2Index::create_from_index(4);
        assert_eq!(store.upper_bound(index, &integer_trail), MAX_INTEGER_VALUE);
    }
}
