use fnv::FnvHashMap;

use crate::booleans::Literal;
use crate::math::saturating::cap_neg;
use crate::math::saturating::cap_sub;
use crate::relations::Expr2Index;
use crate::variables::AffineExpression;

/// `literal <=> (expr <= ub)` equivalences and plain equalities between a
/// two-variable form and an affine expression.
///
/// These let a bound query resolve to an existing Boolean variable instead of
/// fresh machinery: asserting `expr <= ub` can enqueue an encoding literal
/// whose semantics are at least as loose as the requested bound.
#[derive(Default, Debug)]
pub struct ReifiedRelationsStore {
    literals: FnvHashMap<Expr2Index, Vec<(i64, Literal)>>,
    equalities: FnvHashMap<Expr2Index, AffineExpression>,
}

impl ReifiedRelationsStore {
    /// Records `literal <=> (index <= upper_bound)`.
    ///
    /// The contrapositive `!literal <=> (negated index <= -upper_bound - 1)`
    /// is registered as well, so both polarities are found by lookups.
    pub fn add_equivalence(&mut self, index: Expr2Index, upper_bound: i64, literal: Literal) {
        self.literals
            .entry(index)
            .or_default()
            .push((upper_bound, literal));
        self.literals
            .entry(index.negated())
            .or_default()
            .push((cap_sub(cap_neg(upper_bound), 1), !literal));
    }

    /// The encoding literal with the smallest bound at least `upper_bound`:
    /// `index <= upper_bound` implies that literal.
    pub fn literal_for_upper_bound(
        &self,
        index: Expr2Index,
        upper_bound: i64,
    ) -> Option<(i64, Literal)> {
        self.literals
            .get(&index)?
            .iter()
            .filter(|(bound, _)| *bound >= upper_bound)
            .min_by_key(|(bound, _)| *bound)
            .copied()
    }

    /// Records `index == affine` (and the mirrored equality for the negated
    /// index).
    pub fn add_equality(&mut self, index: Expr2Index, affine: AffineExpression) {
        let _ = self.equalities.insert(index, affine);
        let _ = self.equalities.insert(index.negated(), affine.negated());
    }

    pub fn equality(&self, index: Expr2Index) -> Option<&AffineExpression> {
        self.equalities.get(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booleans::BooleanAssignments;
    use crate::containers::StorageKey;

    #[test]
    fn both_polarities_of_an_equivalence_are_found() {
        let mut booleans = BooleanAssignments::default();
        let literal = booleans.new_literal();
        let mut store = ReifiedRelationsStore::default();
        let index = Expr2Index::create_from_index(0);

        store.add_equivalence(index, 5, literal);

        assert_eq!(store.literal_for_upper_bound(index, 5), Some((5, literal)));
        assert_eq!(store.literal_for_upper_bound(index, 3), Some((5, literal)));
        assert_eq!(store.literal_for_upper_bound(index, 6), None);
        assert_eq!(
            store.literal_for_upper_bound(index.negated(), -6),
            Some((-6, !literal))
        );
    }

    #[test]
    fn the_tightest_sufficient_literal_is_chosen() {
        let mut booleans = BooleanAssignments::default();
        let loose = booleans.new_literal();
        let tight = booleans.new_literal();
        let mut store = ReifiedRelationsStore::default();
        let index = Expr2Index::create_from_index(2);

        store.add_equivalence(index, 9, loose);
        store.add_equivalence(index, 4, tight);

        // The smallest encoded bound which is still implied is chosen.
        assert_eq!(store.literal_for_upper_bound(index, 3), Some((4, tight)));
        assert_eq!(store.literal_for_upper_bound(index, 7), Some((9, loose)));
    }
}
