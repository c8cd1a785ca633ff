use fnv::FnvHashMap;

use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::gourd_assert_moderate;
use crate::gourd_assert_simple;
use crate::variables::LinearExpression2;

/// The stable id of a canonical two-variable form.
///
/// Ids are allocated in pairs exactly like variable ids: the low bit is the
/// sign, so the negation of a form is reached by toggling it. This gives
/// O(1) dedup lookup without ever aliasing distinct relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expr2Index {
    id: u32,
}

impl Expr2Index {
    pub fn negated(self) -> Expr2Index {
        Expr2Index { id: self.id ^ 1 }
    }
}

impl StorageKey for Expr2Index {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        Expr2Index { id: index as u32 }
    }
}

impl std::fmt::Display for Expr2Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.id)
    }
}

/// The deduplicated registry of canonical two-variable forms.
///
/// A form and its negation are registered together and share a pair of
/// adjacent ids; forms are created once at model load and never destroyed.
#[derive(Default, Debug)]
pub struct RelationIndex {
    indices: FnvHashMap<LinearExpression2, Expr2Index>,
    expressions: KeyedVec<Expr2Index, LinearExpression2>,
}

impl RelationIndex {
    /// Looks up the id of a canonical form.
    pub fn get(&self, expression: &LinearExpression2) -> Option<Expr2Index> {
        self.indices.get(expression).copied()
    }

    /// Looks up or allocates the id of `expression`, which must be canonical.
    pub fn get_or_create(&mut self, expression: LinearExpression2) -> Expr2Index {
        gourd_assert_moderate!(
            {
                let mut copy = expression;
                copy.simple_canonicalization();
                copy == expression
            },
            "only canonical forms are indexed"
        );

        if let Some(&index) = self.indices.get(&expression) {
            return index;
        }

        let index = self.expressions.push(expression);
        let negated_index = self.expressions.push(expression.negated());
        gourd_assert_simple!(negated_index == index.negated());

        let _ = self.indices.insert(expression, index);
        let _ = self.indices.insert(expression.negated(), negated_index);
        index
    }

    pub fn expression(&self, index: Expr2Index) -> LinearExpression2 {
        self.expressions[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::IntegerVariable;

    fn canonical_difference(x: IntegerVariable, y: IntegerVariable) -> LinearExpression2 {
        let mut expression = LinearExpression2::difference(x, y);
        expression.simple_canonicalization();
        expression
    }

    #[test]
    fn a_form_and_its_negation_share_a_pair() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(1);
        let mut registry = RelationIndex::default();

        let expression = canonical_difference(x, y);
        let index = registry.get_or_create(expression);

        assert_eq!(index.negated().negated(), index);
        assert_eq!(registry.get(&expression.negated()), Some(index.negated()));
        assert_eq!(registry.expression(index.negated()), expression.negated());
    }

    #[test]
    fn lookups_are_deduplicated() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(1);
        let mut registry = RelationIndex::default();

        let expression = canonical_difference(x, y);
        let index = registry.get_or_create(expression);

        assert_eq!(registry.get_or_create(expression), index);
        // Registering the negation first would have allocated the same pair.
        assert_eq!(registry.get_or_create(expression.negated()), index.negated());
    }
}
