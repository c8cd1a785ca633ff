use crate::basic_types::Conflict;
use crate::basic_types::Explanation;
use crate::basic_types::Revertible;
use crate::basic_types::Trail;
use crate::booleans::Literal;
use crate::booleans::PropositionalVariable;
use crate::containers::KeyedVec;

/// The assignment state of the Boolean enforcement variables.
///
/// This mirrors the part of the clause-level trail this core interacts with:
/// literal values, the order in which literals were assigned, per-literal
/// reasons, and decision levels (one trail checkpoint per level).
#[derive(Default, Debug)]
pub struct BooleanAssignments {
    values: KeyedVec<PropositionalVariable, Option<bool>>,
    reasons: KeyedVec<PropositionalVariable, Option<Explanation>>,
    trail: Trail<Literal>,
}

impl BooleanAssignments {
    pub fn new_variable(&mut self) -> PropositionalVariable {
        let variable = self.values.push(None);
        let _ = self.reasons.push(None);
        variable
    }

    /// A fresh positive literal over a fresh variable.
    pub fn new_literal(&mut self) -> Literal {
        Literal::new(self.new_variable(), true)
    }

    pub fn is_assigned(&self, literal: Literal) -> bool {
        self.values[literal.get_variable()].is_some()
    }

    pub fn is_true(&self, literal: Literal) -> bool {
        self.values[literal.get_variable()] == Some(literal.is_positive())
    }

    pub fn is_false(&self, literal: Literal) -> bool {
        self.values[literal.get_variable()] == Some(!literal.is_positive())
    }

    pub fn decision_level(&self) -> u32 {
        self.trail.get_checkpoint() as u32
    }

    /// The number of literals assigned so far; used by the enforcement
    /// tracker to process the trail incrementally.
    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub fn trail_entry(&self, index: usize) -> Literal {
        self.trail[index]
    }

    pub fn reason(&self, literal: Literal) -> Option<&Explanation> {
        self.reasons[literal.get_variable()].as_ref()
    }

    /// Assigns `literal` to true with the given reason.
    ///
    /// Assigning an already-true literal is a no-op; assigning a false one is
    /// a conflict whose explanation extends the reason with the opposing
    /// literal.
    pub fn enqueue(&mut self, literal: Literal, reason: Explanation) -> Result<(), Conflict> {
        if self.is_true(literal) {
            return Ok(());
        }
        if self.is_false(literal) {
            let mut explanation = reason;
            explanation.literal_reason.push(!literal);
            return Err(explanation.into());
        }

        self.values[literal.get_variable()] = Some(literal.is_positive());
        self.reasons[literal.get_variable()] = Some(reason);
        self.trail.push(literal);
        Ok(())
    }
}

impl Revertible for BooleanAssignments {
    fn set_level(&mut self, level: u32) {
        let current = self.decision_level();
        if level > current {
            for _ in current..level {
                self.trail.new_checkpoint();
            }
        } else if level < current {
            let unassigned = self.trail.synchronise(level as usize).collect::<Vec<_>>();
            for literal in unassigned {
                self.values[literal.get_variable()] = None;
                self.reasons[literal.get_variable()] = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtracking_unassigns_literals_past_the_target_level() {
        let mut booleans = BooleanAssignments::default();
        let a = booleans.new_literal();
        let b = booleans.new_literal();

        booleans.set_level(1);
        booleans.enqueue(a, Explanation::default()).unwrap();
        booleans.set_level(2);
        booleans.enqueue(!b, Explanation::default()).unwrap();

        booleans.set_level(1);
        assert!(booleans.is_true(a));
        assert!(!booleans.is_assigned(b));

        booleans.set_level(0);
        assert!(!booleans.is_assigned(a));
    }

    #[test]
    fn enqueueing_a_false_literal_is_a_conflict() {
        let mut booleans = BooleanAssignments::default();
        let a = booleans.new_literal();

        booleans.enqueue(!a, Explanation::default()).unwrap();
        let conflict = booleans
            .enqueue(a, Explanation::default())
            .expect_err("opposing assignment must conflict");
        assert_eq!(conflict.explanation.literal_reason, vec![!a]);
    }
}
