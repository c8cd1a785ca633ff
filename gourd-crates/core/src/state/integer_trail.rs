use fnv::FnvHashMap;

use crate::basic_types::Conflict;
use crate::basic_types::Explanation;
use crate::basic_types::Revertible;
use crate::basic_types::Trail;
use crate::containers::KeyedVec;
use crate::gourd_assert_simple;
use crate::math::saturating::cap_add;
use crate::math::saturating::cap_neg;
use crate::math::saturating::cap_prod;
use crate::variables::AffineExpression;
use crate::variables::IntegerLiteral;
use crate::variables::IntegerVariable;
use crate::variables::LinearExpression2;

/// Identifies a component which registered to be told about bound changes.
///
/// Watchers are pull-based: every bound push appends the changed variable to
/// the queues of the watchers watching it, and each watcher drains its queue
/// at the start of its own propagation instead of being called back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherId {
    index: usize,
}

#[derive(Debug, Clone)]
struct BoundChange {
    var: IntegerVariable,
    old_bound: i64,
}

/// The table of variable bounds, with a trail for exact backtracking.
///
/// Bound state is stored lower-bound-style per id: the upper bound of `v` is
/// the negated lower bound of `v.negated()`. Pairs are allocated together by
/// [`IntegerTrail::new_variable`]; ids are never destroyed, only their bounds
/// mutate.
#[derive(Default, Debug)]
pub struct IntegerTrail {
    bounds: KeyedVec<IntegerVariable, i64>,
    /// Bounds as they were at decision level zero; used to build relaxed
    /// explanations, where a literal at its root bound is free to drop.
    root_bounds: KeyedVec<IntegerVariable, i64>,
    /// The reason for the most recent push on each id. Entries for reverted
    /// pushes are stale, which is fine: they are only read for live bounds.
    reasons: KeyedVec<IntegerVariable, Option<Explanation>>,
    trail: Trail<BoundChange>,
    watches: FnvHashMap<IntegerVariable, Vec<WatcherId>>,
    queues: Vec<Vec<IntegerVariable>>,
}

impl IntegerTrail {
    /// Allocates a variable with domain `[lb, ub]` together with its
    /// negation, whose domain is `[-ub, -lb]`.
    pub fn new_variable(&mut self, lb: i64, ub: i64) -> IntegerVariable {
        gourd_assert_simple!(lb <= ub, "empty initial domain [{lb}, {ub}]");

        let var = self.bounds.push(lb);
        let negation = self.bounds.push(cap_neg(ub));
        gourd_assert_simple!(var.negated() == negation);

        let _ = self.root_bounds.push(lb);
        let _ = self.root_bounds.push(cap_neg(ub));
        let _ = self.reasons.push(None);
        let _ = self.reasons.push(None);
        var
    }

    pub fn lower_bound(&self, var: IntegerVariable) -> i64 {
        self.bounds[var]
    }

    pub fn upper_bound(&self, var: IntegerVariable) -> i64 {
        cap_neg(self.bounds[var.negated()])
    }

    pub fn root_lower_bound(&self, var: IntegerVariable) -> i64 {
        self.root_bounds[var]
    }

    pub fn root_upper_bound(&self, var: IntegerVariable) -> i64 {
        cap_neg(self.root_bounds[var.negated()])
    }

    pub fn is_fixed(&self, var: IntegerVariable) -> bool {
        self.lower_bound(var) == self.upper_bound(var)
    }

    /// Whether the value of the expression is decided by the current bounds.
    pub fn is_fixed_affine(&self, expression: &AffineExpression) -> bool {
        expression.is_constant() || self.is_fixed(expression.var)
    }

    pub fn is_literal_true(&self, literal: IntegerLiteral) -> bool {
        if literal.is_always_true() {
            return true;
        }
        if literal.is_always_false() {
            return false;
        }
        self.lower_bound(literal.var) >= literal.bound
    }

    pub fn is_literal_false(&self, literal: IntegerLiteral) -> bool {
        if literal.is_always_false() {
            return true;
        }
        if literal.is_always_true() {
            return false;
        }
        self.upper_bound(literal.var) < literal.bound
    }

    /// The largest value the expression can currently take.
    pub fn affine_upper_bound(&self, expression: &AffineExpression) -> i64 {
        if expression.is_constant() {
            return expression.constant;
        }
        cap_add(
            cap_prod(expression.coeff, self.upper_bound(expression.var)),
            expression.constant,
        )
    }

    /// The upper bound on a two-variable form implied by the variable
    /// intervals alone.
    pub fn trivial_upper_bound(&self, expression: &LinearExpression2) -> i64 {
        let mut bound = 0;
        for (var, coeff) in expression.vars.iter().zip(expression.coeffs.iter()) {
            if !var.is_none() {
                bound = cap_add(bound, cap_prod(*coeff, self.upper_bound(*var)));
            }
        }
        bound
    }

    pub fn decision_level(&self) -> u32 {
        self.trail.get_checkpoint() as u32
    }

    /// Raises the lower bound asserted by `literal`, recording `explanation`
    /// as its reason.
    ///
    /// A literal weaker than the current bound is a no-op. A literal past the
    /// opposing bound is a conflict whose explanation extends the reason with
    /// the opposing bound literal.
    pub fn enqueue(
        &mut self,
        literal: IntegerLiteral,
        explanation: Explanation,
    ) -> Result<(), Conflict> {
        if literal.is_always_true() {
            return Ok(());
        }
        if literal.is_always_false() {
            return Err(explanation.into());
        }

        let var = literal.var;
        if literal.bound <= self.lower_bound(var) {
            return Ok(());
        }
        if literal.bound > self.upper_bound(var) {
            let mut explanation = explanation;
            explanation
                .integer_reason
                .push(IntegerLiteral::lower_or_equal(var, self.upper_bound(var)));
            return Err(explanation.into());
        }

        self.trail.push(BoundChange {
            var,
            old_bound: self.bounds[var],
        });
        self.bounds[var] = literal.bound;
        self.reasons[var] = Some(explanation);
        if self.decision_level() == 0 {
            self.root_bounds[var] = literal.bound;
        }

        if let Some(watchers) = self.watches.get(&var) {
            for watcher in watchers {
                self.queues[watcher.index].push(var);
            }
        }
        Ok(())
    }

    /// The reason attached to the most recent live push on `var`, if any.
    pub fn reason_for_lower_bound(&self, var: IntegerVariable) -> Option<&Explanation> {
        self.reasons[var].as_ref()
    }

    pub fn register_watcher(&mut self) -> WatcherId {
        self.queues.push(Vec::new());
        WatcherId {
            index: self.queues.len() - 1,
        }
    }

    pub fn watch_lower_bound(&mut self, var: IntegerVariable, watcher: WatcherId) {
        let watchers = self.watches.entry(var).or_default();
        if !watchers.contains(&watcher) {
            watchers.push(watcher);
        }
    }

    /// Takes the variables whose lower bound changed since the watcher last
    /// drained its queue.
    pub fn drain_modified(&mut self, watcher: WatcherId) -> Vec<IntegerVariable> {
        std::mem::take(&mut self.queues[watcher.index])
    }
}

impl Revertible for IntegerTrail {
    fn set_level(&mut self, level: u32) {
        let current = self.decision_level();
        if level > current {
            for _ in current..level {
                self.trail.new_checkpoint();
            }
        } else if level < current {
            let changes = self.trail.synchronise(level as usize).collect::<Vec<_>>();
            for change in changes {
                self.bounds[change.var] = change.old_bound;
            }
            // Watcher queues may reference reverted pushes; they are caches,
            // so they are cleared rather than rolled back.
            for queue in &mut self.queues {
                queue.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_of_a_pair_are_mirrored() {
        let mut trail = IntegerTrail::default();
        let x = trail.new_variable(-3, 8);

        assert_eq!(trail.lower_bound(x), -3);
        assert_eq!(trail.upper_bound(x), 8);
        assert_eq!(trail.lower_bound(x.negated()), -8);
        assert_eq!(trail.upper_bound(x.negated()), 3);
        assert_eq!(trail.lower_bound(x), -trail.upper_bound(x.negated()));
    }

    #[test]
    fn pushes_are_reverted_exactly_on_backtrack() {
        let mut trail = IntegerTrail::default();
        let x = trail.new_variable(0, 10);

        trail.set_level(1);
        trail
            .enqueue(IntegerLiteral::greater_or_equal(x, 4), Explanation::default())
            .unwrap();
        trail.set_level(2);
        trail
            .enqueue(IntegerLiteral::lower_or_equal(x, 6), Explanation::default())
            .unwrap();
        assert_eq!((trail.lower_bound(x), trail.upper_bound(x)), (4, 6));

        trail.set_level(1);
        assert_eq!((trail.lower_bound(x), trail.upper_bound(x)), (4, 10));
        trail.set_level(0);
        assert_eq!((trail.lower_bound(x), trail.upper_bound(x)), (0, 10));
    }

    #[test]
    fn crossing_the_opposing_bound_is_a_conflict() {
        let mut trail = IntegerTrail::default();
        let x = trail.new_variable(0, 5);

        let conflict = trail
            .enqueue(IntegerLiteral::greater_or_equal(x, 6), Explanation::default())
            .expect_err("bound crosses the upper bound");
        assert_eq!(
            conflict.explanation.integer_reason,
            vec![IntegerLiteral::lower_or_equal(x, 5)]
        );
    }

    #[test]
    fn watchers_see_modified_variables_once() {
        let mut trail = IntegerTrail::default();
        let x = trail.new_variable(0, 10);
        let watcher = trail.register_watcher();
        trail.watch_lower_bound(x, watcher);

        trail
            .enqueue(IntegerLiteral::greater_or_equal(x, 2), Explanation::default())
            .unwrap();
        assert_eq!(trail.drain_modified(watcher), vec![x]);
        assert!(trail.drain_modified(watcher).is_empty());
    }
}
