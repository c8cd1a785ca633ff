use fnv::FnvHashMap;

use crate::basic_types::Conflict;
use crate::basic_types::Explanation;
use crate::basic_types::Revertible;
use crate::booleans::BooleanAssignments;
use crate::booleans::Literal;
use crate::enforcement::EnforcementId;
use crate::enforcement::EnforcementPropagator;
use crate::enforcement::EnforcementStatus;
use crate::gourd_assert_moderate;
use crate::math::saturating::MAX_INTEGER_VALUE;
use crate::math::saturating::MIN_INTEGER_VALUE;
use crate::math::saturating::cap_neg;
use crate::math::saturating::cap_prod;
use crate::math::saturating::is_unbounded;
use crate::relations::BoundSource;
use crate::relations::EnforcedRelationsStore;
use crate::relations::Expr2Index;
use crate::relations::ReifiedRelationsStore;
use crate::relations::RelationIndex;
use crate::relations::RootRelationsStore;
use crate::relations::TernaryRelationsStore;
use crate::state::IntegerTrail;
use crate::variables::AffineExpression;
use crate::variables::IntegerLiteral;
use crate::variables::LinearExpression2;

/// The truth status of `expr <= ub` under the currently known bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStatus {
    IsTrue,
    IsFalse,
    Unknown,
}

/// The aggregator over the four relation stores.
///
/// All stores share the canonical-form index; a bound query canonicalizes its
/// argument, derives the index, and returns the minimum over the root bound,
/// the live enforced bound, the ternary-derived bound, and the trivial bound
/// from the variable intervals, scaled back by the canonicalization divisor.
#[derive(Default, Debug)]
pub struct RelationRepository {
    index: RelationIndex,
    root: RootRelationsStore,
    enforced: EnforcedRelationsStore,
    ternary: TernaryRelationsStore,
    reified: ReifiedRelationsStore,
    /// The facts to activate per registered enforcement list.
    conditional: FnvHashMap<EnforcementId, Vec<(Expr2Index, i64)>>,
}

impl RelationRepository {
    /// Records the unconditional root facts `lb <= expr <= ub`.
    pub fn add(&mut self, expression: LinearExpression2, lb: i64, ub: i64) {
        let mut canonical = expression;
        let mut lb = lb;
        let mut ub = ub;
        let _ = canonical.canonicalize_with_bounds(&mut lb, &mut ub);
        if canonical.is_empty() {
            return;
        }
        let index = self.index.get_or_create(canonical);
        if !is_unbounded(ub) {
            let _ = self.root.add_upper_bound(index, ub);
        }
        if !is_unbounded(lb) {
            let _ = self.root.add_upper_bound(index.negated(), cap_neg(lb));
        }
    }

    pub fn add_upper_bound(&mut self, expression: LinearExpression2, ub: i64) {
        self.add(expression, MIN_INTEGER_VALUE, ub);
    }

    pub fn add_lower_bound(&mut self, expression: LinearExpression2, lb: i64) {
        self.add(expression, lb, MAX_INTEGER_VALUE);
    }

    /// Registers `enforcement => expression <= ub`; the fact becomes live
    /// whenever the whole enforcement list is true on the current branch.
    pub fn add_conditional_upper_bound(
        &mut self,
        enforcement: &[Literal],
        expression: LinearExpression2,
        ub: i64,
        enforcement_tracker: &mut EnforcementPropagator,
        booleans: &BooleanAssignments,
    ) {
        let (canonical, ub, _) = canonicalize(expression, ub);
        if canonical.is_empty() {
            return;
        }
        let index = self.index.get_or_create(canonical);

        let (enforcement_id, status) = enforcement_tracker.register(enforcement, booleans);
        match (enforcement_id, status) {
            // Settled true at the root: the fact is unconditional.
            (EnforcementId::ALWAYS_ENFORCED, _) => {
                let _ = self.root.add_upper_bound(index, ub);
            }
            (EnforcementId::NEVER_ENFORCED, _) => {}
            _ => {
                self.conditional
                    .entry(enforcement_id)
                    .or_default()
                    .push((index, ub));
                if status == EnforcementStatus::IsEnforced {
                    self.enforced.push_upper_bound(
                        index,
                        ub,
                        BoundSource::Enforcement(enforcement_id),
                    );
                }
            }
        }
    }

    /// Records the root fact `expression <= affine` derived from a loaded
    /// three-variable relation.
    pub fn add_ternary_upper_bound(
        &mut self,
        expression: LinearExpression2,
        affine: AffineExpression,
        integer_trail: &IntegerTrail,
    ) {
        let (canonical, _, divisor) = canonicalize(expression, 0);
        if canonical.is_empty() {
            return;
        }
        let index = self.index.get_or_create(canonical);
        self.ternary
            .add_upper_bound(index, affine, divisor, integer_trail);
    }

    /// Records the equivalence `literal <=> (expression <= ub)`.
    pub fn add_reified_upper_bound(
        &mut self,
        expression: LinearExpression2,
        ub: i64,
        literal: Literal,
    ) {
        let (canonical, ub, _) = canonicalize(expression, ub);
        if canonical.is_empty() {
            return;
        }
        let index = self.index.get_or_create(canonical);
        self.reified.add_equivalence(index, ub, literal);
    }

    /// Records the equality `expression == affine`.
    pub fn add_equality(&mut self, expression: LinearExpression2, affine: AffineExpression) {
        let (canonical, _, divisor) = canonicalize(expression, 0);
        if canonical.is_empty() || divisor != 1 {
            return;
        }
        let index = self.index.get_or_create(canonical);
        self.reified.add_equality(index, affine);
    }

    pub fn equality(&self, expression: LinearExpression2) -> Option<AffineExpression> {
        let (canonical, _, divisor) = canonicalize(expression, 0);
        if divisor != 1 {
            return None;
        }
        let index = self.index.get(&canonical)?;
        self.reified.equality(index).copied()
    }

    /// The tightest currently known upper bound on `expression`.
    pub fn upper_bound(&self, expression: LinearExpression2, integer_trail: &IntegerTrail) -> i64 {
        let (canonical, _, divisor) = canonicalize(expression, 0);
        cap_prod(divisor, self.canonical_upper_bound(&canonical, integer_trail))
    }

    pub fn get_status(
        &self,
        expression: LinearExpression2,
        ub: i64,
        integer_trail: &IntegerTrail,
    ) -> RelationStatus {
        let (canonical, target, _) = canonicalize(expression, ub);
        if self.canonical_upper_bound(&canonical, integer_trail) <= target {
            return RelationStatus::IsTrue;
        }
        let lower_bound =
            cap_neg(self.canonical_upper_bound(&canonical.negated(), integer_trail));
        if lower_bound > target {
            return RelationStatus::IsFalse;
        }
        RelationStatus::Unknown
    }

    /// Appends the reason `expression <= ub` holds, citing only the source
    /// which achieves the bound. Root facts need no citation at all.
    pub fn add_reason_for_upper_bound_lower_than(
        &self,
        expression: LinearExpression2,
        ub: i64,
        explanation: &mut Explanation,
        enforcement_tracker: &EnforcementPropagator,
        integer_trail: &IntegerTrail,
    ) {
        let (canonical, target, _) = canonicalize(expression, ub);
        if canonical.is_empty() || is_unbounded(target) {
            return;
        }

        if let Some(index) = self.index.get(&canonical) {
            if self.root.upper_bound(index) <= target {
                return;
            }
            if let Some(bound) = self.enforced.bound(index) {
                if bound.upper_bound <= target {
                    match &bound.source {
                        BoundSource::Enforcement(enforcement_id) => enforcement_tracker
                            .add_enforcement_reason(
                                *enforcement_id,
                                &mut explanation.literal_reason,
                            ),
                        BoundSource::Derived(reason) => {
                            explanation
                                .literal_reason
                                .extend_from_slice(&reason.literal_reason);
                            explanation
                                .integer_reason
                                .extend_from_slice(&reason.integer_reason);
                        }
                    }
                    return;
                }
            }
            if self.ternary.upper_bound(index, integer_trail) <= target {
                let (affine, _) = self.ternary.entry(index).expect("the bound is finite");
                if !affine.is_constant() {
                    explanation.integer_reason.push(IntegerLiteral::lower_or_equal(
                        affine.var,
                        integer_trail.upper_bound(affine.var),
                    ));
                }
                return;
            }
        }

        gourd_assert_moderate!(
            integer_trail.trivial_upper_bound(&canonical) <= target,
            "no source achieves the requested bound"
        );
        for var in canonical.vars {
            if !var.is_none() {
                explanation.integer_reason.push(IntegerLiteral::lower_or_equal(
                    var,
                    integer_trail.upper_bound(var),
                ));
            }
        }
    }

    /// The single write path for `expression <= ub` facts discovered by other
    /// propagators. Prefers an existing literal encoding, then a
    /// branch-scoped relation entry, then a plain bound push.
    pub fn enqueue_lower_or_equal(
        &mut self,
        expression: LinearExpression2,
        ub: i64,
        explanation: Explanation,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
    ) -> Result<(), Conflict> {
        let (canonical, target, _) = canonicalize(expression, ub);
        if canonical.is_empty() {
            return if target >= 0 {
                Ok(())
            } else {
                Err(explanation.into())
            };
        }

        if let Some(index) = self.index.get(&canonical) {
            if let Some((encoded, literal)) = self.reified.literal_for_upper_bound(index, target) {
                if encoded == target {
                    return booleans.enqueue(literal, explanation);
                }
            }
        }

        if let Some((_, var)) = canonical.single_term() {
            // A canonical single-term form has coefficient one.
            return integer_trail.enqueue(IntegerLiteral::lower_or_equal(var, target), explanation);
        }

        let index = self.index.get_or_create(canonical);
        if integer_trail.decision_level() == 0 {
            let _ = self.root.add_upper_bound(index, target);
        } else {
            self.enforced
                .push_upper_bound(index, target, BoundSource::Derived(explanation));
        }
        Ok(())
    }

    /// Absorbs enforcement status changes, activating the conditional facts
    /// whose lists just became fully true. Deactivation needs no work here:
    /// backtracking pops the enforced store through [`set_level`].
    ///
    /// [`set_level`]: Revertible::set_level
    pub fn propagate(
        &mut self,
        enforcement_tracker: &mut EnforcementPropagator,
        booleans: &BooleanAssignments,
    ) {
        enforcement_tracker.propagate(booleans);
        for (enforcement_id, status) in enforcement_tracker.take_status_changes() {
            if status != EnforcementStatus::IsEnforced {
                continue;
            }
            let Some(facts) = self.conditional.get(&enforcement_id) else {
                continue;
            };
            for &(index, ub) in facts {
                self.enforced
                    .push_upper_bound(index, ub, BoundSource::Enforcement(enforcement_id));
            }
        }
    }

    fn canonical_upper_bound(
        &self,
        canonical: &LinearExpression2,
        integer_trail: &IntegerTrail,
    ) -> i64 {
        let mut bound = integer_trail.trivial_upper_bound(canonical);
        if let Some(index) = self.index.get(canonical) {
            bound = bound.min(self.root.upper_bound(index));
            bound = bound.min(self.enforced.upper_bound(index));
            bound = bound.min(self.ternary.upper_bound(index, integer_trail));
        }
        bound
    }
}

impl Revertible for RelationRepository {
    fn set_level(&mut self, level: u32) {
        self.enforced.set_level(level);
    }
}

fn canonicalize(expression: LinearExpression2, ub: i64) -> (LinearExpression2, i64, i64) {
    let mut canonical = expression;
    let mut lb = MIN_INTEGER_VALUE;
    let mut ub = ub;
    let divisor = canonical.canonicalize_with_bounds(&mut lb, &mut ub);
    (canonical, ub, divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::IntegerVariable;

    struct Harness {
        integer_trail: IntegerTrail,
        booleans: BooleanAssignments,
        enforcement_tracker: EnforcementPropagator,
        repository: RelationRepository,
        x: IntegerVariable,
        y: IntegerVariable,
    }

    impl Harness {
        fn new() -> Harness {
            let mut integer_trail = IntegerTrail::default();
            let x = integer_trail.new_variable(0, 100);
            let y = integer_trail.new_variable(0, 100);
            Harness {
                integer_trail,
                booleans: BooleanAssignments::default(),
                enforcement_tracker: EnforcementPropagator::default(),
                repository: RelationRepository::default(),
                x,
                y,
            }
        }

        fn set_level(&mut self, level: u32) {
            self.booleans.set_level(level);
            self.integer_trail.set_level(level);
            self.enforcement_tracker.set_level(level, &self.booleans);
            self.repository.set_level(level);
        }

        fn upper_bound(&self, expression: LinearExpression2) -> i64 {
            self.repository.upper_bound(expression, &self.integer_trail)
        }
    }

    #[test]
    fn conditional_bounds_shadow_root_bounds_until_backtrack() {
        let mut harness = Harness::new();
        let difference = LinearExpression2::difference(harness.x, harness.y);
        let lit = harness.booleans.new_literal();

        harness.repository.add_upper_bound(difference, 5);
        harness.repository.add_conditional_upper_bound(
            &[lit],
            difference,
            2,
            &mut harness.enforcement_tracker,
            &harness.booleans,
        );
        assert_eq!(harness.upper_bound(difference), 5);

        harness.set_level(1);
        harness.booleans.enqueue(lit, Explanation::default()).unwrap();
        harness
            .repository
            .propagate(&mut harness.enforcement_tracker, &harness.booleans);
        assert_eq!(harness.upper_bound(difference), 2);

        let mut explanation = Explanation::default();
        harness.repository.add_reason_for_upper_bound_lower_than(
            difference,
            2,
            &mut explanation,
            &harness.enforcement_tracker,
            &harness.integer_trail,
        );
        assert_eq!(explanation.literal_reason, vec![!lit]);

        // Root facts are free: the looser bound needs no citation.
        let mut explanation = Explanation::default();
        harness.repository.add_reason_for_upper_bound_lower_than(
            difference,
            5,
            &mut explanation,
            &harness.enforcement_tracker,
            &harness.integer_trail,
        );
        assert!(explanation.is_empty());

        harness.set_level(0);
        assert_eq!(harness.upper_bound(difference), 5);
    }

    #[test]
    fn gcd_tightening_is_visible_through_the_aggregator() {
        let mut harness = Harness::new();
        let expression = LinearExpression2::new(2, harness.x, 4, harness.y);

        // 2x + 4y <= 9 canonicalizes to x + 2y <= 4, so only 8 is achievable.
        harness.repository.add_upper_bound(expression, 9);
        assert_eq!(harness.upper_bound(expression), 8);
    }

    #[test]
    fn status_reflects_both_bound_directions() {
        let mut harness = Harness::new();
        let difference = LinearExpression2::difference(harness.x, harness.y);

        harness.repository.add_upper_bound(difference, 5);
        harness.repository.add_lower_bound(difference, 0);

        let status = |harness: &Harness, bound: i64| {
            harness
                .repository
                .get_status(difference, bound, &harness.integer_trail)
        };
        assert_eq!(status(&harness, 7), RelationStatus::IsTrue);
        assert_eq!(status(&harness, 4), RelationStatus::Unknown);
        assert_eq!(status(&harness, -1), RelationStatus::IsFalse);
    }

    #[test]
    fn ternary_bounds_join_the_minimum_and_cite_the_third_variable() {
        let mut harness = Harness::new();
        let z = harness.integer_trail.new_variable(0, 5);
        let difference = LinearExpression2::difference(harness.x, harness.y);

        // x - y <= z, loaded from a ternary relation.
        harness.repository.add_ternary_upper_bound(
            difference,
            AffineExpression::new(z, 1, 0),
            &harness.integer_trail,
        );
        assert_eq!(harness.upper_bound(difference), 5);

        let mut explanation = Explanation::default();
        harness.repository.add_reason_for_upper_bound_lower_than(
            difference,
            5,
            &mut explanation,
            &harness.enforcement_tracker,
            &harness.integer_trail,
        );
        assert_eq!(
            explanation.integer_reason,
            vec![IntegerLiteral::lower_or_equal(z, 5)]
        );
    }

    #[test]
    fn enqueue_prefers_an_exact_literal_encoding() {
        let mut harness = Harness::new();
        let difference = LinearExpression2::difference(harness.x, harness.y);
        let lit = harness.booleans.new_literal();

        harness.repository.add_reified_upper_bound(difference, 3, lit);
        harness
            .repository
            .enqueue_lower_or_equal(
                difference,
                3,
                Explanation::default(),
                &mut harness.integer_trail,
                &mut harness.booleans,
            )
            .unwrap();

        assert!(harness.booleans.is_true(lit));
    }

    #[test]
    fn enqueue_of_a_single_term_pushes_the_variable_bound() {
        let mut harness = Harness::new();
        let expression = LinearExpression2::new(2, harness.x, 0, IntegerVariable::NONE);

        harness
            .repository
            .enqueue_lower_or_equal(
                expression,
                9,
                Explanation::default(),
                &mut harness.integer_trail,
                &mut harness.booleans,
            )
            .unwrap();

        // 2x <= 9 tightens to x <= 4.
        assert_eq!(harness.integer_trail.upper_bound(harness.x), 4);
    }

    #[test]
    fn enqueue_of_a_two_variable_fact_is_scoped_to_the_branch() {
        let mut harness = Harness::new();
        let difference = LinearExpression2::difference(harness.x, harness.y);

        harness.set_level(1);
        harness
            .repository
            .enqueue_lower_or_equal(
                difference,
                3,
                Explanation::from_integer_reason(vec![IntegerLiteral::greater_or_equal(
                    harness.y, 7,
                )]),
                &mut harness.integer_trail,
                &mut harness.booleans,
            )
            .unwrap();
        assert_eq!(harness.upper_bound(difference), 3);

        let mut explanation = Explanation::default();
        harness.repository.add_reason_for_upper_bound_lower_than(
            difference,
            3,
            &mut explanation,
            &harness.enforcement_tracker,
            &harness.integer_trail,
        );
        assert_eq!(
            explanation.integer_reason,
            vec![IntegerLiteral::greater_or_equal(harness.y, 7)]
        );

        harness.set_level(0);
        assert_eq!(harness.upper_bound(difference), 100);
    }
}
