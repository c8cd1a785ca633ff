#![allow(clippy::double_parens, reason = "originates inside the bitfield macro")]

use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use bitfield_struct::bitfield;
use fnv::FnvHashMap;
use itertools::Itertools;
use log::debug;
use log::trace;

use crate::basic_types::Conflict;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Explanation;
use crate::basic_types::Revertible;
use crate::basic_types::TrailedInteger;
use crate::basic_types::TrailedValues;
use crate::booleans::BooleanAssignments;
use crate::booleans::Literal;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::create_statistics_struct;
use crate::enforcement::EnforcementId;
use crate::enforcement::EnforcementPropagator;
use crate::enforcement::EnforcementStatus;
use crate::gourd_assert_simple;
use crate::linear::order::PropagationOrder;
use crate::math::saturating::cap_add;
use crate::math::saturating::cap_prod;
use crate::math::saturating::cap_sub;
use crate::state::IntegerTrail;
use crate::state::WatcherId;
use crate::statistics::Statistic;
use crate::statistics::StatisticLogger;
use crate::variables::IntegerLiteral;
use crate::variables::IntegerVariable;

/// The index of a registered linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintIndex {
    index: u32,
}

impl StorageKey for ConstraintIndex {
    fn index(&self) -> usize {
        self.index as usize
    }

    fn create_from_index(index: usize) -> Self {
        ConstraintIndex {
            index: index as u32,
        }
    }
}

impl std::fmt::Display for ConstraintIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.index)
    }
}

/// The immutable part of a per-constraint record.
///
/// The term data itself lives in shared side buffers addressed by
/// `(start, initial_size)`, keeping this record a fixed size regardless of
/// arity. The two mutable per-constraint fields (current window size and
/// currently achievable right-hand side) live in [`TrailedValues`] so that
/// backtracking restores them exactly.
#[bitfield(u64)]
struct ConstraintInfo {
    all_coeffs_are_one: bool,
    #[bits(31)]
    start: u32,
    #[bits(16)]
    initial_size: u16,
    #[bits(16)]
    __: u16,
}

create_statistics_struct!(LinearStatistics {
    num_propagations: usize,
    num_enforcement_propagations: usize,
    num_conflicts: usize,
    num_cycles_detected: usize,
});

/// The incremental propagator for constraints `sum(coeff_i * var_i) <= rhs`
/// guarded by enforcement literals.
///
/// Terms are stored with positive coefficients over possibly-negated
/// variables. For each enforced constraint the engine maintains
/// `slack = rhs - sum(coeff_i * lower_bound(var_i))`: negative slack pushes
/// the last unassigned guard false or reports a conflict, non-negative slack
/// tightens each variable's upper bound to
/// `lower_bound(var_i) + slack / coeff_i`.
///
/// Terms whose variable is fixed are swapped to the end of the constraint's
/// buffer window and their contribution folded into the reversible right-hand
/// side. The swaps themselves are never undone: restoring the window size on
/// backtrack recovers the correct term set, and order within the window does
/// not matter.
pub struct LinearPropagator {
    infos: KeyedVec<ConstraintIndex, ConstraintInfo>,
    enforcement_ids: KeyedVec<ConstraintIndex, EnforcementId>,
    /// The number of not-yet-fixed terms at the front of each window.
    rev_sizes: KeyedVec<ConstraintIndex, TrailedInteger>,
    /// The right-hand side minus the contributions of the fixed terms.
    rev_rhs: KeyedVec<ConstraintIndex, TrailedInteger>,
    trailed_values: TrailedValues,
    vars: Vec<IntegerVariable>,
    coeffs: Vec<i64>,
    enforcement_to_constraint: FnvHashMap<EnforcementId, ConstraintIndex>,
    watching: FnvHashMap<IntegerVariable, Vec<ConstraintIndex>>,
    watcher: WatcherId,
    order: PropagationOrder,
    /// Which constraint last pushed each variable's lower bound; only
    /// maintained for unit-coefficient binary constraints, where the chain is
    /// walked to classify propagation cycles. A cache, cleared on backtrack.
    propagated_by: FnvHashMap<IntegerVariable, ConstraintIndex>,
    stop: Option<Arc<AtomicBool>>,
    /// Latched on the first conflict at decision level zero; once the model
    /// is infeasible, further additions are rejected outright.
    root_infeasible: bool,
    statistics: LinearStatistics,
}

impl LinearPropagator {
    pub fn new(integer_trail: &mut IntegerTrail) -> LinearPropagator {
        LinearPropagator {
            infos: KeyedVec::default(),
            enforcement_ids: KeyedVec::default(),
            rev_sizes: KeyedVec::default(),
            rev_rhs: KeyedVec::default(),
            trailed_values: TrailedValues::default(),
            vars: Vec::new(),
            coeffs: Vec::new(),
            enforcement_to_constraint: FnvHashMap::default(),
            watching: FnvHashMap::default(),
            watcher: integer_trail.register_watcher(),
            order: PropagationOrder::default(),
            propagated_by: FnvHashMap::default(),
            stop: None,
            root_infeasible: false,
            statistics: LinearStatistics::default(),
        }
    }

    /// Installs an externally-set stop flag; once raised, the next
    /// [`propagate`] call returns without examining further constraints.
    /// Pushes made before the flag was observed are not rolled back.
    ///
    /// [`propagate`]: LinearPropagator::propagate
    pub fn set_stop_flag(&mut self, stop: Arc<AtomicBool>) {
        self.stop = Some(stop);
    }

    pub fn log_statistics(&self, statistic_logger: StatisticLogger) {
        self.statistics.log(statistic_logger);
    }

    pub fn statistics(&self) -> &LinearStatistics {
        &self.statistics
    }

    /// Registers the constraint `sum(coeff_i * var_i) <= rhs`, active once
    /// all of `enforcement` is true.
    ///
    /// Terms over the same variable pair are merged and zero coefficients
    /// dropped; a degenerate term list reduces to a trivially true or
    /// trivially false constraint rather than an error. An immediate conflict
    /// is returned with its reason attached and marks the model infeasible;
    /// every later addition is then rejected.
    pub fn add_constraint(
        &mut self,
        enforcement: &[Literal],
        terms: &[(IntegerVariable, i64)],
        rhs: i64,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), ConstraintOperationError> {
        gourd_assert_simple!(
            integer_trail.decision_level() == 0,
            "constraints are added at the root"
        );
        if self.root_infeasible {
            return Err(ConstraintOperationError::InfeasibleState);
        }

        // Merge duplicate variables onto the positive variable of each pair;
        // a variable and its own negation cancel.
        let mut merged: FnvHashMap<usize, i64> = FnvHashMap::default();
        for &(var, coeff) in terms {
            if var.is_none() || coeff == 0 {
                continue;
            }
            let signed = if var.is_positive() { coeff } else { -coeff };
            *merged.entry(var.pair_index()).or_insert(0) += signed;
        }
        let canonical = merged
            .into_iter()
            .filter(|&(_, coeff)| coeff != 0)
            .map(|(pair, coeff)| {
                let var = IntegerVariable::from_pair_index(pair);
                if coeff > 0 {
                    (var, coeff)
                } else {
                    (var.negated(), -coeff)
                }
            })
            .sorted_by_key(|&(var, _)| var.id())
            .collect::<Vec<_>>();

        if canonical.is_empty() && rhs >= 0 {
            return Ok(());
        }

        let (enforcement_id, status) = enforcement_tracker.register(enforcement, booleans);
        if status == EnforcementStatus::IsFalse {
            return Ok(());
        }

        gourd_assert_simple!(canonical.len() < u16::MAX as usize);
        let start = self.vars.len();
        let all_ones = canonical.iter().all(|&(_, coeff)| coeff == 1);
        for &(var, coeff) in &canonical {
            self.vars.push(var);
            self.coeffs.push(coeff);
        }

        let index = self.infos.push(
            ConstraintInfo::new()
                .with_all_coeffs_are_one(all_ones)
                .with_start(start as u32)
                .with_initial_size(canonical.len() as u16),
        );
        let _ = self.enforcement_ids.push(enforcement_id);
        let _ = self
            .rev_sizes
            .push(self.trailed_values.grow(canonical.len() as i64));
        let _ = self.rev_rhs.push(self.trailed_values.grow(rhs));
        let order_index = self.order.grow();
        gourd_assert_simple!(order_index == index);

        if !enforcement_id.is_settled() {
            let _ = self.enforcement_to_constraint.insert(enforcement_id, index);
        }
        for &(var, _) in &canonical {
            integer_trail.watch_lower_bound(var, self.watcher);
            self.watching.entry(var).or_default().push(index);
        }

        self.remove_fixed_terms(index, integer_trail);
        let slack = self.slack(index, integer_trail);
        if slack < 0 {
            match self.handle_violation(index, slack, booleans, integer_trail, enforcement_tracker)
            {
                Ok(()) => Ok(()),
                Err(conflict) => {
                    self.statistics.num_conflicts += 1;
                    self.root_infeasible = true;
                    Err(ConstraintOperationError::RootConflict(conflict))
                }
            }
        } else {
            if status == EnforcementStatus::IsEnforced {
                self.order.schedule(index);
            }
            Ok(())
        }
    }

    /// Propagates to a fixed point or the first conflict.
    pub fn propagate(
        &mut self,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        let result = self.propagate_inner(integer_trail, booleans, enforcement_tracker);
        if let Err(conflict) = &result {
            self.statistics.num_conflicts += 1;
            if integer_trail.decision_level() == 0 {
                self.root_infeasible = true;
            }
            debug!("linear conflict: {:?}", conflict.explanation);
        }
        result
    }

    fn propagate_inner(
        &mut self,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        loop {
            if self.stop_requested() {
                return Ok(());
            }
            enforcement_tracker.propagate(booleans);
            self.absorb_events(integer_trail, booleans, enforcement_tracker)?;
            let Some(index) = self.select_next() else {
                return Ok(());
            };
            self.propagate_constraint(index, integer_trail, booleans, enforcement_tracker)?;
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }

    /// Turns enforcement status changes and variable bound changes into
    /// scheduled constraints or immediate guard propagation.
    fn absorb_events(
        &mut self,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        for (enforcement_id, status) in enforcement_tracker.take_status_changes() {
            let Some(&index) = self.enforcement_to_constraint.get(&enforcement_id) else {
                continue;
            };
            match status {
                EnforcementStatus::IsEnforced => self.order.schedule(index),
                EnforcementStatus::CanPropagate => {
                    self.check_violation(index, integer_trail, booleans, enforcement_tracker)?
                }
                EnforcementStatus::IsFalse | EnforcementStatus::CannotPropagate => {}
            }
        }

        for var in integer_trail.drain_modified(self.watcher) {
            let Some(watchers) = self.watching.get(&var) else {
                continue;
            };
            for index in watchers.clone() {
                match enforcement_tracker.status(self.enforcement_ids[index]) {
                    EnforcementStatus::IsEnforced => self.order.schedule(index),
                    EnforcementStatus::CanPropagate => {
                        self.check_violation(index, integer_trail, booleans, enforcement_tracker)?
                    }
                    EnforcementStatus::IsFalse | EnforcementStatus::CannotPropagate => {}
                }
            }
        }
        Ok(())
    }

    fn select_next(&mut self) -> Option<ConstraintIndex> {
        let LinearPropagator {
            ref mut order,
            ref vars,
            ref infos,
            ref rev_sizes,
            ref trailed_values,
            ..
        } = *self;
        order.next_id(|index| {
            let start = infos[index].start() as usize;
            let size = trailed_values.read(rev_sizes[index]) as usize;
            vars[start..start + size].iter().copied()
        })
    }

    fn propagate_constraint(
        &mut self,
        index: ConstraintIndex,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        self.remove_fixed_terms(index, integer_trail);
        let slack = self.slack(index, integer_trail);
        if slack < 0 {
            return self.handle_violation(index, slack, booleans, integer_trail, enforcement_tracker);
        }

        let enforcement_id = self.enforcement_ids[index];
        if enforcement_tracker.status(enforcement_id) != EnforcementStatus::IsEnforced {
            return Ok(());
        }

        let info = self.infos[index];
        let start = info.start() as usize;
        let size = self.trailed_values.read(self.rev_sizes[index]) as usize;
        for position in 0..size {
            let var = self.vars[start + position];
            let coeff = self.coeffs[start + position];
            let lower_bound = integer_trail.lower_bound(var);
            let new_upper_bound = cap_add(lower_bound, slack / coeff);
            if new_upper_bound >= integer_trail.upper_bound(var) {
                continue;
            }

            let mut explanation = Explanation::default();
            enforcement_tracker.add_enforcement_reason(enforcement_id, &mut explanation.literal_reason);
            for other in 0..info.initial_size() as usize {
                if other == position {
                    continue;
                }
                let other_var = self.vars[start + other];
                explanation.integer_reason.push(IntegerLiteral::greater_or_equal(
                    other_var,
                    integer_trail.lower_bound(other_var),
                ));
            }

            trace!("{index} pushes {var} <= {new_upper_bound}");
            integer_trail.enqueue(IntegerLiteral::lower_or_equal(var, new_upper_bound), explanation)?;
            self.statistics.num_propagations += 1;

            let target = var.negated();
            self.order.credit(target, index);
            if info.all_coeffs_are_one() && info.initial_size() == 2 {
                let _ = self.propagated_by.insert(target, index);
                self.detect_cycle(target, enforcement_tracker)?;
            }
        }
        Ok(())
    }

    /// Re-examines a constraint whose guard reached `CanPropagate`: a
    /// violated body pushes the remaining guard false.
    fn check_violation(
        &mut self,
        index: ConstraintIndex,
        integer_trail: &mut IntegerTrail,
        booleans: &mut BooleanAssignments,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        self.remove_fixed_terms(index, integer_trail);
        let slack = self.slack(index, integer_trail);
        if slack < 0 {
            self.handle_violation(index, slack, booleans, integer_trail, enforcement_tracker)
        } else {
            Ok(())
        }
    }

    fn handle_violation(
        &mut self,
        index: ConstraintIndex,
        slack: i64,
        booleans: &mut BooleanAssignments,
        integer_trail: &IntegerTrail,
        enforcement_tracker: &mut EnforcementPropagator,
    ) -> Result<(), Conflict> {
        let explanation = self.violation_explanation(index, slack, integer_trail);
        let enforcement_id = self.enforcement_ids[index];
        match enforcement_tracker.status(enforcement_id) {
            EnforcementStatus::IsEnforced => {
                let mut explanation = explanation;
                enforcement_tracker
                    .add_enforcement_reason(enforcement_id, &mut explanation.literal_reason);
                Err(explanation.into())
            }
            EnforcementStatus::CanPropagate => {
                self.statistics.num_enforcement_propagations += 1;
                enforcement_tracker.propagate_when_false(enforcement_id, &explanation, booleans)
            }
            EnforcementStatus::IsFalse | EnforcementStatus::CannotPropagate => Ok(()),
        }
    }

    /// The reason the constraint body is violated, relaxed: terms are dropped
    /// widest-margin-first (margin = how far the term's bound is above its
    /// root bound) while the remaining terms still witness the violation.
    /// Terms still at their root bound carry no information and are always
    /// free to drop.
    fn violation_explanation(
        &self,
        index: ConstraintIndex,
        slack: i64,
        integer_trail: &IntegerTrail,
    ) -> Explanation {
        let info = self.infos[index];
        let start = info.start() as usize;
        let mut budget = -slack - 1;

        let terms = (0..info.initial_size() as usize).map(|position| {
            let var = self.vars[start + position];
            let lower_bound = integer_trail.lower_bound(var);
            let margin = cap_prod(
                self.coeffs[start + position],
                cap_sub(lower_bound, integer_trail.root_lower_bound(var)),
            );
            (margin, var, lower_bound)
        });

        let mut integer_reason = Vec::new();
        for (margin, var, lower_bound) in terms.sorted_by_key(|&(margin, _, _)| Reverse(margin)) {
            if margin <= budget {
                budget -= margin;
            } else {
                integer_reason.push(IntegerLiteral::greater_or_equal(var, lower_bound));
            }
        }
        Explanation::from_integer_reason(integer_reason)
    }

    /// Swaps terms over fixed variables to the end of the window, folding
    /// their contribution into the reversible right-hand side.
    fn remove_fixed_terms(&mut self, index: ConstraintIndex, integer_trail: &IntegerTrail) {
        let start = self.infos[index].start() as usize;
        let mut size = self.trailed_values.read(self.rev_sizes[index]);
        let mut rhs = self.trailed_values.read(self.rev_rhs[index]);

        let mut position = 0;
        while (position as i64) < size {
            let var = self.vars[start + position];
            if integer_trail.is_fixed(var) {
                let value = integer_trail.lower_bound(var);
                rhs = cap_sub(rhs, cap_prod(self.coeffs[start + position], value));
                size -= 1;
                self.vars.swap(start + position, start + size as usize);
                self.coeffs.swap(start + position, start + size as usize);
            } else {
                position += 1;
            }
        }

        self.trailed_values.assign(self.rev_sizes[index], size);
        self.trailed_values.assign(self.rev_rhs[index], rhs);
    }

    fn slack(&self, index: ConstraintIndex, integer_trail: &IntegerTrail) -> i64 {
        let start = self.infos[index].start() as usize;
        let size = self.trailed_values.read(self.rev_sizes[index]) as usize;
        let mut slack = self.trailed_values.read(self.rev_rhs[index]);
        for position in 0..size {
            slack = cap_sub(
                slack,
                cap_prod(
                    self.coeffs[start + position],
                    integer_trail.lower_bound(self.vars[start + position]),
                ),
            );
        }
        slack
    }

    /// Walks the last-pusher chain from `start` over unit-coefficient binary
    /// constraints. A closed chain is a propagation cycle: strictly positive
    /// net weight is infeasible on its own, while zero weight proves
    /// equalities and is resolved by detaching the chain's credits.
    fn detect_cycle(
        &mut self,
        start: IntegerVariable,
        enforcement_tracker: &EnforcementPropagator,
    ) -> Result<(), Conflict> {
        let mut chain: Vec<(IntegerVariable, ConstraintIndex)> = Vec::new();
        let mut total_rhs: i64 = 0;
        let mut var = start;
        loop {
            let Some(&index) = self.propagated_by.get(&var) else {
                return Ok(());
            };
            if self.trailed_values.read(self.rev_sizes[index]) != 2 {
                return Ok(());
            }
            let window_start = self.infos[index].start() as usize;
            let window = [self.vars[window_start], self.vars[window_start + 1]];
            // The row is w0 + w1 <= rhs; pushing lower_bound(var) means var
            // is the negation of one slot, the other slot is the source.
            let Some(target_slot) = window.iter().position(|w| w.negated() == var) else {
                return Ok(());
            };
            chain.push((var, index));
            total_rhs = cap_add(total_rhs, self.trailed_values.read(self.rev_rhs[index]));

            var = window[1 - target_slot];
            if var == start {
                self.statistics.num_cycles_detected += 1;
                if total_rhs < 0 {
                    // Going around the cycle raises the bound by -total_rhs
                    // every time; the bound literals cancel out, so the cycle
                    // is infeasible under its enforcement alone.
                    let mut explanation = Explanation::default();
                    for &(_, cycle_index) in &chain {
                        enforcement_tracker.add_enforcement_reason(
                            self.enforcement_ids[cycle_index],
                            &mut explanation.literal_reason,
                        );
                    }
                    explanation.literal_reason =
                        explanation.literal_reason.into_iter().unique().collect();
                    debug!("positive-weight cycle over {} constraints", chain.len());
                    return Err(explanation.into());
                }
                for (cycle_var, _) in chain {
                    let _ = self.propagated_by.remove(&cycle_var);
                    self.order.uncredit(cycle_var);
                }
                return Ok(());
            }
            if chain.len() > self.infos.len() {
                return Ok(());
            }
        }
    }
}

impl Revertible for LinearPropagator {
    fn set_level(&mut self, level: u32) {
        let current = self.trailed_values.get_checkpoint() as u32;
        if level > current {
            for _ in current..level {
                self.trailed_values.new_checkpoint();
            }
        } else if level < current {
            self.trailed_values.synchronise(level as usize);
            // The queue and push credits are caches, rebuilt lazily.
            self.order.clear();
            self.propagated_by.clear();
        }
    }
}

impl std::fmt::Debug for LinearPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearPropagator")
            .field("num_constraints", &self.infos.len())
            .field("statistics", &self.statistics)
            .finish()
    }
}
