use fnv::FnvHashMap;

use crate::basic_types::Conflict;
use crate::basic_types::Explanation;
use crate::basic_types::Trail;
use crate::booleans::BooleanAssignments;
use crate::booleans::Literal;
use crate::booleans::PropositionalVariable;
use crate::containers::KeyedVec;
use crate::containers::StorageKey;
use crate::gourd_assert_moderate;
use crate::gourd_assert_simple;

/// The stable id of a registered enforcement list.
///
/// Negative ids mark lists which were permanently settled at the root and
/// have no tracked state: [`EnforcementId::ALWAYS_ENFORCED`] for empty or
/// root-true lists, [`EnforcementId::NEVER_ENFORCED`] for lists with a
/// root-false literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnforcementId {
    id: i32,
}

impl EnforcementId {
    pub const ALWAYS_ENFORCED: EnforcementId = EnforcementId { id: -1 };
    pub const NEVER_ENFORCED: EnforcementId = EnforcementId { id: -2 };

    pub fn is_settled(self) -> bool {
        self.id < 0
    }
}

impl StorageKey for EnforcementId {
    fn index(&self) -> usize {
        gourd_assert_moderate!(self.id >= 0, "settled enforcement ids have no storage");
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        EnforcementId { id: index as i32 }
    }
}

impl std::fmt::Display for EnforcementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.id)
    }
}

/// The activation status of an enforcement list.
///
/// `IsFalse` and `IsEnforced` are absorbing until backtrack. The remaining
/// two states count unassigned literals: at least two, or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementStatus {
    /// At least one literal is false; the constraint can be ignored.
    IsFalse,
    /// Two or more literals are unassigned.
    CannotPropagate,
    /// Exactly one literal is unassigned: a violated constraint body can
    /// push that literal false.
    CanPropagate,
    /// All literals are true; the constraint must hold.
    IsEnforced,
}

#[derive(Debug, Clone, Copy)]
struct LiteralSpan {
    start: u32,
    size: u32,
}

const NUM_WATCHED_LITERALS: usize = 2;

/// Maintains the [`EnforcementStatus`] of every registered literal list.
///
/// Only the first [`NUM_WATCHED_LITERALS`] buffer positions of each list are
/// watched; when a watched literal is assigned, an unassigned replacement is
/// swapped into its slot, or the state transition is concluded. Buffer swaps
/// are never reverted: after backtrack any unassigned pair of literals is a
/// valid watcher set. Status changes are exact, restored from a trail in
/// reverse order on backtrack.
///
/// Subscribers observe changes through [`take_status_changes`]; the queue
/// replays untrailed statuses as well, in reverse assignment order.
///
/// [`take_status_changes`]: EnforcementPropagator::take_status_changes
#[derive(Default, Debug)]
pub struct EnforcementPropagator {
    literal_buffer: Vec<Literal>,
    spans: KeyedVec<EnforcementId, LiteralSpan>,
    statuses: KeyedVec<EnforcementId, EnforcementStatus>,
    watch_lists: FnvHashMap<PropositionalVariable, Vec<EnforcementId>>,
    /// How far into the Boolean trail assignments have been processed.
    processed_trail_index: usize,
    status_trail: Trail<(EnforcementId, EnforcementStatus)>,
    changes: Vec<(EnforcementId, EnforcementStatus)>,
}

impl EnforcementPropagator {
    /// Registers a guarded constraint and returns its id and initial status.
    ///
    /// Lists settled at the root get a negative id and no tracked state. For
    /// tracked lists, an initial status other than
    /// [`EnforcementStatus::CannotPropagate`] is also reported through the
    /// change queue immediately, so a subscriber registering constraints one
    /// by one sees the same notifications as for later transitions.
    pub fn register(
        &mut self,
        literals: &[Literal],
        booleans: &BooleanAssignments,
    ) -> (EnforcementId, EnforcementStatus) {
        gourd_assert_simple!(
            booleans.decision_level() == 0,
            "enforcement lists are registered at the root"
        );

        if literals.iter().any(|&literal| booleans.is_false(literal)) {
            return (EnforcementId::NEVER_ENFORCED, EnforcementStatus::IsFalse);
        }

        let mut span_literals = literals
            .iter()
            .copied()
            .filter(|&literal| !booleans.is_true(literal))
            .collect::<Vec<_>>();
        if span_literals.is_empty() {
            return (EnforcementId::ALWAYS_ENFORCED, EnforcementStatus::IsEnforced);
        }

        // Root-true literals were dropped above, so every remaining literal
        // is unassigned.
        let status = if span_literals.len() == 1 {
            EnforcementStatus::CanPropagate
        } else {
            EnforcementStatus::CannotPropagate
        };

        let start = self.literal_buffer.len() as u32;
        let size = span_literals.len() as u32;
        self.literal_buffer.append(&mut span_literals);

        let id = self.spans.push(LiteralSpan { start, size });
        let status_id = self.statuses.push(status);
        gourd_assert_simple!(id == status_id);

        for position in 0..NUM_WATCHED_LITERALS.min(size as usize) {
            self.watch(self.literal_buffer[start as usize + position], id);
        }

        if status != EnforcementStatus::CannotPropagate {
            self.changes.push((id, status));
        }
        (id, status)
    }

    pub fn status(&self, id: EnforcementId) -> EnforcementStatus {
        match id {
            EnforcementId::ALWAYS_ENFORCED => EnforcementStatus::IsEnforced,
            EnforcementId::NEVER_ENFORCED => EnforcementStatus::IsFalse,
            id => self.statuses[id],
        }
    }

    /// Appends the (negated) enforcement literals of `id` to a reason.
    ///
    /// The negations justify a deduction made under this enforcement: the
    /// deduction holds unless one of the guards is false.
    pub fn add_enforcement_reason(&self, id: EnforcementId, literal_reason: &mut Vec<Literal>) {
        if id.is_settled() {
            return;
        }
        for literal in self.span(id) {
            literal_reason.push(!*literal);
        }
    }

    /// Asserts that the body guarded by `id` is contradictory.
    ///
    /// With exactly one guard unassigned, its negation is pushed with the
    /// other (true) guards and `extra` as reason. With all guards true this
    /// is a conflict. A false guard needs no action.
    pub fn propagate_when_false(
        &mut self,
        id: EnforcementId,
        extra: &Explanation,
        booleans: &mut BooleanAssignments,
    ) -> Result<(), Conflict> {
        match self.status(id) {
            EnforcementStatus::IsFalse => Ok(()),
            EnforcementStatus::IsEnforced => {
                let mut explanation = extra.clone();
                self.add_enforcement_reason(id, &mut explanation.literal_reason);
                Err(explanation.into())
            }
            EnforcementStatus::CanPropagate => {
                let unassigned = self
                    .span(id)
                    .iter()
                    .copied()
                    .find(|&literal| !booleans.is_assigned(literal));
                let Some(unassigned) = unassigned else {
                    // The cached status can run ahead of the Boolean trail
                    // between propagation calls; the transition to
                    // IsEnforced will be processed on the next propagate.
                    let mut explanation = extra.clone();
                    self.add_enforcement_reason(id, &mut explanation.literal_reason);
                    return Err(explanation.into());
                };

                let mut reason = extra.clone();
                for literal in self.span(id) {
                    if *literal != unassigned {
                        reason.literal_reason.push(!*literal);
                    }
                }
                booleans.enqueue(!unassigned, reason)
            }
            EnforcementStatus::CannotPropagate => {
                gourd_assert_moderate!(
                    false,
                    "propagate_when_false requires at most one unassigned guard"
                );
                Ok(())
            }
        }
    }

    /// Processes Boolean trail entries assigned since the last call and
    /// updates statuses and watchers.
    pub fn propagate(&mut self, booleans: &BooleanAssignments) {
        while self.processed_trail_index < booleans.trail_len() {
            let literal = booleans.trail_entry(self.processed_trail_index);
            self.processed_trail_index += 1;
            self.on_variable_assigned(literal.get_variable(), booleans);
        }
    }

    /// Takes the status changes accumulated since the last call.
    pub fn take_status_changes(&mut self) -> Vec<(EnforcementId, EnforcementStatus)> {
        std::mem::take(&mut self.changes)
    }

    /// Restores the statuses changed past `level`, replaying them into the
    /// change queue in reverse.
    pub fn set_level(&mut self, level: u32, booleans: &BooleanAssignments) {
        let current = self.status_trail.get_checkpoint() as u32;
        if level > current {
            for _ in current..level {
                self.status_trail.new_checkpoint();
            }
        } else if level < current {
            let restored = self
                .status_trail
                .synchronise(level as usize)
                .collect::<Vec<_>>();
            for (id, old_status) in restored {
                self.statuses[id] = old_status;
                self.changes.push((id, old_status));
            }
        }
        self.processed_trail_index = self.processed_trail_index.min(booleans.trail_len());
    }

    fn span(&self, id: EnforcementId) -> &[Literal] {
        let span = self.spans[id];
        &self.literal_buffer[span.start as usize..(span.start + span.size) as usize]
    }

    fn watch(&mut self, literal: Literal, id: EnforcementId) {
        let watchers = self.watch_lists.entry(literal.get_variable()).or_default();
        if !watchers.contains(&id) {
            watchers.push(id);
        }
    }

    fn set_status(&mut self, id: EnforcementId, status: EnforcementStatus) {
        let old_status = self.statuses[id];
        if old_status == status {
            return;
        }
        self.status_trail.push((id, old_status));
        self.statuses[id] = status;
        self.changes.push((id, status));
    }

    fn on_variable_assigned(&mut self, variable: PropositionalVariable, booleans: &BooleanAssignments) {
        let Some(mut watchers) = self.watch_lists.remove(&variable) else {
            return;
        };
        watchers.retain(|&id| self.update_watches(id, variable, booleans));

        // Entries swapped away from the watched positions are dropped; new
        // watches were added against the replacement variables.
        match self.watch_lists.entry(variable) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().extend(watchers);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                if !watchers.is_empty() {
                    let _ = entry.insert(watchers);
                }
            }
        }
    }

    /// Reacts to an assignment of a variable watched by `id`. Returns
    /// whether `id` still watches `variable`.
    fn update_watches(
        &mut self,
        id: EnforcementId,
        variable: PropositionalVariable,
        booleans: &BooleanAssignments,
    ) -> bool {
        let span = self.spans[id];
        let start = span.start as usize;
        let size = span.size as usize;
        let watched = NUM_WATCHED_LITERALS.min(size);

        let still_watching = |buffer: &[Literal]| {
            (0..watched).any(|p| buffer[start + p].get_variable() == variable)
        };

        if !still_watching(&self.literal_buffer) {
            // Stale entry from an earlier swap.
            return false;
        }
        if matches!(
            self.statuses[id],
            EnforcementStatus::IsFalse | EnforcementStatus::IsEnforced
        ) {
            // Absorbing until backtrack; the watchers stay in place so the
            // restored state is watched again afterwards.
            return true;
        }

        for position in 0..watched {
            let literal = self.literal_buffer[start + position];
            if literal.get_variable() != variable {
                continue;
            }
            if booleans.is_false(literal) {
                self.set_status(id, EnforcementStatus::IsFalse);
                return true;
            }
            if !booleans.is_assigned(literal) {
                continue;
            }

            // The watched literal became true; look for an unassigned
            // replacement beyond the watched positions.
            let replacement = (watched..size)
                .find(|&q| !booleans.is_assigned(self.literal_buffer[start + q]));
            if let Some(replacement) = replacement {
                self.literal_buffer.swap(start + position, start + replacement);
                self.watch(self.literal_buffer[start + position], id);
            } else {
                // No replacement: conclude the transition from a full scan.
                let span_literals = self.span(id);
                if span_literals.iter().any(|&l| booleans.is_false(l)) {
                    self.set_status(id, EnforcementStatus::IsFalse);
                } else {
                    match span_literals
                        .iter()
                        .filter(|&&l| !booleans.is_assigned(l))
                        .count()
                    {
                        0 => self.set_status(id, EnforcementStatus::IsEnforced),
                        1 => self.set_status(id, EnforcementStatus::CanPropagate),
                        _ => {}
                    }
                }
            }
        }

        still_watching(&self.literal_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::Revertible;

    fn rescan_status(
        literals: &[Literal],
        booleans: &BooleanAssignments,
    ) -> EnforcementStatus {
        if literals.iter().any(|&l| booleans.is_false(l)) {
            EnforcementStatus::IsFalse
        } else {
            match literals.iter().filter(|&&l| !booleans.is_assigned(l)).count() {
                0 => EnforcementStatus::IsEnforced,
                1 => EnforcementStatus::CanPropagate,
                _ => EnforcementStatus::CannotPropagate,
            }
        }
    }

    #[test]
    fn empty_list_is_always_enforced() {
        let booleans = BooleanAssignments::default();
        let mut tracker = EnforcementPropagator::default();

        let (id, status) = tracker.register(&[], &booleans);
        assert!(id.is_settled());
        assert_eq!(status, EnforcementStatus::IsEnforced);
        assert_eq!(tracker.status(id), EnforcementStatus::IsEnforced);
    }

    #[test]
    fn status_matches_a_rescan_under_assignments_and_backtracking() {
        let mut booleans = BooleanAssignments::default();
        let literals = (0..4).map(|_| booleans.new_literal()).collect::<Vec<_>>();

        let mut tracker = EnforcementPropagator::default();
        let (id, status) = tracker.register(&literals, &booleans);
        assert_eq!(status, EnforcementStatus::CannotPropagate);

        let check = |tracker: &EnforcementPropagator, booleans: &BooleanAssignments| {
            assert_eq!(tracker.status(id), rescan_status(&literals, booleans));
        };

        booleans.set_level(1);
        booleans.enqueue(literals[2], Explanation::default()).unwrap();
        tracker.set_level(1, &booleans);
        tracker.propagate(&booleans);
        check(&tracker, &booleans);

        booleans.set_level(2);
        booleans.enqueue(literals[0], Explanation::default()).unwrap();
        booleans.enqueue(literals[3], Explanation::default()).unwrap();
        tracker.set_level(2, &booleans);
        tracker.propagate(&booleans);
        check(&tracker, &booleans);
        assert_eq!(tracker.status(id), EnforcementStatus::CanPropagate);

        booleans.set_level(3);
        booleans.enqueue(literals[1], Explanation::default()).unwrap();
        tracker.set_level(3, &booleans);
        tracker.propagate(&booleans);
        assert_eq!(tracker.status(id), EnforcementStatus::IsEnforced);

        booleans.set_level(1);
        tracker.set_level(1, &booleans);
        check(&tracker, &booleans);

        booleans.set_level(0);
        tracker.set_level(0, &booleans);
        assert_eq!(tracker.status(id), EnforcementStatus::CannotPropagate);
    }

    #[test]
    fn assigning_a_guard_false_is_absorbing() {
        let mut booleans = BooleanAssignments::default();
        let a = booleans.new_literal();
        let b = booleans.new_literal();

        let mut tracker = EnforcementPropagator::default();
        let (id, _) = tracker.register(&[a, b], &booleans);

        booleans.set_level(1);
        booleans.enqueue(!a, Explanation::default()).unwrap();
        booleans.enqueue(b, Explanation::default()).unwrap();
        tracker.set_level(1, &booleans);
        tracker.propagate(&booleans);

        assert_eq!(tracker.status(id), EnforcementStatus::IsFalse);
    }

    #[test]
    fn propagate_when_false_pushes_the_last_unassigned_guard() {
        let mut booleans = BooleanAssignments::default();
        let a = booleans.new_literal();
        let b = booleans.new_literal();

        let mut tracker = EnforcementPropagator::default();
        let (id, _) = tracker.register(&[a, b], &booleans);

        booleans.set_level(1);
        booleans.enqueue(a, Explanation::default()).unwrap();
        tracker.set_level(1, &booleans);
        tracker.propagate(&booleans);
        assert_eq!(tracker.status(id), EnforcementStatus::CanPropagate);

        tracker
            .propagate_when_false(id, &Explanation::default(), &mut booleans)
            .unwrap();
        assert!(booleans.is_false(b));
        assert_eq!(booleans.reason(!b).unwrap().literal_reason, vec![!a]);
    }

    #[test]
    fn untrailing_replays_status_changes_in_reverse() {
        let mut booleans = BooleanAssignments::default();
        let a = booleans.new_literal();
        let b = booleans.new_literal();

        let mut tracker = EnforcementPropagator::default();
        let (id, _) = tracker.register(&[a, b], &booleans);
        let _ = tracker.take_status_changes();

        booleans.set_level(1);
        tracker.set_level(1, &booleans);
        booleans.enqueue(a, Explanation::default()).unwrap();
        tracker.propagate(&booleans);
        booleans.enqueue(b, Explanation::default()).unwrap();
        tracker.propagate(&booleans);

        booleans.set_level(0);
        tracker.set_level(0, &booleans);

        let changes = tracker.take_status_changes();
        let expected_tail = vec![
            (id, EnforcementStatus::CanPropagate),
            (id, EnforcementStatus::CannotPropagate),
        ];
        assert!(changes.ends_with(&expected_tail), "changes = {changes:?}");
        assert_eq!(tracker.status(id), EnforcementStatus::CannotPropagate);
    }
}
