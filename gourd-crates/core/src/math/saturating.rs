//! Saturating arithmetic over bound values.
//!
//! Bound arithmetic never wraps: out-of-range results collapse to the nearest
//! sentinel. The sentinels are symmetric so that negating an unbounded-above
//! value yields unbounded-below, which keeps the variable/negation invariant
//! `lower_bound(v) == -upper_bound(v.negated())` valid at the extremes.

/// The sentinel for "unbounded above". Anything at or beyond this value is
/// treated as no upper bound at all.
pub const MAX_INTEGER_VALUE: i64 = i64::MAX / 2;

/// The sentinel for "unbounded below".
pub const MIN_INTEGER_VALUE: i64 = -MAX_INTEGER_VALUE;

fn clamp(value: i64) -> i64 {
    value.clamp(MIN_INTEGER_VALUE, MAX_INTEGER_VALUE)
}

pub(crate) fn cap_add(a: i64, b: i64) -> i64 {
    clamp(a.saturating_add(b))
}

pub(crate) fn cap_sub(a: i64, b: i64) -> i64 {
    clamp(a.saturating_sub(b))
}

pub(crate) fn cap_prod(a: i64, b: i64) -> i64 {
    clamp(a.saturating_mul(b))
}

pub(crate) fn cap_neg(a: i64) -> i64 {
    clamp(-a)
}

/// Whether `value` is one of the two sentinels, i.e. carries no bound
/// information.
pub(crate) fn is_unbounded(value: i64) -> bool {
    value <= MIN_INTEGER_VALUE || value >= MAX_INTEGER_VALUE
}
