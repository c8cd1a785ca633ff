use num::integer::gcd;

use crate::math::num_ext::NumExt;
use crate::math::saturating::is_unbounded;
use crate::variables::IntegerVariable;

/// The linear form `coeffs[0] * vars[0] + coeffs[1] * vars[1]` over at most
/// two variables.
///
/// Every such form has a canonical representative: zero coefficients collapse
/// their slot to [`IntegerVariable::NONE`], slots over the same variable pair
/// merge, coefficients are made positive by negating the variable, slots are
/// ordered by variable pair, and the coefficients are divided by their gcd.
/// The canonical form is the key of the deduplicated relation index; its
/// negation is also canonical, which is what makes the parity-paired index
/// scheme work.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinearExpression2 {
    pub vars: [IntegerVariable; 2],
    pub coeffs: [i64; 2],
}

impl LinearExpression2 {
    pub fn new(
        coeff0: i64,
        var0: IntegerVariable,
        coeff1: i64,
        var1: IntegerVariable,
    ) -> LinearExpression2 {
        LinearExpression2 {
            vars: [var0, var1],
            coeffs: [coeff0, coeff1],
        }
    }

    /// The difference `x - y`.
    pub fn difference(x: IntegerVariable, y: IntegerVariable) -> LinearExpression2 {
        LinearExpression2::new(1, x, -1, y)
    }

    pub fn num_vars(&self) -> usize {
        self.vars.iter().filter(|var| !var.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.num_vars() == 0
    }

    /// The single `(coeff, var)` term of a one-variable form.
    pub fn single_term(&self) -> Option<(i64, IntegerVariable)> {
        match (self.vars[0].is_none(), self.vars[1].is_none()) {
            (false, true) => Some((self.coeffs[0], self.vars[0])),
            (true, false) => Some((self.coeffs[1], self.vars[1])),
            _ => None,
        }
    }

    /// The arithmetic negation; canonical forms stay canonical under this.
    pub fn negated(&self) -> LinearExpression2 {
        let negate = |var: IntegerVariable| if var.is_none() { var } else { var.negated() };
        LinearExpression2 {
            vars: [negate(self.vars[0]), negate(self.vars[1])],
            coeffs: self.coeffs,
        }
    }

    /// Canonicalization without the gcd reduction: this part never changes
    /// the value of the form, so no bounds need updating.
    pub fn simple_canonicalization(&mut self) {
        for slot in 0..2 {
            if self.vars[slot].is_none() || self.coeffs[slot] == 0 {
                self.vars[slot] = IntegerVariable::NONE;
                self.coeffs[slot] = 0;
            } else if self.coeffs[slot] < 0 {
                self.vars[slot] = self.vars[slot].negated();
                self.coeffs[slot] = -self.coeffs[slot];
            }
        }

        // Merge slots over the same variable pair. Using the signed
        // coefficient over the positive variable of the pair handles both a
        // duplicated variable and a variable paired with its own negation.
        if !self.vars[0].is_none()
            && !self.vars[1].is_none()
            && self.vars[0].pair_index() == self.vars[1].pair_index()
        {
            let signed = |slot: usize| {
                if self.vars[slot].is_positive() {
                    self.coeffs[slot]
                } else {
                    -self.coeffs[slot]
                }
            };
            let merged = signed(0) + signed(1);
            let positive_var = IntegerVariable::from_pair_index(self.vars[0].pair_index());

            self.vars[1] = IntegerVariable::NONE;
            self.coeffs[1] = 0;
            if merged == 0 {
                self.vars[0] = IntegerVariable::NONE;
                self.coeffs[0] = 0;
            } else if merged > 0 {
                self.vars[0] = positive_var;
                self.coeffs[0] = merged;
            } else {
                self.vars[0] = positive_var.negated();
                self.coeffs[0] = -merged;
            }
        }

        // Empty slots go last; otherwise order by variable pair. Negating a
        // variable preserves its pair, so the negation of a canonical form
        // keeps the same slot order and stays canonical.
        let out_of_order = match (self.vars[0].is_none(), self.vars[1].is_none()) {
            (true, false) => true,
            (false, false) => self.vars[0].pair_index() > self.vars[1].pair_index(),
            _ => false,
        };
        if out_of_order {
            self.vars.swap(0, 1);
            self.coeffs.swap(0, 1);
        }
    }

    /// Divides the coefficients by their gcd, tightening the accompanying
    /// `[lb, ub]` by rounding toward the feasible side. This is not a no-op:
    /// `2x + 4y <= 9` becomes `x + 2y <= 4`.
    ///
    /// Returns the divisor so callers can scale query results back up.
    pub fn divide_by_gcd(&mut self, lb: &mut i64, ub: &mut i64) -> i64 {
        let divisor = match (self.vars[0].is_none(), self.vars[1].is_none()) {
            (false, false) => gcd(self.coeffs[0], self.coeffs[1]),
            (false, true) => self.coeffs[0],
            _ => return 1,
        };
        if divisor <= 1 {
            return 1;
        }

        self.coeffs[0] /= divisor;
        if !self.vars[1].is_none() {
            self.coeffs[1] /= divisor;
        }
        if !is_unbounded(*ub) {
            *ub = ub.div_floor(divisor);
        }
        if !is_unbounded(*lb) {
            *lb = lb.div_ceil(divisor);
        }
        divisor
    }

    /// Full canonicalization, keeping the accompanying bound pair consistent.
    ///
    /// Returns the gcd divisor.
    pub fn canonicalize_with_bounds(&mut self, lb: &mut i64, ub: &mut i64) -> i64 {
        self.simple_canonicalization();
        self.divide_by_gcd(lb, ub)
    }
}

impl std::fmt::Display for LinearExpression2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "0");
        }
        let terms = self
            .vars
            .iter()
            .zip(self.coeffs.iter())
            .filter(|(var, _)| !var.is_none())
            .map(|(var, coeff)| format!("{coeff}*{var}"))
            .collect::<Vec<_>>();
        write!(f, "{}", terms.join(" + "))
    }
}

impl std::fmt::Debug for LinearExpression2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::saturating::MAX_INTEGER_VALUE;
    use crate::math::saturating::MIN_INTEGER_VALUE;

    fn canonicalize(mut expression: LinearExpression2) -> LinearExpression2 {
        let mut lb = MIN_INTEGER_VALUE;
        let mut ub = MAX_INTEGER_VALUE;
        let _ = expression.canonicalize_with_bounds(&mut lb, &mut ub);
        expression
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(1);

        let expressions = [
            LinearExpression2::new(-2, x, 4, y),
            LinearExpression2::new(0, x, -3, y),
            LinearExpression2::new(5, y, 5, x),
            LinearExpression2::new(3, x, -2, x),
            LinearExpression2::new(1, x.negated(), 1, x),
        ];

        for expression in expressions {
            let once = canonicalize(expression);
            assert_eq!(once, canonicalize(once), "{expression} is not stable");
        }
    }

    #[test]
    fn same_variable_slots_merge() {
        let x = IntegerVariable::from_pair_index(2);

        let merged = canonicalize(LinearExpression2::new(3, x, -2, x));
        assert_eq!(merged, canonicalize(LinearExpression2::new(1, x, 0, x)));

        let cancelled = canonicalize(LinearExpression2::new(1, x, 1, x.negated()));
        assert!(cancelled.is_empty());
    }

    #[test]
    fn slots_are_ordered_and_signs_normalized() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(1);

        let a = canonicalize(LinearExpression2::new(1, x, -1, y));
        let b = canonicalize(LinearExpression2::new(-1, y, 1, x));
        assert_eq!(a, b);
        assert!(a.coeffs.iter().all(|&coeff| coeff >= 0));
    }

    #[test]
    fn negation_of_canonical_form_is_canonical() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(3);

        let expression = canonicalize(LinearExpression2::new(2, x, -4, y));
        let negation = expression.negated();
        assert_eq!(negation, canonicalize(negation));
        assert_eq!(negation.negated(), expression);
    }

    #[test]
    fn gcd_reduction_tightens_bounds() {
        let x = IntegerVariable::from_pair_index(0);
        let y = IntegerVariable::from_pair_index(1);

        let mut expression = LinearExpression2::new(2, x, 4, y);
        let mut lb = -9;
        let mut ub = 9;
        let divisor = expression.canonicalize_with_bounds(&mut lb, &mut ub);

        assert_eq!(divisor, 2);
        assert_eq!(expression.coeffs, [1, 2]);
        // ceil(-9 / 2) = -4 and floor(9 / 2) = 4: no integer point of the
        // original relation is excluded.
        assert_eq!((lb, ub), (-4, 4));
    }
}
