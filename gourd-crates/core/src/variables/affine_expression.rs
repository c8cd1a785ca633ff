use crate::math::num_ext::NumExt;
use crate::math::saturating::cap_neg;
use crate::math::saturating::is_unbounded;
use crate::variables::IntegerLiteral;
use crate::variables::IntegerVariable;

/// The expression `coeff * var + constant`.
///
/// The coefficient is kept non-negative by convention: a negative logical
/// coefficient negates `var` instead. Pure constants use
/// [`IntegerVariable::NONE`] with a zero coefficient.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct AffineExpression {
    pub var: IntegerVariable,
    pub coeff: i64,
    pub constant: i64,
}

impl AffineExpression {
    pub fn new(var: IntegerVariable, coeff: i64, constant: i64) -> AffineExpression {
        if coeff == 0 || var.is_none() {
            return AffineExpression::constant(constant);
        }
        if coeff < 0 {
            AffineExpression {
                var: var.negated(),
                coeff: -coeff,
                constant,
            }
        } else {
            AffineExpression {
                var,
                coeff,
                constant,
            }
        }
    }

    pub fn constant(value: i64) -> AffineExpression {
        AffineExpression {
            var: IntegerVariable::NONE,
            coeff: 0,
            constant: value,
        }
    }

    pub fn is_constant(self) -> bool {
        self.var.is_none()
    }

    pub fn negated(self) -> AffineExpression {
        AffineExpression {
            var: if self.var.is_none() {
                self.var
            } else {
                self.var.negated()
            },
            coeff: self.coeff,
            constant: cap_neg(self.constant),
        }
    }

    /// The literal asserting `self >= bound` on the underlying variable.
    ///
    /// For constants this is one of the trivial literals. The division rounds
    /// up: `coeff * var >= bound - constant` holds iff
    /// `var >= ceil((bound - constant) / coeff)`.
    pub fn greater_or_equal(self, bound: i64) -> IntegerLiteral {
        if is_unbounded(bound) {
            return if bound < 0 {
                IntegerLiteral::TRUE
            } else {
                IntegerLiteral::FALSE
            };
        }
        if self.is_constant() {
            return if self.constant >= bound {
                IntegerLiteral::TRUE
            } else {
                IntegerLiteral::FALSE
            };
        }
        IntegerLiteral::greater_or_equal(self.var, (bound - self.constant).div_ceil(self.coeff))
    }

    /// The literal asserting `self <= bound` on the underlying variable.
    pub fn lower_or_equal(self, bound: i64) -> IntegerLiteral {
        if is_unbounded(bound) {
            return if bound > 0 {
                IntegerLiteral::TRUE
            } else {
                IntegerLiteral::FALSE
            };
        }
        if self.is_constant() {
            return if self.constant <= bound {
                IntegerLiteral::TRUE
            } else {
                IntegerLiteral::FALSE
            };
        }
        IntegerLiteral::lower_or_equal(self.var, (bound - self.constant).div_floor(self.coeff))
    }
}

impl std::fmt::Display for AffineExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_constant() {
            write!(f, "{}", self.constant)
        } else if self.constant == 0 {
            write!(f, "{}*{}", self.coeff, self.var)
        } else {
            write!(f, "{}*{} + {}", self.coeff, self.var, self.constant)
        }
    }
}

impl std::fmt::Debug for AffineExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coefficients_flip_the_variable() {
        let x = IntegerVariable::from_pair_index(1);
        let expression = AffineExpression::new(x, -3, 2);

        assert_eq!(expression.var, x.negated());
        assert_eq!(expression.coeff, 3);
    }

    #[test]
    fn bound_conversion_rounds_toward_the_variable() {
        let x = IntegerVariable::from_pair_index(0);
        // 2x + 1 >= 6 iff x >= ceil(5 / 2) = 3.
        let literal = AffineExpression::new(x, 2, 1).greater_or_equal(6);
        assert_eq!(literal, IntegerLiteral::greater_or_equal(x, 3));

        // 2x + 1 <= 6 iff x <= floor(5 / 2) = 2.
        let literal = AffineExpression::new(x, 2, 1).lower_or_equal(6);
        assert_eq!(literal, IntegerLiteral::lower_or_equal(x, 2));
    }

    #[test]
    fn constants_yield_trivial_literals() {
        let expression = AffineExpression::constant(4);
        assert!(expression.greater_or_equal(4).is_always_true());
        assert!(expression.greater_or_equal(5).is_always_false());
        assert!(expression.lower_or_equal(4).is_always_true());
        assert!(expression.lower_or_equal(3).is_always_false());
    }
}
