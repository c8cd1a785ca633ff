use crate::math::saturating::MAX_INTEGER_VALUE;
use crate::math::saturating::MIN_INTEGER_VALUE;
use crate::math::saturating::cap_neg;
use crate::variables::IntegerVariable;

/// The bound literal `var >= bound`.
///
/// An upper bound `var <= b` is encoded as `var.negated() >= -b`, so a single
/// literal kind covers both directions. Two sentinels over
/// [`IntegerVariable::NONE`] represent trivially-true and trivially-false
/// literals, which arise when a bound is requested on a constant expression.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntegerLiteral {
    pub var: IntegerVariable,
    pub bound: i64,
}

impl IntegerLiteral {
    pub const TRUE: IntegerLiteral = IntegerLiteral {
        var: IntegerVariable::NONE,
        bound: MIN_INTEGER_VALUE,
    };

    pub const FALSE: IntegerLiteral = IntegerLiteral {
        var: IntegerVariable::NONE,
        bound: MAX_INTEGER_VALUE,
    };

    /// The literal `var >= bound`.
    pub fn greater_or_equal(var: IntegerVariable, bound: i64) -> IntegerLiteral {
        IntegerLiteral { var, bound }
    }

    /// The literal `var <= bound`, encoded on the negated variable.
    pub fn lower_or_equal(var: IntegerVariable, bound: i64) -> IntegerLiteral {
        IntegerLiteral {
            var: var.negated(),
            bound: cap_neg(bound),
        }
    }

    pub fn is_always_true(self) -> bool {
        self == IntegerLiteral::TRUE
    }

    pub fn is_always_false(self) -> bool {
        self == IntegerLiteral::FALSE
    }

    /// The negation `var < bound`, i.e. `var.negated() >= 1 - bound`.
    pub fn negated(self) -> IntegerLiteral {
        if self.is_always_true() {
            return IntegerLiteral::FALSE;
        }
        if self.is_always_false() {
            return IntegerLiteral::TRUE;
        }
        IntegerLiteral {
            var: self.var.negated(),
            bound: cap_neg(self.bound - 1),
        }
    }
}

impl std::fmt::Display for IntegerLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_always_true() {
            write!(f, "[True]")
        } else if self.is_always_false() {
            write!(f, "[False]")
        } else {
            write!(f, "[{} >= {}]", self.var, self.bound)
        }
    }
}

impl std::fmt::Debug for IntegerLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
