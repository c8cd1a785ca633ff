use crate::containers::StorageKey;

/// The id of an integer variable.
///
/// Every variable is allocated together with its negation; the two share an
/// id pair and differ only in the lowest bit. This makes negation an O(1)
/// bit-toggle and lets all bound state be stored lower-bound-style: the upper
/// bound of a variable is read as the negated lower bound of its partner.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntegerVariable {
    id: u32,
}

impl IntegerVariable {
    /// The sentinel used by [`AffineExpression`](crate::variables::AffineExpression)
    /// and [`LinearExpression2`](crate::variables::LinearExpression2) for a
    /// slot holding no variable.
    pub const NONE: IntegerVariable = IntegerVariable { id: u32::MAX };

    pub fn new(id: u32) -> Self {
        IntegerVariable { id }
    }

    /// The positive variable of pair `pair_index`.
    pub fn from_pair_index(pair_index: usize) -> Self {
        IntegerVariable {
            id: (pair_index as u32) << 1,
        }
    }

    pub fn negated(self) -> IntegerVariable {
        IntegerVariable { id: self.id ^ 1 }
    }

    pub fn is_positive(self) -> bool {
        self.id & 1 == 0
    }

    /// The index of the variable/negation pair this id belongs to.
    pub fn pair_index(self) -> usize {
        (self.id >> 1) as usize
    }

    pub fn is_none(self) -> bool {
        self == IntegerVariable::NONE
    }

    pub fn id(self) -> u32 {
        self.id
    }
}

impl StorageKey for IntegerVariable {
    fn index(&self) -> usize {
        self.id as usize
    }

    fn create_from_index(index: usize) -> Self {
        IntegerVariable { id: index as u32 }
    }
}

impl std::fmt::Display for IntegerVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "x_none")
        } else if self.is_positive() {
            write!(f, "x{}", self.pair_index())
        } else {
            write!(f, "-x{}", self.pair_index())
        }
    }
}

impl std::fmt::Debug for IntegerVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
