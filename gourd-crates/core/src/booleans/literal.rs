use crate::containers::StorageKey;

/// A Boolean variable used as an enforcement condition.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropositionalVariable {
    index: u32,
}

impl PropositionalVariable {
    pub fn new(index: u32) -> PropositionalVariable {
        PropositionalVariable { index }
    }
}

impl StorageKey for PropositionalVariable {
    fn index(&self) -> usize {
        self.index as usize
    }

    fn create_from_index(index: usize) -> Self {
        PropositionalVariable {
            index: index as u32,
        }
    }
}

impl std::fmt::Display for PropositionalVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.index)
    }
}

/// A Boolean literal: a [`PropositionalVariable`] with a polarity, packed
/// into a single code with the polarity in the lowest bit.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    code: u32,
}

impl Literal {
    pub fn new(variable: PropositionalVariable, is_positive: bool) -> Literal {
        Literal {
            code: (variable.index() as u32) * 2 + (is_positive as u32),
        }
    }

    pub fn is_positive(self) -> bool {
        (self.code & 1) == 1
    }

    pub fn get_variable(self) -> PropositionalVariable {
        PropositionalVariable::new(self.code / 2)
    }

    pub fn to_u32(self) -> u32 {
        self.code
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Literal {
        Literal {
            code: self.code ^ 1,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_positive() {
            write!(f, "{}", self.get_variable())
        } else {
            write!(f, "~{}", self.get_variable())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_toggles_the_low_bit() {
        let literal = Literal::new(PropositionalVariable::new(4), true);
        assert!(literal.is_positive());
        assert!(!(!literal).is_positive());
        assert_eq!(!!literal, literal);
        assert_eq!(literal.get_variable(), (!literal).get_variable());
    }
}
