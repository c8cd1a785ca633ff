//! The integer domain model: variable identities, affine expressions over a
//! single variable, integer bound literals, and the canonical two-variable
//! linear form used by the relation repositories.

mod affine_expression;
mod integer_literal;
mod integer_variable;
mod linear_expression2;

pub use affine_expression::AffineExpression;
pub use integer_literal::IntegerLiteral;
pub use integer_variable::IntegerVariable;
pub use linear_expression2::LinearExpression2;
