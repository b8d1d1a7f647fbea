//! The query IR: expression tree, field primitives, joins and the builder.

mod document;
pub mod expr;
pub mod expression;
pub mod field;
pub mod lookup;

pub use expr::{
    field, lit_bool, lit_float, lit_int, lit_null, lit_str, ArithmeticOperator,
    ComparisonOperator, Expr, ExprExt, Func, Literal, LogicalOperator, TextPattern,
};
pub use expression::{
    Assignment, OrderByExpr, Payload, QueryExpression, SortDir, StatementKind,
};
pub use field::{QueryEntity, QueryField};
pub use lookup::{JoinCondition, JoinDirection, JoinTarget, Lookup};
