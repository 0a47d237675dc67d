#[allow(clippy::module_inception)]
mod expr;
mod functions;

/// Expression AST and supporting enums.
pub use expr::{AggFunc, Expr, HostFn, Operator, Scalar, UnaryOperator};
/// Expression builder helpers.
pub use functions::{all, col, cols, lit};
