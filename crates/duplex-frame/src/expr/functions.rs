use crate::expr::expr::Scalar;
use crate::Expr;

/// Column reference. Names are matched exactly when the expression is
/// evaluated or probed, so a typo fails at `apply`, not at trigger time.
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// One column reference per name, in order; the usual projection list.
pub fn cols<I, S>(names: I) -> Vec<Expr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|name| col(name.as_ref())).collect()
}

/// Constant broadcast to the frame's height.
pub fn lit<T>(value: T) -> Expr
where
    T: Into<Scalar>,
{
    Expr::Literal(value.into())
}

/// Every input column, in order (`select` / `with_columns` only).
pub fn all() -> Expr {
    Expr::Wildcard
}
