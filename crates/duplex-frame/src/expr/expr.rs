use std::fmt;
use std::sync::Arc;

use arrow::array::{
    new_null_array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;

use crate::Result;

/// Expression AST used by frame operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference.
    Column(String),
    /// Literal scalar value.
    Literal(Scalar),
    /// Binary operator expression.
    BinaryOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    /// Unary operator expression.
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Aggregation expression (only valid in aggregations).
    Agg { func: AggFunc, expr: Box<Expr> },
    /// Expression alias (renames the resulting column).
    Alias { expr: Box<Expr>, name: String },
    /// Cast to another Arrow type.
    Cast { expr: Box<Expr>, dtype: DataType },
    /// Replace nulls with a literal.
    FillNull { expr: Box<Expr>, value: Scalar },
    /// Arbitrary host function applied to the evaluated array.
    Apply { expr: Box<Expr>, func: HostFn },
    /// Wildcard (`*`) that expands to all columns in projections.
    Wildcard,
}

/// Supported binary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

/// Supported unary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Boolean NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    IsNull,
    IsNotNull,
}

/// Supported aggregation functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AggFunc {
    /// Sum of non-null values.
    Sum,
    /// Mean of non-null values.
    Mean,
    /// Count of non-null values.
    Count,
    /// Minimum of non-null values.
    Min,
    /// Maximum of non-null values.
    Max,
    /// Median of non-null values (midpoint average for even counts).
    Median,
    /// Number of distinct non-null values.
    NUnique,
}

impl AggFunc {
    /// Lower-case name as used in operation names and plan output.
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
            AggFunc::NUnique => "nunique",
        }
    }
}

/// Scalar literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    /// Arrow type of this literal.
    pub fn dtype(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Boolean(_) => DataType::Boolean,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::Float64(_) => DataType::Float64,
            Scalar::Utf8(_) => DataType::Utf8,
        }
    }

    /// Broadcast this literal to an array of `len` rows.
    pub fn to_array(&self, len: usize) -> ArrayRef {
        match self {
            Scalar::Null => new_null_array(&DataType::Null, len),
            Scalar::Boolean(v) => Arc::new(BooleanArray::from(vec![Some(*v); len])),
            Scalar::Int64(v) => Arc::new(Int64Array::from(vec![Some(*v); len])),
            Scalar::Float64(v) => Arc::new(Float64Array::from(vec![Some(*v); len])),
            Scalar::Utf8(v) => Arc::new(StringArray::from(vec![Some(v.as_str()); len])),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Boolean(v) => write!(f, "{v}"),
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::Float64(v) => write!(f, "{v}"),
            Scalar::Utf8(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<()> for Scalar {
    fn from(_: ()) -> Self {
        Scalar::Null
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Utf8(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Utf8(v.to_string())
    }
}

type HostFnImpl = dyn Fn(&ArrayRef) -> Result<ArrayRef> + Send + Sync;

/// A named host callable. The native engine can never run these.
#[derive(Clone)]
pub struct HostFn {
    name: String,
    func: Arc<HostFnImpl>,
}

impl HostFn {
    /// Wrap a closure under a display name.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ArrayRef) -> Result<ArrayRef> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callable.
    pub fn call(&self, input: &ArrayRef) -> Result<ArrayRef> {
        (self.func)(input)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFn").field("name", &self.name).finish()
    }
}

impl PartialEq for HostFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Expr {
    /// Alias this expression (used to name output columns).
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    fn binary(self, op: Operator, rhs: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        }
    }

    fn unary(self, op: UnaryOperator) -> Expr {
        Expr::UnaryOp {
            op,
            expr: Box::new(self),
        }
    }

    fn agg(self, func: AggFunc) -> Expr {
        Expr::Agg {
            func,
            expr: Box::new(self),
        }
    }

    /// Build an addition expression.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: Expr) -> Expr {
        self.binary(Operator::Add, rhs)
    }

    /// Build a subtraction expression.
    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: Expr) -> Expr {
        self.binary(Operator::Sub, rhs)
    }

    /// Build a multiplication expression.
    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: Expr) -> Expr {
        self.binary(Operator::Mul, rhs)
    }

    /// Build a division expression.
    #[allow(clippy::should_implement_trait)]
    pub fn div(self, rhs: Expr) -> Expr {
        self.binary(Operator::Div, rhs)
    }

    /// Build an equality predicate.
    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(Operator::Eq, rhs)
    }

    /// Build an inequality predicate.
    pub fn neq(self, rhs: Expr) -> Expr {
        self.binary(Operator::Neq, rhs)
    }

    /// Build a greater-than predicate.
    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(Operator::Gt, rhs)
    }

    /// Build a less-than predicate.
    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(Operator::Lt, rhs)
    }

    /// Build a greater-than-or-equal predicate.
    pub fn ge(self, rhs: Expr) -> Expr {
        self.binary(Operator::Ge, rhs)
    }

    /// Build a less-than-or-equal predicate.
    pub fn le(self, rhs: Expr) -> Expr {
        self.binary(Operator::Le, rhs)
    }

    /// Build a boolean AND predicate.
    pub fn and_(self, rhs: Expr) -> Expr {
        self.binary(Operator::And, rhs)
    }

    /// Build a boolean OR predicate.
    pub fn or_(self, rhs: Expr) -> Expr {
        self.binary(Operator::Or, rhs)
    }

    /// Build a boolean NOT predicate.
    pub fn not_(self) -> Expr {
        self.unary(UnaryOperator::Not)
    }

    /// Arithmetic negation.
    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Expr {
        self.unary(UnaryOperator::Neg)
    }

    /// `true` where the value is null.
    pub fn is_null(self) -> Expr {
        self.unary(UnaryOperator::IsNull)
    }

    /// `true` where the value is present.
    pub fn is_not_null(self) -> Expr {
        self.unary(UnaryOperator::IsNotNull)
    }

    /// Cast to `dtype`.
    pub fn cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
        }
    }

    /// Replace nulls with `value`.
    pub fn fill_null(self, value: impl Into<Scalar>) -> Expr {
        Expr::FillNull {
            expr: Box::new(self),
            value: value.into(),
        }
    }

    /// Apply a host callable to the evaluated values.
    pub fn map<F>(self, name: impl Into<String>, func: F) -> Expr
    where
        F: Fn(&ArrayRef) -> Result<ArrayRef> + Send + Sync + 'static,
    {
        Expr::Apply {
            expr: Box::new(self),
            func: HostFn::new(name, func),
        }
    }

    /// Build a `sum` aggregation.
    pub fn sum(self) -> Expr {
        self.agg(AggFunc::Sum)
    }

    /// Build a `mean` aggregation.
    pub fn mean(self) -> Expr {
        self.agg(AggFunc::Mean)
    }

    /// Build a `count` aggregation (nulls excluded).
    pub fn count(self) -> Expr {
        self.agg(AggFunc::Count)
    }

    /// Build a `min` aggregation.
    pub fn min(self) -> Expr {
        self.agg(AggFunc::Min)
    }

    /// Build a `max` aggregation.
    pub fn max(self) -> Expr {
        self.agg(AggFunc::Max)
    }

    /// Build a `median` aggregation.
    pub fn median(self) -> Expr {
        self.agg(AggFunc::Median)
    }

    /// Build a distinct-count aggregation.
    pub fn n_unique(self) -> Expr {
        self.agg(AggFunc::NUnique)
    }

    /// Returns `true` if a host callable appears anywhere in this expression.
    pub fn contains_host_fn(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Apply { .. }));
        found
    }

    /// Aggregation functions used anywhere in this expression.
    pub fn agg_funcs(&self) -> Vec<AggFunc> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Agg { func, .. } = e {
                out.push(*func);
            }
        });
        out
    }

    /// Column names referenced anywhere in this expression, first use first.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column(name) = e {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }

    fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Wildcard => {}
            Expr::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Agg { expr, .. }
            | Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::FillNull { expr, .. }
            | Expr::Apply { expr, .. } => expr.visit(f),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "col({name})"),
            Expr::Literal(s) => write!(f, "lit({s})"),
            Expr::Wildcard => write!(f, "*"),
            Expr::Alias { expr, name } => write!(f, "{expr} as {name}"),
            Expr::UnaryOp { op, expr } => {
                let op_s = match op {
                    UnaryOperator::Not => "not",
                    UnaryOperator::Neg => "neg",
                    UnaryOperator::IsNull => "is_null",
                    UnaryOperator::IsNotNull => "is_not_null",
                };
                write!(f, "{op_s}({expr})")
            }
            Expr::BinaryOp { left, op, right } => {
                let op_s = match op {
                    Operator::Add => "+",
                    Operator::Sub => "-",
                    Operator::Mul => "*",
                    Operator::Div => "/",
                    Operator::Eq => "==",
                    Operator::Neq => "!=",
                    Operator::Gt => ">",
                    Operator::Lt => "<",
                    Operator::Ge => ">=",
                    Operator::Le => "<=",
                    Operator::And => "and",
                    Operator::Or => "or",
                };
                write!(f, "({left} {op_s} {right})")
            }
            Expr::Agg { func, expr } => write!(f, "{}({expr})", func.name()),
            Expr::Cast { expr, dtype } => write!(f, "cast({expr} as {dtype})"),
            Expr::FillNull { expr, value } => write!(f, "fill_null({expr}, {value})"),
            Expr::Apply { expr, func } => write!(f, "{}[host]({expr})", func.name()),
        }
    }
}
