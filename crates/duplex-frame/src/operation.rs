use std::fmt;

use arrow::datatypes::DataType;

use crate::compute::{self, JoinHow, Suffixes};
use crate::expr::{AggFunc, Scalar};
use crate::{DataFrame, Expr, FrameError, Result};

/// One frame operation with its arguments.
///
/// Table operations take their input frames from the caller; series and
/// category operations need a one-column input.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select { exprs: Vec<Expr> },
    WithColumns { exprs: Vec<Expr> },
    Filter { predicate: Expr },
    Drop { columns: Vec<String> },
    Head { n: usize },
    SortValues { by: Vec<String>, descending: bool },
    /// Join two frames on their row labels.
    Join {
        how: JoinHow,
        suffixes: Option<Suffixes>,
    },
    /// Join two frames on key columns.
    Merge {
        on: Vec<String>,
        how: JoinHow,
        suffixes: Suffixes,
    },
    /// Append frames row-wise.
    Concat,
    FillNa {
        value: Scalar,
        subset: Option<Vec<String>>,
    },
    AsType { dtypes: Vec<(String, DataType)> },
    GroupByAgg { by: Vec<String>, aggs: Vec<Expr> },
    Reduce { func: AggFunc },
    ValueCounts { subset: Option<Vec<String>> },
    ResetIndex,
    Unique,
    CumSum,
    CatCodes,
    CatCategories,
    CatRenameCategories { categories: Vec<String> },
    CatRemoveUnusedCategories,
}

/// Which view of the materialized input an operation runs on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewKind {
    /// The whole table.
    Table,
    /// Several tables at once.
    Tables,
    /// Exactly one column.
    Series,
    /// Exactly one category column.
    Categorical,
}

/// Number of input frames an operation takes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
    Variadic,
}

impl Operation {
    /// Name used for adapter lookup, logging and error reports.
    pub fn name(&self) -> String {
        match self {
            Operation::Select { .. } => "select".into(),
            Operation::WithColumns { .. } => "with_columns".into(),
            Operation::Filter { .. } => "filter".into(),
            Operation::Drop { .. } => "drop".into(),
            Operation::Head { .. } => "head".into(),
            Operation::SortValues { .. } => "sort_values".into(),
            Operation::Join { .. } => "join".into(),
            Operation::Merge { .. } => "merge".into(),
            Operation::Concat => "concat".into(),
            Operation::FillNa { .. } => "fillna".into(),
            Operation::AsType { .. } => "astype".into(),
            Operation::GroupByAgg { .. } => "groupby_agg".into(),
            Operation::Reduce { func } => format!("reduce.{}", func.name()),
            Operation::ValueCounts { .. } => "value_counts".into(),
            Operation::ResetIndex => "reset_index".into(),
            Operation::Unique => "series.unique".into(),
            Operation::CumSum => "series.cumsum".into(),
            Operation::CatCodes => "cat.codes".into(),
            Operation::CatCategories => "cat.categories".into(),
            Operation::CatRenameCategories { .. } => "cat.rename_categories".into(),
            Operation::CatRemoveUnusedCategories => "cat.remove_unused_categories".into(),
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operation::Join { .. } | Operation::Merge { .. } => Arity::Binary,
            Operation::Concat => Arity::Variadic,
            _ => Arity::Unary,
        }
    }

    pub fn view_kind(&self) -> ViewKind {
        match self {
            Operation::Join { .. } | Operation::Merge { .. } | Operation::Concat => {
                ViewKind::Tables
            }
            Operation::Unique | Operation::CumSum => ViewKind::Series,
            Operation::CatCodes
            | Operation::CatCategories
            | Operation::CatRenameCategories { .. }
            | Operation::CatRemoveUnusedCategories => ViewKind::Categorical,
            _ => ViewKind::Table,
        }
    }

    /// Check the number of input frames.
    pub fn check_arity(&self, inputs: usize) -> Result<()> {
        let ok = match self.arity() {
            Arity::Unary => inputs == 1,
            Arity::Binary => inputs == 2,
            Arity::Variadic => inputs >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(FrameError::invalid_operation(format!(
                "{} takes {:?} input, got {inputs} frame(s)",
                self.name(),
                self.arity()
            )))
        }
    }

    /// Expressions carried by this operation.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Operation::Select { exprs }
            | Operation::WithColumns { exprs }
            | Operation::GroupByAgg { aggs: exprs, .. } => exprs.iter().collect(),
            Operation::Filter { predicate } => vec![predicate],
            _ => Vec::new(),
        }
    }

    /// Returns `true` if any argument is a host callable.
    pub fn contains_host_fn(&self) -> bool {
        self.exprs().iter().any(|e| e.contains_host_fn())
    }

    /// Aggregations this operation computes.
    pub fn agg_funcs(&self) -> Vec<AggFunc> {
        match self {
            Operation::Reduce { func } => vec![*func],
            _ => self.exprs().iter().flat_map(|e| e.agg_funcs()).collect(),
        }
    }

    /// Returns `true` for joins keyed on the row labels.
    pub fn joins_on_index(&self) -> bool {
        matches!(self, Operation::Join { .. })
    }

    /// Returns `true` when each output row corresponds to the input row at
    /// the same position.
    pub fn preserves_rows(&self) -> bool {
        matches!(
            self,
            Operation::Select { .. }
                | Operation::WithColumns { .. }
                | Operation::Drop { .. }
                | Operation::FillNa { .. }
                | Operation::AsType { .. }
                | Operation::CumSum
                | Operation::CatCodes
                | Operation::CatRenameCategories { .. }
                | Operation::CatRemoveUnusedCategories
        )
    }

    /// Output row count from input row counts, where it follows from
    /// metadata alone.
    pub fn output_rows(&self, inputs: &[Option<usize>]) -> Option<usize> {
        let first = inputs.first().copied().flatten();
        match self {
            _ if self.preserves_rows() => first,
            Operation::SortValues { .. } | Operation::ResetIndex => first,
            Operation::Head { n } => first.map(|rows| rows.min(*n)),
            Operation::Concat => inputs.iter().copied().sum(),
            Operation::Reduce { .. } => Some(1),
            _ => None,
        }
    }

    /// Run a table operation over materialized inputs.
    ///
    /// Series and category operations need an extracted view and are
    /// rejected here.
    pub fn eval_tables(&self, inputs: &[DataFrame]) -> Result<DataFrame> {
        self.check_arity(inputs.len())?;
        let df = &inputs[0];
        match self {
            Operation::Select { exprs } => compute::select(df, exprs),
            Operation::WithColumns { exprs } => compute::with_columns(df, exprs),
            Operation::Filter { predicate } => compute::filter(df, predicate),
            Operation::Drop { columns } => compute::drop(df, columns),
            Operation::Head { n } => compute::head(df, *n),
            Operation::SortValues { by, descending } => compute::sort_values(df, by, *descending),
            Operation::Join { how, suffixes } => {
                compute::join_on_index(df, &inputs[1], *how, suffixes.as_ref())
            }
            Operation::Merge { on, how, suffixes } => {
                compute::merge(df, &inputs[1], on, *how, suffixes)
            }
            Operation::Concat => compute::concat(inputs),
            Operation::FillNa { value, subset } => compute::fillna(df, value, subset.as_deref()),
            Operation::AsType { dtypes } => compute::astype(df, dtypes),
            Operation::GroupByAgg { by, aggs } => compute::group_by_agg(df, by, aggs),
            Operation::Reduce { func } => compute::reduce(df, *func),
            Operation::ValueCounts { subset } => compute::value_counts(df, subset.as_deref()),
            Operation::ResetIndex => compute::reset_index(df),
            Operation::Unique
            | Operation::CumSum
            | Operation::CatCodes
            | Operation::CatCategories
            | Operation::CatRenameCategories { .. }
            | Operation::CatRemoveUnusedCategories => Err(FrameError::invalid_operation(format!(
                "{} runs on a {:?} view, not on tables",
                self.name(),
                self.view_kind()
            ))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |exprs: &[Expr]| {
            exprs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Operation::Select { exprs } | Operation::WithColumns { exprs } => {
                write!(f, "{}[{}]", self.name(), join(exprs))
            }
            Operation::Filter { predicate } => write!(f, "filter[{predicate}]"),
            Operation::Drop { columns } => write!(f, "drop{columns:?}"),
            Operation::Head { n } => write!(f, "head[{n}]"),
            Operation::SortValues { by, descending } => {
                write!(f, "sort_values{by:?} descending={descending}")
            }
            Operation::Join { how, .. } => write!(f, "join[{how} on index]"),
            Operation::Merge { on, how, .. } => write!(f, "merge[{how} on {on:?}]"),
            Operation::FillNa { value, .. } => write!(f, "fillna[{value}]"),
            Operation::AsType { dtypes } => {
                let parts = dtypes
                    .iter()
                    .map(|(n, t)| format!("{n}: {t}"))
                    .collect::<Vec<_>>();
                write!(f, "astype[{}]", parts.join(", "))
            }
            Operation::GroupByAgg { by, aggs } => {
                write!(f, "groupby_agg{by:?} aggs=[{}]", join(aggs))
            }
            other => write!(f, "{}", other.name()),
        }
    }
}
