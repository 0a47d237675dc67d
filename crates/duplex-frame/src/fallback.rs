//! Single-node execution of operations the engine does not run.
//!
//! Each operation name binds to one [`FallbackAdapter`], which declares the
//! view it needs from the materialized inputs, runs the kernel on that view
//! and wraps the result as a new frame.

use std::collections::HashMap;
use std::fmt;

use arrow::array::ArrayRef;

use crate::compute::{self, CategoricalAccessor};
use crate::config::ExecutionConfig;
use crate::expr::AggFunc;
use crate::operation::ViewKind;
use crate::{DataFrame, Frame, FrameError, Operation, Result, Series};

pub type TableFn = fn(&Operation, &DataFrame) -> Result<DataFrame>;
pub type TablesFn = fn(&Operation, &[DataFrame]) -> Result<DataFrame>;
pub type SeriesFn = fn(&Operation, &Series) -> Result<DataFrame>;
pub type CategoricalFn = fn(&Operation, &CategoricalAccessor) -> Result<DataFrame>;

/// How an operation runs on the host, tagged by the view it needs.
#[derive(Clone, Copy)]
pub enum FallbackAdapter {
    /// The whole table.
    Table(TableFn),
    /// All input tables.
    Tables(TablesFn),
    /// Exactly one column.
    Series(SeriesFn),
    /// Exactly one category column.
    Categorical(CategoricalFn),
}

/// A view extracted from materialized inputs.
pub enum View<'a> {
    Table(&'a DataFrame),
    Tables(&'a [DataFrame]),
    Series(Series),
    Categorical(CategoricalAccessor),
}

impl FallbackAdapter {
    pub fn view_kind(&self) -> ViewKind {
        match self {
            FallbackAdapter::Table(_) => ViewKind::Table,
            FallbackAdapter::Tables(_) => ViewKind::Tables,
            FallbackAdapter::Series(_) => ViewKind::Series,
            FallbackAdapter::Categorical(_) => ViewKind::Categorical,
        }
    }

    /// Extract the view this adapter needs.
    ///
    /// Series and category views need exactly one column; anything else is a
    /// `ShapeMismatch`. A category view over a non-category column is a
    /// `TypeMismatch`.
    pub fn extract<'a>(&self, inputs: &'a [DataFrame]) -> Result<View<'a>> {
        let first = inputs
            .first()
            .ok_or_else(|| FrameError::invalid_operation("fallback called without inputs"))?;
        match self {
            FallbackAdapter::Table(_) => Ok(View::Table(first)),
            FallbackAdapter::Tables(_) => Ok(View::Tables(inputs)),
            FallbackAdapter::Series(_) => Ok(View::Series(squeeze(first)?)),
            FallbackAdapter::Categorical(_) => Ok(View::Categorical(squeeze(first)?.cat()?)),
        }
    }

    /// Materialized inputs in, host table out.
    pub fn run(&self, operation: &Operation, inputs: &[DataFrame]) -> Result<DataFrame> {
        let out = match (self, self.extract(inputs)?) {
            (FallbackAdapter::Table(f), View::Table(df)) => f(operation, df)?,
            (FallbackAdapter::Tables(f), View::Tables(dfs)) => f(operation, dfs)?,
            (FallbackAdapter::Series(f), View::Series(s)) => f(operation, &s)?,
            (FallbackAdapter::Categorical(f), View::Categorical(c)) => f(operation, &c)?,
            _ => {
                return Err(FrameError::invalid_operation(
                    "adapter and view kinds disagree",
                ))
            }
        };
        // column views drop the labels; row-aligned results get them back
        match self.view_kind() {
            ViewKind::Series | ViewKind::Categorical
                if operation.preserves_rows() && out.height() == inputs[0].height() =>
            {
                out.with_index(inputs[0].index().clone())
            }
            _ => Ok(out),
        }
    }

    /// Run and wrap the result as a new frame.
    pub fn invoke(
        &self,
        operation: &Operation,
        inputs: &[DataFrame],
        config: &ExecutionConfig,
    ) -> Result<Frame> {
        let out = self.run(operation, inputs)?;
        Frame::reconcile(out, config)
    }
}

impl fmt::Debug for FallbackAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FallbackAdapter::{:?}", self.view_kind())
    }
}

/// Adapters keyed by operation name.
#[derive(Debug, Clone)]
pub struct FallbackRegistry {
    adapters: HashMap<String, FallbackAdapter>,
}

impl Default for FallbackRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FallbackRegistry {
    /// No adapters at all.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Adapters for every built-in operation.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for name in [
            "select",
            "with_columns",
            "filter",
            "drop",
            "head",
            "sort_values",
            "fillna",
            "astype",
            "groupby_agg",
            "value_counts",
            "reset_index",
        ] {
            registry.register(name, FallbackAdapter::Table(table_op));
        }
        for func in [
            AggFunc::Sum,
            AggFunc::Mean,
            AggFunc::Count,
            AggFunc::Min,
            AggFunc::Max,
            AggFunc::Median,
            AggFunc::NUnique,
        ] {
            registry.register(
                Operation::Reduce { func }.name(),
                FallbackAdapter::Table(table_op),
            );
        }
        for name in ["join", "merge", "concat"] {
            registry.register(name, FallbackAdapter::Tables(tables_op));
        }
        registry.register("series.unique", FallbackAdapter::Series(series_op));
        registry.register("series.cumsum", FallbackAdapter::Series(series_op));
        for name in [
            "cat.codes",
            "cat.categories",
            "cat.rename_categories",
            "cat.remove_unused_categories",
        ] {
            registry.register(name, FallbackAdapter::Categorical(categorical_op));
        }
        registry
    }

    /// Bind `name` to `adapter`, returning the previous binding.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        adapter: FallbackAdapter,
    ) -> Option<FallbackAdapter> {
        self.adapters.insert(name.into(), adapter)
    }

    /// Unbind `name`; the operation then has no fallback.
    pub fn remove(&mut self, name: &str) -> Option<FallbackAdapter> {
        self.adapters.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FallbackAdapter> {
        self.adapters.get(name)
    }

    /// Adapter for `operation`, or `UnsupportedOperation` if none is bound.
    pub fn adapter_for(&self, operation: &Operation) -> Result<&FallbackAdapter> {
        let name = operation.name();
        self.get(&name)
            .ok_or_else(|| FrameError::unsupported(name, "no fallback adapter is registered"))
    }
}

fn squeeze(df: &DataFrame) -> Result<Series> {
    df.squeeze().map_err(|_| {
        FrameError::shape_mismatch(format!(
            "expected a single column, got {} columns {:?}",
            df.width(),
            df.column_names()
        ))
    })
}

fn table_op(operation: &Operation, df: &DataFrame) -> Result<DataFrame> {
    operation.eval_tables(std::slice::from_ref(df))
}

fn tables_op(operation: &Operation, dfs: &[DataFrame]) -> Result<DataFrame> {
    operation.eval_tables(dfs)
}

fn series_op(operation: &Operation, series: &Series) -> Result<DataFrame> {
    match operation {
        Operation::Unique => compute::unique(series),
        Operation::CumSum => DataFrame::new(vec![compute::cumsum(series)?]),
        other => Err(wrong_adapter(other, "series")),
    }
}

fn categorical_op(operation: &Operation, cat: &CategoricalAccessor) -> Result<DataFrame> {
    let column = |array: ArrayRef| DataFrame::new(vec![Series::from_array(cat.name(), array)]);
    match operation {
        Operation::CatCodes => column(cat.codes()),
        Operation::CatCategories => column(cat.categories()),
        Operation::CatRenameCategories { categories } => {
            column(cat.rename_categories(categories)?)
        }
        Operation::CatRemoveUnusedCategories => column(cat.remove_unused_categories()?),
        other => Err(wrong_adapter(other, "category")),
    }
}

fn wrong_adapter(operation: &Operation, view: &str) -> FrameError {
    FrameError::invalid_operation(format!(
        "{} cannot run on a {view} view",
        operation.name()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::DataType;

    use super::*;
    use crate::dataframe::Index;
    use crate::ErrorKind;

    fn two_columns() -> DataFrame {
        DataFrame::new(vec![
            Series::from_array("a", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            Series::from_array("b", Arc::new(Int64Array::from(vec![3, 4])) as ArrayRef),
        ])
        .unwrap()
    }

    #[test]
    fn single_column_views_reject_wide_input() {
        let registry = FallbackRegistry::standard();
        let input = two_columns();
        let before = input.clone();
        let err = registry
            .adapter_for(&Operation::CatCodes)
            .unwrap()
            .run(&Operation::CatCodes, std::slice::from_ref(&input))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(input.frame_equal(&before).unwrap());
    }

    #[test]
    fn category_view_needs_category_dtype() {
        let registry = FallbackRegistry::standard();
        let input = two_columns().project(&[0]).unwrap();
        let err = registry
            .adapter_for(&Operation::CatCodes)
            .unwrap()
            .run(&Operation::CatCodes, &[input])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn codes_keep_row_labels() {
        let raw: ArrayRef = Arc::new(StringArray::from(vec!["b", "a", "b"]));
        let cat = compute::to_categorical(&raw, &DataType::Utf8).unwrap();
        let labels: ArrayRef = Arc::new(Int64Array::from(vec![10, 20, 30]));
        let input = DataFrame::new(vec![Series::from_array("c", cat)])
            .unwrap()
            .with_index(Index::labels(None, labels.clone()))
            .unwrap();
        let out = FallbackRegistry::standard()
            .adapter_for(&Operation::CatCodes)
            .unwrap()
            .run(&Operation::CatCodes, &[input])
            .unwrap();
        let codes = out.column("c").unwrap().to_array().unwrap();
        let codes = codes.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(codes.values().to_vec(), vec![1, 0, 1]);
        assert_eq!(out.index(), &Index::labels(None, labels));
    }

    #[test]
    fn removed_adapters_are_unavailable() {
        let mut registry = FallbackRegistry::standard();
        assert!(registry.remove("head").is_some());
        let err = registry.adapter_for(&Operation::Head { n: 1 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn every_operation_has_a_standard_adapter() {
        let registry = FallbackRegistry::standard();
        for op in [
            Operation::Concat,
            Operation::ResetIndex,
            Operation::Unique,
            Operation::CatRemoveUnusedCategories,
            Operation::Reduce {
                func: AggFunc::NUnique,
            },
        ] {
            let adapter = registry.adapter_for(&op).unwrap();
            assert_eq!(adapter.view_kind(), op.view_kind());
        }
    }
}
