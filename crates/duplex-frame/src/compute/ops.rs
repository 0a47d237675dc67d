use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, UInt32Array};
use arrow::compute::{lexsort_to_indices, SortColumn, SortOptions};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::compute::categorical::to_categorical;
use crate::compute::eval::{cast_strict, evaluate, fill_null, output_name};
use crate::dataframe::Index;
use crate::expr::{Expr as E, Scalar};
use crate::{DataFrame, Expr, FrameError, Result};

/// Evaluate `exprs` into a new table; `all()` expands to every column.
pub fn select(df: &DataFrame, exprs: &[Expr]) -> Result<DataFrame> {
    if exprs.is_empty() {
        return Err(FrameError::invalid_operation(
            "select needs at least one expression",
        ));
    }
    let batch = df.to_batch()?;
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for expr in exprs {
        if matches!(expr, E::Wildcard) {
            fields.extend(batch.schema().fields().iter().map(|f| f.as_ref().clone()));
            arrays.extend(batch.columns().iter().cloned());
            continue;
        }
        let name = output_name(expr);
        let array = evaluate(expr, &batch)?;
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    rebuild(fields, arrays, df.index().clone())
}

/// Add or replace columns; expressions see the input table only.
pub fn with_columns(df: &DataFrame, exprs: &[Expr]) -> Result<DataFrame> {
    let batch = df.to_batch()?;
    let mut fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect::<Vec<_>>();
    let mut arrays = batch.columns().to_vec();
    for expr in exprs {
        let name = output_name(expr);
        let array = evaluate(expr, &batch)?;
        let field = Field::new(&name, array.data_type().clone(), true);
        match fields.iter().position(|f| f.name() == &name) {
            Some(pos) => {
                fields[pos] = field;
                arrays[pos] = array;
            }
            None => {
                fields.push(field);
                arrays.push(array);
            }
        }
    }
    rebuild(fields, arrays, df.index().clone())
}

/// Keep rows where `predicate` is true; null counts as false.
pub fn filter(df: &DataFrame, predicate: &Expr) -> Result<DataFrame> {
    let batch = df.to_batch()?;
    let mask = evaluate(predicate, &batch)?;
    let mask = mask
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            FrameError::type_mismatch(
                None::<String>,
                DataType::Boolean.to_string(),
                mask.data_type().to_string(),
            )
        })?;
    let indices = UInt32Array::from_iter_values(
        mask.iter()
            .enumerate()
            .filter(|(_, keep)| *keep == Some(true))
            .map(|(i, _)| i as u32),
    );
    take_rows(df, &batch, &indices)
}

/// Remove the named columns.
pub fn drop(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    let names = df.column_names();
    if let Some(missing) = columns.iter().find(|c| !names.contains(c)) {
        return Err(FrameError::column_not_found(missing.clone()));
    }
    let keep = names
        .iter()
        .enumerate()
        .filter(|(_, n)| !columns.contains(n))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    df.project(&keep)
}

/// First `n` rows.
pub fn head(df: &DataFrame, n: usize) -> Result<DataFrame> {
    df.slice(0, n.min(df.height()))
}

/// Stable sort by `by`, nulls last.
pub fn sort_values(df: &DataFrame, by: &[String], descending: bool) -> Result<DataFrame> {
    if by.is_empty() {
        return Err(FrameError::invalid_operation(
            "sort_values needs at least one column",
        ));
    }
    let batch = df.to_batch()?;
    let options = SortOptions {
        descending,
        nulls_first: false,
    };
    let mut columns = by
        .iter()
        .map(|name| {
            Ok(SortColumn {
                values: df.column(name)?.to_array()?,
                options: Some(options),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    // lexsort is unstable; the row position breaks ties
    columns.push(SortColumn {
        values: Arc::new(UInt32Array::from_iter_values(0..batch.num_rows() as u32)),
        options: None,
    });
    let indices = lexsort_to_indices(&columns, None)?;
    take_rows(df, &batch, &indices)
}

/// Replace nulls with `value` in `subset` (every column when `None`).
pub fn fillna(df: &DataFrame, value: &Scalar, subset: Option<&[String]>) -> Result<DataFrame> {
    let batch = df.to_batch()?;
    if let Some(subset) = subset {
        for name in subset {
            df.column(name)?;
        }
    }
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays = Vec::with_capacity(batch.num_columns());
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        let selected = subset.map(|s| s.contains(field.name())).unwrap_or(true);
        let out = if selected {
            fill_null(array, value)?
        } else {
            array.clone()
        };
        fields.push(Field::new(field.name(), out.data_type().clone(), true));
        arrays.push(out);
    }
    rebuild(fields, arrays, df.index().clone())
}

/// Cast the named columns. Casting to a dictionary type builds categories
/// sorted by value.
pub fn astype(df: &DataFrame, dtypes: &[(String, DataType)]) -> Result<DataFrame> {
    for (name, _) in dtypes {
        df.column(name)?;
    }
    let batch = df.to_batch()?;
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays = Vec::with_capacity(batch.num_columns());
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        let out = match dtypes.iter().rev().find(|(n, _)| n == field.name()) {
            None => array.clone(),
            Some((_, target)) => match target {
                DataType::Dictionary(key, value)
                    if key.as_ref() == &DataType::Int32
                        && !matches!(array.data_type(), DataType::Dictionary(_, _)) =>
                {
                    to_categorical(array, value)?
                }
                other => cast_strict(array, other)?,
            },
        };
        fields.push(Field::new(field.name(), out.data_type().clone(), true));
        arrays.push(out);
    }
    rebuild(fields, arrays, df.index().clone())
}

/// Move the row labels into a leading column and restore the default index.
pub fn reset_index(df: &DataFrame) -> Result<DataFrame> {
    let name = df.index().name().unwrap_or("index").to_string();
    if df.column_names().contains(&name) {
        return Err(FrameError::invalid_operation(format!(
            "cannot insert '{name}', already exists"
        )));
    }
    let height = df.height();
    let labels: ArrayRef = match df.index() {
        Index::Range => Arc::new(Int64Array::from_iter_values(0..height as i64)),
        Index::Labels { values, .. } => values.clone(),
    };
    let batch = df.to_batch()?;
    let mut fields = vec![Field::new(&name, labels.data_type().clone(), true)];
    fields.extend(batch.schema().fields().iter().map(|f| f.as_ref().clone()));
    let mut arrays = vec![labels];
    arrays.extend(batch.columns().iter().cloned());
    rebuild(fields, arrays, Index::Range)
}

/// Stack tables with the same column names and dtypes.
pub fn concat(parts: &[DataFrame]) -> Result<DataFrame> {
    let Some(first) = parts.first() else {
        return Err(FrameError::invalid_operation("concat needs at least one table"));
    };
    let schema = first.schema();
    let mut aligned = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let other = part.schema();
        let same = other.fields().len() == schema.fields().len()
            && other
                .fields()
                .iter()
                .zip(schema.fields())
                .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());
        if !same {
            return Err(FrameError::schema_mismatch(format!(
                "cannot append table {i}: columns {:?} do not match {:?}",
                part.column_names(),
                first.column_names()
            )));
        }
        let batch = RecordBatch::try_new(schema.clone(), part.to_batch()?.columns().to_vec())?;
        aligned.push(DataFrame::from_batch(batch, part.index().clone())?);
    }
    DataFrame::vconcat(&aligned)
}

/// Gather rows at `indices`, labels included.
pub(crate) fn take_rows(
    df: &DataFrame,
    batch: &RecordBatch,
    indices: &UInt32Array,
) -> Result<DataFrame> {
    let taken = arrow::compute::take_record_batch(batch, indices)?;
    let index = df.index().take(indices, df.height())?;
    DataFrame::from_batch(taken, index)
}

pub(crate) fn rebuild(fields: Vec<Field>, arrays: Vec<ArrayRef>, index: Index) -> Result<DataFrame> {
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = fields.iter().find(|f| !seen.insert(f.name().clone())) {
        return Err(FrameError::schema_mismatch(format!(
            "duplicate column name '{}'",
            dup.name()
        )));
    }
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| FrameError::schema_mismatch(format!("failed to build RecordBatch: {e}")))?;
    DataFrame::from_batch(batch, index)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::DataType;

    use super::*;
    use crate::expr::{all, col, lit};
    use crate::{ErrorKind, Series};

    fn df() -> DataFrame {
        DataFrame::new(vec![
            Series::from_array(
                "k",
                Arc::new(Int64Array::from(vec![Some(3), None, Some(1), Some(3)])) as ArrayRef,
            ),
            Series::from_array(
                "s",
                Arc::new(StringArray::from(vec!["c", "n", "a", "d"])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    fn i64s(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
        let a = df.column(name).unwrap().to_array().unwrap();
        a.as_any().downcast_ref::<Int64Array>().unwrap().iter().collect()
    }

    #[test]
    fn select_expands_wildcard_and_names_outputs() {
        let out = select(&df(), &[all(), col("k").add(lit(1_i64)).alias("k1")]).unwrap();
        assert_eq!(out.column_names(), vec!["k", "s", "k1"]);
        assert_eq!(i64s(&out, "k1"), vec![Some(4), None, Some(2), Some(4)]);
    }

    #[test]
    fn with_columns_replaces_in_place() {
        let out = with_columns(&df(), &[col("k").fill_null(0_i64)]).unwrap();
        assert_eq!(out.column_names(), vec!["k", "s"]);
        assert_eq!(i64s(&out, "k"), vec![Some(3), Some(0), Some(1), Some(3)]);
    }

    #[test]
    fn filter_turns_default_index_into_positions() {
        let out = filter(&df(), &col("k").gt(lit(2_i64))).unwrap();
        assert_eq!(out.height(), 2);
        let labels = out.index().to_array(out.height());
        let labels = labels.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(labels.values().to_vec(), vec![0, 3]);
    }

    #[test]
    fn sort_is_stable_with_nulls_last() {
        let out = sort_values(&df(), &["k".to_string()], false).unwrap();
        assert_eq!(i64s(&out, "k"), vec![Some(1), Some(3), Some(3), None]);
        let s = out.column("s").unwrap().to_array().unwrap();
        let s = s.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(s.value(1), "c");
        assert_eq!(s.value(2), "d");
    }

    #[test]
    fn drop_missing_column_fails() {
        let err = drop(&df(), &["nope".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert_eq!(drop(&df(), &["s".to_string()]).unwrap().width(), 1);
    }

    #[test]
    fn astype_to_float_and_category() {
        let out = astype(
            &df(),
            &[
                ("k".to_string(), DataType::Float64),
                (
                    "s".to_string(),
                    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                ),
            ],
        )
        .unwrap();
        let k = out.column("k").unwrap().to_array().unwrap();
        assert!(k.as_any().downcast_ref::<Float64Array>().is_some());
        assert!(out.column("s").unwrap().is_categorical());
    }

    #[test]
    fn reset_index_moves_labels_into_a_column() {
        let indexed = df().set_index("s").unwrap();
        let out = reset_index(&indexed).unwrap();
        assert_eq!(out.column_names(), vec!["s", "k"]);
        assert!(out.index().is_default());

        let plain = reset_index(&df()).unwrap();
        assert_eq!(i64s(&plain, "index"), vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn concat_requires_matching_columns() {
        let out = concat(&[df(), head(&df(), 2).unwrap()]).unwrap();
        assert_eq!(out.height(), 6);
        assert!(out.index().is_default());

        let err = concat(&[df(), drop(&df(), &["s".to_string()]).unwrap()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }
}
