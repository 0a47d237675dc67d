use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, Float64Array, Int64Array, UInt32Array,
};
use arrow::compute::SortOptions;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};

use crate::compute::eval::{self, cast_strict, is_float, is_numeric};
use crate::dataframe::Index;
use crate::expr::{AggFunc, Expr as E};
use crate::{DataFrame, Expr, FrameError, Result, Series};

/// Reduce every column to a single value; the result is a one-row table
/// with the input's column names.
pub fn reduce(df: &DataFrame, func: AggFunc) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(df.width());
    for series in df.columns() {
        let values = series.to_array()?;
        let reduced = reduce_array(func, &values, series.name())?;
        columns.push(Series::from_array(series.name(), reduced));
    }
    DataFrame::new(columns)
}

/// Reduce one array to a one-element array.
///
/// Sums and means accumulate strictly left to right so results do not depend
/// on how the input was chunked.
pub fn reduce_array(func: AggFunc, values: &ArrayRef, column: &str) -> Result<ArrayRef> {
    match func {
        AggFunc::Count => Ok(Arc::new(Int64Array::from(vec![
            (values.len() - values.null_count()) as i64,
        ]))),
        AggFunc::NUnique => Ok(Arc::new(Int64Array::from(vec![n_unique(values)? as i64]))),
        AggFunc::Min => extreme(values, false),
        AggFunc::Max => extreme(values, true),
        AggFunc::Sum => {
            require_numeric(values, column)?;
            if is_float(values.data_type()) {
                let v = as_f64(values)?;
                let sum = v.iter().flatten().fold(0.0_f64, |acc, x| acc + x);
                Ok(Arc::new(Float64Array::from(vec![sum])))
            } else {
                let v = cast_strict(values, &DataType::Int64)?;
                let v = v
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| FrameError::invalid_operation("bad Int64Array downcast"))?;
                let sum = v.iter().flatten().fold(0_i64, |acc, x| acc.wrapping_add(x));
                Ok(Arc::new(Int64Array::from(vec![sum])))
            }
        }
        AggFunc::Mean => {
            require_numeric(values, column)?;
            let v = as_f64(values)?;
            let (sum, count) = v
                .iter()
                .flatten()
                .fold((0.0_f64, 0_usize), |(s, c), x| (s + x, c + 1));
            let mean = (count > 0).then(|| sum / count as f64);
            Ok(Arc::new(Float64Array::from(vec![mean])))
        }
        AggFunc::Median => {
            require_numeric(values, column)?;
            let v = as_f64(values)?;
            let mut present = v.iter().flatten().collect::<Vec<_>>();
            present.sort_by(|a, b| a.total_cmp(b));
            let median = match present.len() {
                0 => None,
                n if n % 2 == 1 => Some(present[n / 2]),
                n => Some((present[n / 2 - 1] + present[n / 2]) / 2.0),
            };
            Ok(Arc::new(Float64Array::from(vec![median])))
        }
    }
}

/// Group rows by the `by` columns and evaluate `aggs` per group.
///
/// Groups come out sorted by key; rows with a null key are dropped. The
/// result has a default index with the key columns first.
pub fn group_by_agg(df: &DataFrame, by: &[String], aggs: &[Expr]) -> Result<DataFrame> {
    if by.is_empty() {
        return Err(FrameError::invalid_operation(
            "group_by expressions must be non-empty",
        ));
    }
    let batch = df.to_batch()?;
    let keys = by
        .iter()
        .map(|name| Ok(df.column(name)?.to_array()?))
        .collect::<Result<Vec<_>>>()?;
    let inputs = aggs.iter().map(|a| resolve_agg(a, &batch)).collect::<Result<Vec<_>>>()?;

    let groups = group_rows(&keys)?;
    let firsts = UInt32Array::from_iter_values(groups.iter().map(|rows| rows[0]));

    let mut fields = Vec::with_capacity(by.len() + aggs.len());
    let mut arrays = Vec::with_capacity(by.len() + aggs.len());
    for (name, key) in by.iter().zip(&keys) {
        let taken = arrow::compute::take(key.as_ref(), &firsts, None)?;
        fields.push(Field::new(name, taken.data_type().clone(), true));
        arrays.push(taken);
    }
    for agg in &inputs {
        let mut parts = Vec::with_capacity(groups.len());
        for rows in &groups {
            let idx = UInt32Array::from(rows.clone());
            let slice = arrow::compute::take(agg.values.as_ref(), &idx, None)?;
            parts.push(reduce_array(agg.func, &slice, &agg.name)?);
        }
        let column = if parts.is_empty() {
            let probe = reduce_array(agg.func, &agg.values.slice(0, 0), &agg.name)?;
            probe.slice(0, 0)
        } else {
            let refs = parts.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
            arrow::compute::concat(&refs)?
        };
        fields.push(Field::new(&agg.name, column.data_type().clone(), true));
        arrays.push(column);
    }
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| FrameError::schema_mismatch(format!("failed to build RecordBatch: {e}")))?;
    DataFrame::from_batch(batch, Index::Range)
}

/// Count rows per distinct combination of `subset` (all columns when `None`),
/// most frequent first; ties keep key order.
pub fn value_counts(df: &DataFrame, subset: Option<&[String]>) -> Result<DataFrame> {
    let names = match subset {
        Some(names) => names.to_vec(),
        None => df.column_names(),
    };
    let count = E::Column(
        names
            .first()
            .cloned()
            .ok_or_else(|| FrameError::invalid_operation("value_counts needs at least one column"))?,
    )
    .count()
    .alias("count");
    if names.iter().any(|n| n == "count") {
        return Err(FrameError::invalid_operation(
            "value_counts cannot count a column named 'count'",
        ));
    }
    let grouped = group_by_agg(df, &names, &[count])?;
    let counts = grouped.column("count")?.to_array()?;
    let counts = counts
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| FrameError::invalid_operation("bad Int64Array downcast"))?;
    let mut order = (0..grouped.height() as u32).collect::<Vec<_>>();
    order.sort_by(|a, b| {
        counts
            .value(*b as usize)
            .cmp(&counts.value(*a as usize))
            .then(a.cmp(b))
    });
    let order = UInt32Array::from(order);
    let batch = arrow::compute::take_record_batch(&grouped.to_batch()?, &order)?;
    DataFrame::from_batch(batch, Index::Range)
}

/// Distinct values in order of first appearance; null counts as one value.
pub fn unique(series: &Series) -> Result<DataFrame> {
    let values = series.to_array()?;
    let converter = RowConverter::new(vec![SortField::new(values.data_type().clone())])?;
    let rows = converter.convert_columns(&[values.clone()])?;
    let mut seen = HashSet::new();
    let mut keep = Vec::new();
    for i in 0..values.len() {
        if seen.insert(rows.row(i)) {
            keep.push(i as u32);
        }
    }
    let taken = arrow::compute::take(values.as_ref(), &UInt32Array::from(keep), None)?;
    DataFrame::new(vec![Series::from_array(series.name(), taken)])
}

/// Running sum skipping nulls (null rows stay null).
pub fn cumsum(series: &Series) -> Result<Series> {
    let values = series.to_array()?;
    require_numeric(&values, series.name())?;
    let out: ArrayRef = if is_float(values.data_type()) {
        let mut acc = 0.0_f64;
        let v = as_f64(&values)?;
        Arc::new(
            v.iter()
                .map(|x| {
                    x.map(|x| {
                        acc += x;
                        acc
                    })
                })
                .collect::<Float64Array>(),
        )
    } else {
        let v = cast_strict(&values, &DataType::Int64)?;
        let v = v
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| FrameError::invalid_operation("bad Int64Array downcast"))?;
        let mut acc = 0_i64;
        Arc::new(
            v.iter()
                .map(|x| {
                    x.map(|x| {
                        acc = acc.wrapping_add(x);
                        acc
                    })
                })
                .collect::<Int64Array>(),
        )
    };
    Ok(Series::from_array(series.name(), out))
}

/// Row positions per group, groups ordered by key, null keys dropped.
pub(crate) fn group_rows(keys: &[ArrayRef]) -> Result<Vec<Vec<u32>>> {
    let fields = keys
        .iter()
        .map(|k| SortField::new(k.data_type().clone()))
        .collect::<Vec<_>>();
    let converter = RowConverter::new(fields)?;
    let rows = converter.convert_columns(keys)?;
    let height = keys.first().map(|k| k.len()).unwrap_or(0);
    let mut groups = BTreeMap::new();
    for i in 0..height {
        if keys.iter().any(|k| k.is_null(i)) {
            continue;
        }
        groups
            .entry(rows.row(i))
            .or_insert_with(Vec::new)
            .push(i as u32);
    }
    Ok(groups.into_values().collect())
}

struct AggInput {
    name: String,
    func: AggFunc,
    values: ArrayRef,
}

fn resolve_agg(expr: &Expr, batch: &RecordBatch) -> Result<AggInput> {
    let name = eval::output_name(expr);
    let inner = match expr {
        E::Alias { expr, .. } => expr.as_ref(),
        other => other,
    };
    match inner {
        E::Agg { func, expr } => Ok(AggInput {
            name,
            func: *func,
            values: eval::evaluate(expr, batch)?,
        }),
        _ => Err(FrameError::invalid_operation(
            "aggregation expression must be Agg or Alias(Agg)",
        )),
    }
}

fn require_numeric(values: &ArrayRef, column: &str) -> Result<()> {
    if is_numeric(values.data_type()) {
        Ok(())
    } else {
        Err(FrameError::type_mismatch(
            Some(column.to_string()),
            "numeric type",
            values.data_type().to_string(),
        ))
    }
}

fn as_f64(values: &ArrayRef) -> Result<Float64Array> {
    let v = cast_strict(values, &DataType::Float64)?;
    v.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| FrameError::invalid_operation("bad Float64Array downcast"))
}

fn extreme(values: &ArrayRef, max: bool) -> Result<ArrayRef> {
    if values.len() == values.null_count() {
        return Ok(new_null_array(values.data_type(), 1));
    }
    let order = arrow::compute::sort_to_indices(
        values.as_ref(),
        Some(SortOptions {
            descending: max,
            nulls_first: false,
        }),
        Some(1),
    )?;
    Ok(arrow::compute::take(values.as_ref(), &order, None)?)
}

fn n_unique(values: &ArrayRef) -> Result<usize> {
    let converter = RowConverter::new(vec![SortField::new(values.data_type().clone())])?;
    let rows = converter.convert_columns(&[values.clone()])?;
    let mut seen = HashMap::new();
    for i in 0..values.len() {
        if !values.is_null(i) {
            seen.entry(rows.row(i)).or_insert(());
        }
    }
    Ok(seen.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};

    use super::*;
    use crate::expr::col;
    use crate::ErrorKind;

    fn df() -> DataFrame {
        DataFrame::new(vec![
            Series::from_array(
                "g",
                Arc::new(StringArray::from(vec![Some("b"), Some("a"), Some("b"), None])) as ArrayRef,
            ),
            Series::from_array(
                "v",
                Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(3), Some(4)])) as ArrayRef,
            ),
            Series::from_array(
                "f",
                Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0), Some(6.0)]))
                    as ArrayRef,
            ),
        ])
        .unwrap()
    }

    fn i64_at(df: &DataFrame, name: &str, row: usize) -> i64 {
        let a = df.column(name).unwrap().to_array().unwrap();
        a.as_any().downcast_ref::<Int64Array>().unwrap().value(row)
    }

    fn f64_at(df: &DataFrame, name: &str, row: usize) -> f64 {
        let a = df.column(name).unwrap().to_array().unwrap();
        a.as_any().downcast_ref::<Float64Array>().unwrap().value(row)
    }

    #[test]
    fn reductions_skip_nulls() {
        let df = df().project(&[1, 2]).unwrap();
        assert_eq!(i64_at(&reduce(&df, AggFunc::Sum).unwrap(), "v", 0), 10);
        assert_eq!(f64_at(&reduce(&df, AggFunc::Sum).unwrap(), "f", 0), 10.0);
        assert_eq!(i64_at(&reduce(&df, AggFunc::Count).unwrap(), "f", 0), 3);
        assert_eq!(f64_at(&reduce(&df, AggFunc::Median).unwrap(), "v", 0), 2.5);
        assert_eq!(f64_at(&reduce(&df, AggFunc::Median).unwrap(), "f", 0), 3.0);
        assert_eq!(i64_at(&reduce(&df, AggFunc::Max).unwrap(), "v", 0), 4);
    }

    #[test]
    fn sum_of_strings_is_a_type_mismatch() {
        let err = reduce(&df(), AggFunc::Sum).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("numeric"));
    }

    #[test]
    fn min_max_work_on_strings() {
        let out = reduce(&df().project(&[0]).unwrap(), AggFunc::Min).unwrap();
        let a = out.column("g").unwrap().to_array().unwrap();
        assert_eq!(a.as_any().downcast_ref::<StringArray>().unwrap().value(0), "a");
    }

    #[test]
    fn group_by_sorts_keys_and_drops_null_keys() {
        let out = group_by_agg(
            &df(),
            &["g".to_string()],
            &[col("v").sum().alias("sum_v"), col("f").mean()],
        )
        .unwrap();
        assert_eq!(out.height(), 2);
        let g = out.column("g").unwrap().to_array().unwrap();
        let g = g.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(g.value(0), "a");
        assert_eq!(i64_at(&out, "sum_v", 0), 2);
        assert_eq!(i64_at(&out, "sum_v", 1), 4);
        assert!(out.column("f").unwrap().to_array().unwrap().is_null(0));
        assert_eq!(f64_at(&out, "f", 1), 2.0);
    }

    #[test]
    fn group_by_on_empty_input_keeps_schema() {
        let empty = df().slice(0, 0).unwrap();
        let out = group_by_agg(&empty, &["g".to_string()], &[col("v").mean()]).unwrap();
        assert_eq!(out.height(), 0);
        assert_eq!(out.column_names(), vec!["g".to_string(), "v".to_string()]);
        assert_eq!(
            out.schema().field(1).data_type(),
            &arrow::datatypes::DataType::Float64
        );
    }

    #[test]
    fn value_counts_orders_by_frequency() {
        let out = value_counts(&df(), Some(&["g".to_string()])).unwrap();
        let g = out.column("g").unwrap().to_array().unwrap();
        let g = g.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(g.value(0), "b");
        assert_eq!(i64_at(&out, "count", 0), 2);
        assert_eq!(i64_at(&out, "count", 1), 1);
    }

    #[test]
    fn unique_and_cumsum() {
        let g = df().column("g").unwrap();
        assert_eq!(unique(&g).unwrap().height(), 3);

        let c = cumsum(&df().column("f").unwrap()).unwrap().to_array().unwrap();
        let c = c.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(c.value(2), 4.0);
        assert!(c.is_null(1));
    }
}
