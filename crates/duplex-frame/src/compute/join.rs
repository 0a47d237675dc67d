use std::collections::HashMap;
use std::fmt;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::datatypes::Field;
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};

use crate::compute::ops::rebuild;
use crate::dataframe::Index;
use crate::{DataFrame, FrameError, Result};

/// Join type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinHow {
    /// Keep only matching rows.
    Inner,
    /// Keep every left row; unmatched right values are null.
    Left,
}

impl fmt::Display for JoinHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinHow::Inner => write!(f, "inner"),
            JoinHow::Left => write!(f, "left"),
        }
    }
}

/// Column-name suffixes for overlapping non-key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffixes {
    pub left: String,
    pub right: String,
}

impl Suffixes {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self::new("_x", "_y")
    }
}

/// Join two tables on their row labels.
///
/// Output rows follow left order, each left row repeated once per matching
/// right row in right order. Null labels never match. The result keeps the
/// left labels of the emitted rows.
pub fn join_on_index(
    left: &DataFrame,
    right: &DataFrame,
    how: JoinHow,
    suffixes: Option<&Suffixes>,
) -> Result<DataFrame> {
    let lh = left.height();
    let lkey = left.index().to_array(lh);
    let rkey = right.index().to_array(right.height());
    if lkey.data_type() != rkey.data_type() {
        return Err(FrameError::type_mismatch(
            Some("index".to_string()),
            lkey.data_type().to_string(),
            rkey.data_type().to_string(),
        ));
    }
    let (lidx, ridx) = match_rows(&[lkey], &[rkey], how)?;

    let overlap = left
        .column_names()
        .into_iter()
        .filter(|n| right.column_names().contains(n))
        .collect::<Vec<_>>();
    if !overlap.is_empty() && suffixes.is_none() {
        return Err(FrameError::invalid_operation(format!(
            "columns overlap but no suffix specified: {overlap:?}"
        )));
    }
    let default = Suffixes::default();
    let suffixes = suffixes.unwrap_or(&default);

    let lbatch = arrow::compute::take_record_batch(&left.to_batch()?, &lidx)?;
    let rbatch = right.to_batch()?;
    let (mut fields, mut arrays) = named_columns(&lbatch, &overlap, &suffixes.left, &[]);
    let (rf, ra) = take_columns(&rbatch, &ridx, &overlap, &suffixes.right, &[])?;
    fields.extend(rf);
    arrays.extend(ra);

    let index = left.index().take(&lidx, lh)?;
    rebuild(fields, arrays, index)
}

/// Join two tables on equal values of the `on` columns.
///
/// Key columns appear once, taken from the left side; other overlapping
/// columns get `suffixes`. The result has a default index.
pub fn merge(
    left: &DataFrame,
    right: &DataFrame,
    on: &[String],
    how: JoinHow,
    suffixes: &Suffixes,
) -> Result<DataFrame> {
    if on.is_empty() {
        return Err(FrameError::invalid_operation("merge needs at least one key column"));
    }
    let mut lkeys = Vec::with_capacity(on.len());
    let mut rkeys = Vec::with_capacity(on.len());
    for name in on {
        let l = left.column(name)?.to_array()?;
        let r = right.column(name)?.to_array()?;
        if l.data_type() != r.data_type() {
            return Err(FrameError::type_mismatch(
                Some(name.clone()),
                l.data_type().to_string(),
                r.data_type().to_string(),
            ));
        }
        lkeys.push(l);
        rkeys.push(r);
    }
    let (lidx, ridx) = match_rows(&lkeys, &rkeys, how)?;

    let overlap = left
        .column_names()
        .into_iter()
        .filter(|n| right.column_names().contains(n) && !on.contains(n))
        .collect::<Vec<_>>();
    let lbatch = arrow::compute::take_record_batch(&left.to_batch()?, &lidx)?;
    let (mut fields, mut arrays) = named_columns(&lbatch, &overlap, &suffixes.left, &[]);
    let (rf, ra) = take_columns(&right.to_batch()?, &ridx, &overlap, &suffixes.right, on)?;
    fields.extend(rf);
    arrays.extend(ra);
    rebuild(fields, arrays, Index::Range)
}

/// Matching (left, right) row pairs; right is `None` for unmatched left rows
/// of a left join.
fn match_rows(
    lkeys: &[ArrayRef],
    rkeys: &[ArrayRef],
    how: JoinHow,
) -> Result<(UInt32Array, UInt32Array)> {
    let converter = RowConverter::new(
        lkeys
            .iter()
            .map(|k| SortField::new(k.data_type().clone()))
            .collect(),
    )?;
    let lrows = converter.convert_columns(lkeys)?;
    let rrows = converter.convert_columns(rkeys)?;
    let rheight = rkeys.first().map(|k| k.len()).unwrap_or(0);
    let lheight = lkeys.first().map(|k| k.len()).unwrap_or(0);

    let mut table: HashMap<_, Vec<u32>> = HashMap::new();
    for i in 0..rheight {
        if rkeys.iter().any(|k| k.is_null(i)) {
            continue;
        }
        table.entry(rrows.row(i)).or_default().push(i as u32);
    }

    let mut lidx = Vec::new();
    let mut ridx = Vec::new();
    for i in 0..lheight {
        let matches = if lkeys.iter().any(|k| k.is_null(i)) {
            None
        } else {
            table.get(&lrows.row(i))
        };
        match matches {
            Some(rows) => {
                for r in rows {
                    lidx.push(i as u32);
                    ridx.push(Some(*r));
                }
            }
            None if how == JoinHow::Left => {
                lidx.push(i as u32);
                ridx.push(None);
            }
            None => {}
        }
    }
    Ok((UInt32Array::from(lidx), UInt32Array::from(ridx)))
}

fn named_columns(
    batch: &RecordBatch,
    overlap: &[String],
    suffix: &str,
    skip: &[String],
) -> (Vec<Field>, Vec<ArrayRef>) {
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        if skip.contains(field.name()) {
            continue;
        }
        let name = if overlap.contains(field.name()) {
            format!("{}{suffix}", field.name())
        } else {
            field.name().clone()
        };
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array.clone());
    }
    (fields, arrays)
}

fn take_columns(
    batch: &RecordBatch,
    indices: &UInt32Array,
    overlap: &[String],
    suffix: &str,
    skip: &[String],
) -> Result<(Vec<Field>, Vec<ArrayRef>)> {
    let taken = arrow::compute::take_record_batch(batch, indices)?;
    Ok(named_columns(&taken, overlap, suffix, skip))
}
