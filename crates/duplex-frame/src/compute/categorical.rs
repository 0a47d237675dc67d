use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, DictionaryArray, Int32Array, StringArray};
use arrow::datatypes::{DataType, Int32Type};
use arrow::row::{RowConverter, SortField};

use crate::{FrameError, Result, Series};

/// Category view over a dictionary-encoded column.
///
/// Codes index into `categories`; a null value has code `-1`.
#[derive(Debug, Clone)]
pub struct CategoricalAccessor {
    name: String,
    codes: Vec<Option<i32>>,
    categories: ArrayRef,
}

impl CategoricalAccessor {
    /// Build the accessor; the series must have a dictionary (category) dtype.
    pub fn try_new(series: &Series) -> Result<Self> {
        if !series.is_categorical() {
            return Err(FrameError::type_mismatch(
                Some(series.name().to_string()),
                "category (dictionary) dtype",
                series.dtype().to_string(),
            ));
        }
        let array = series.to_array()?;
        let dict = array.as_any_dictionary_opt().ok_or_else(|| {
            FrameError::type_mismatch(
                Some(series.name().to_string()),
                "dictionary array",
                array.data_type().to_string(),
            )
        })?;
        let keys = dict.normalized_keys();
        let codes = keys
            .iter()
            .enumerate()
            .map(|(row, key)| {
                if array.is_null(row) {
                    Ok(None)
                } else {
                    i32::try_from(*key).map(Some).map_err(|_| {
                        FrameError::invalid_operation(format!(
                            "category code {key} does not fit in i32"
                        ))
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: series.name().to_string(),
            codes,
            categories: dict.values().clone(),
        })
    }

    /// Name of the underlying series.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Integer codes, `-1` for missing values.
    pub fn codes(&self) -> ArrayRef {
        Arc::new(Int32Array::from_iter_values(
            self.codes.iter().map(|c| c.unwrap_or(-1)),
        ))
    }

    /// The category values, in category order.
    pub fn categories(&self) -> ArrayRef {
        self.categories.clone()
    }

    /// Replace category values one-for-one, keeping codes.
    pub fn rename_categories(&self, new_categories: &[String]) -> Result<ArrayRef> {
        if new_categories.len() != self.categories.len() {
            return Err(FrameError::invalid_operation(format!(
                "new categories need to have the same number of items as the old categories: \
                 {} != {}",
                new_categories.len(),
                self.categories.len()
            )));
        }
        let mut seen = HashSet::with_capacity(new_categories.len());
        if let Some(dup) = new_categories.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(FrameError::invalid_operation(format!(
                "categorical categories must be unique, '{dup}' repeats"
            )));
        }
        let values: ArrayRef = Arc::new(StringArray::from_iter_values(new_categories));
        build_dictionary(&self.codes, values)
    }

    /// Drop categories no value refers to, keeping category order.
    pub fn remove_unused_categories(&self) -> Result<ArrayRef> {
        let used = self.codes.iter().flatten().copied().collect::<HashSet<_>>();
        let mut remap = HashMap::new();
        let mut keep = Vec::new();
        for old in 0..self.categories.len() as i32 {
            if used.contains(&old) {
                remap.insert(old, keep.len() as i32);
                keep.push(old as u32);
            }
        }
        let keep = arrow::array::UInt32Array::from(keep);
        let values = arrow::compute::take(self.categories.as_ref(), &keep, None)?;
        let codes = self
            .codes
            .iter()
            .map(|c| c.and_then(|c| remap.get(&c).copied()))
            .collect::<Vec<_>>();
        build_dictionary(&codes, values)
    }

    /// Rebuild the dictionary array this accessor was created from.
    pub fn to_array(&self) -> Result<ArrayRef> {
        build_dictionary(&self.codes, self.categories.clone())
    }
}

/// Encode `array` as categories sorted by value, nulls kept as null codes.
pub fn to_categorical(array: &ArrayRef, value_type: &DataType) -> Result<ArrayRef> {
    let values = crate::compute::eval::cast_strict(array, value_type)?;
    let order = arrow::compute::sort_to_indices(values.as_ref(), None, None)?;
    let sorted = arrow::compute::take(values.as_ref(), &order, None)?;

    let converter = RowConverter::new(vec![SortField::new(value_type.clone())])?;
    let sorted_rows = converter.convert_columns(&[sorted.clone()])?;
    let mut distinct = Vec::new();
    for i in 0..sorted.len() {
        if sorted.is_null(i) {
            continue;
        }
        if distinct
            .last()
            .map(|prev: &usize| sorted_rows.row(*prev) != sorted_rows.row(i))
            .unwrap_or(true)
        {
            distinct.push(i);
        }
    }
    let positions = HashMap::<_, i32>::from_iter(
        distinct
            .iter()
            .enumerate()
            .map(|(code, row)| (sorted_rows.row(*row), code as i32)),
    );
    let take_idx = arrow::array::UInt32Array::from_iter_values(distinct.iter().map(|i| *i as u32));
    let categories = arrow::compute::take(sorted.as_ref(), &take_idx, None)?;

    let value_rows = converter.convert_columns(&[values.clone()])?;
    let codes = (0..values.len())
        .map(|i| {
            if values.is_null(i) {
                None
            } else {
                positions.get(&value_rows.row(i)).copied()
            }
        })
        .collect::<Vec<_>>();
    build_dictionary(&codes, categories)
}

fn build_dictionary(codes: &[Option<i32>], values: ArrayRef) -> Result<ArrayRef> {
    let keys = Int32Array::from(codes.to_vec());
    let dict = DictionaryArray::<Int32Type>::try_new(keys, values)?;
    Ok(Arc::new(dict))
}
