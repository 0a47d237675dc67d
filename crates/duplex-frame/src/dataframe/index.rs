use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, UInt32Array};
use arrow::datatypes::DataType;

use crate::{FrameError, Result};

/// Row labels of a table.
///
/// `Range` is the implicit `0..n` index; it carries no data of its own and is
/// never shipped to the native engine as a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    /// Default positional index.
    Range,
    /// Explicit labels, one per row.
    Labels {
        name: Option<String>,
        values: ArrayRef,
    },
}

impl Index {
    /// Build an explicit index from label values.
    pub fn labels(name: Option<&str>, values: ArrayRef) -> Self {
        Index::Labels {
            name: name.map(str::to_string),
            values,
        }
    }

    /// Returns `true` for the default positional index.
    pub fn is_default(&self) -> bool {
        matches!(self, Index::Range)
    }

    /// Name of an explicit index.
    pub fn name(&self) -> Option<&str> {
        match self {
            Index::Range => None,
            Index::Labels { name, .. } => name.as_deref(),
        }
    }

    /// Label dtype; the default index is reported as `Int64`.
    pub fn dtype(&self) -> DataType {
        match self {
            Index::Range => DataType::Int64,
            Index::Labels { values, .. } => values.data_type().clone(),
        }
    }

    /// Number of explicit labels, `None` for the default index.
    pub fn len(&self) -> Option<usize> {
        match self {
            Index::Range => None,
            Index::Labels { values, .. } => Some(values.len()),
        }
    }

    /// Materialize the labels for a table of `height` rows.
    pub fn to_array(&self, height: usize) -> ArrayRef {
        match self {
            Index::Range => Arc::new(Int64Array::from_iter_values(0..height as i64)),
            Index::Labels { values, .. } => values.clone(),
        }
    }

    pub(crate) fn check_len(&self, height: usize) -> Result<()> {
        match self.len() {
            Some(len) if len != height => Err(FrameError::schema_mismatch(format!(
                "index length mismatch: {len} labels for {height} rows"
            ))),
            _ => Ok(()),
        }
    }

    /// Slice labels. A default index stays default: row blocks of a
    /// default-indexed table restack into the same positional index.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        match self {
            Index::Range => Index::Range,
            Index::Labels { name, values } => Index::Labels {
                name: name.clone(),
                values: values.slice(offset, len),
            },
        }
    }

    /// Gather labels at `indices`. Reordering turns a default index into
    /// explicit positional labels, as pandas does.
    pub fn take(&self, indices: &UInt32Array, height: usize) -> Result<Self> {
        let values = self.to_array(height);
        let taken = arrow::compute::take(values.as_ref(), indices, None)?;
        Ok(Index::Labels {
            name: self.name().map(str::to_string),
            values: taken,
        })
    }

    /// Stack indexes of consecutive row blocks.
    ///
    /// All-default inputs stay default. Otherwise default blocks contribute
    /// their positions as `Int64` labels and all label dtypes must agree.
    pub fn concat(parts: &[(&Index, usize)]) -> Result<Self> {
        if parts.iter().all(|(idx, _)| idx.is_default()) {
            return Ok(Index::Range);
        }
        let name = parts[0].0.name().map(str::to_string);
        let arrays = parts
            .iter()
            .map(|(idx, height)| idx.to_array(*height))
            .collect::<Vec<_>>();
        let expected = arrays[0].data_type().clone();
        if let Some(other) = arrays.iter().find(|a| a.data_type() != &expected) {
            return Err(FrameError::type_mismatch(
                Some("index".to_string()),
                expected.to_string(),
                other.data_type().to_string(),
            ));
        }
        let refs = arrays.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
        Ok(Index::Labels {
            name,
            values: arrow::compute::concat(&refs)?,
        })
    }
}
