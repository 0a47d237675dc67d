use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::datatypes::DataType;

use crate::compute::CategoricalAccessor;
use crate::{FrameError, Result};

/// A named column represented as one or more Arrow `ArrayRef` chunks.
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    chunks: Vec<ArrayRef>,
}

impl Series {
    /// Construct a `Series` from Arrow chunks, validating that all chunks share the same dtype.
    pub fn from_arrow(name: &str, chunks: Vec<ArrayRef>) -> Result<Self> {
        if let Some(first) = chunks.first() {
            let expected = first.data_type().clone();
            for chunk in &chunks[1..] {
                let actual = chunk.data_type();
                if actual != &expected {
                    return Err(FrameError::type_mismatch(
                        Some(name.to_string()),
                        expected.to_string(),
                        actual.to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            chunks,
        })
    }

    /// Construct a single-chunk `Series`.
    pub fn from_array(name: &str, array: ArrayRef) -> Self {
        Self {
            name: name.to_string(),
            chunks: vec![array],
        }
    }

    /// Convert this series into Arrow chunks.
    pub fn to_arrow(&self) -> Vec<ArrayRef> {
        self.chunks.clone()
    }

    /// Concatenate all chunks into one array.
    pub fn to_array(&self) -> Result<ArrayRef> {
        match self.chunks.as_slice() {
            [] => Ok(new_empty_array(&self.dtype())),
            [single] => Ok(single.clone()),
            chunks => {
                let refs = chunks.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
                Ok(arrow::compute::concat(&refs)?)
            }
        }
    }

    /// Return the series name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a copy of this series under a different name.
    pub fn rename(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            chunks: self.chunks.clone(),
        }
    }

    /// Return the logical length of the series.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// Return the Arrow dtype of the series.
    pub fn dtype(&self) -> DataType {
        self.chunks
            .first()
            .map(|c| c.data_type().clone())
            .unwrap_or(DataType::Null)
    }

    /// Returns `true` if this series is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the series holds category (dictionary-encoded) values.
    pub fn is_categorical(&self) -> bool {
        matches!(self.dtype(), DataType::Dictionary(_, _))
    }

    /// Category accessor; fails unless the series has a category dtype.
    pub fn cat(&self) -> Result<CategoricalAccessor> {
        CategoricalAccessor::try_new(self)
    }

    pub(crate) fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    pub(crate) fn from_arrow_unchecked(name: &str, chunks: Vec<ArrayRef>) -> Self {
        Self {
            name: name.to_string(),
            chunks,
        }
    }
}
