use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::dataframe::{Index, INDEX_COLUMN};
use crate::{FrameError, Result, Series};

const INDEX_NAME_METADATA: &str = "duplex.index_name";

/// A host-resident table backed by one or more Arrow `RecordBatch` values
/// plus its row labels.
///
/// This is the materialized form every [`crate::Frame`] resolves to, and the
/// value the single-node fallback kernels consume and produce.
#[derive(Debug, Clone)]
pub struct DataFrame {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    index: Index,
}

impl DataFrame {
    /// Construct a `DataFrame` from a list of `Series`.
    ///
    /// Chunk boundaries do not need to align across series as long as total lengths match.
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        if columns.is_empty() {
            return Ok(Self::empty());
        }

        let mut seen_names = HashSet::with_capacity(columns.len());
        for c in &columns {
            if c.name() == INDEX_COLUMN {
                return Err(FrameError::schema_mismatch(format!(
                    "column name '{INDEX_COLUMN}' is reserved for row labels"
                )));
            }
            if !seen_names.insert(c.name().to_string()) {
                return Err(FrameError::schema_mismatch(format!(
                    "duplicate column name '{}'",
                    c.name()
                )));
            }
        }

        let expected_len = columns[0].len();
        for c in &columns[1..] {
            if c.len() != expected_len {
                return Err(FrameError::schema_mismatch(format!(
                    "column length mismatch: '{}' has length {}, expected {}",
                    c.name(),
                    c.len(),
                    expected_len
                )));
            }
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name(), c.dtype(), true))
            .collect();
        let schema: SchemaRef = Arc::new(Schema::new(fields));

        let arrays = columns
            .iter()
            .map(|c| {
                if c.chunks().is_empty() {
                    Ok(new_empty_array(&c.dtype()))
                } else {
                    c.to_array()
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(|e| {
            FrameError::schema_mismatch(format!("failed to build RecordBatch: {e}"))
        })?;

        Ok(Self {
            schema,
            batches: vec![batch],
            index: Index::Range,
        })
    }

    /// Construct a `DataFrame` from Arrow record batches (all batches must share the same schema).
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        if batches.is_empty() {
            return Ok(Self::empty());
        }

        let schema = batches[0].schema();
        for (i, b) in batches.iter().enumerate().skip(1) {
            if b.schema().as_ref() != schema.as_ref() {
                return Err(FrameError::schema_mismatch(format!(
                    "schema mismatch between batches: batch 0 != batch {i}"
                )));
            }
        }
        if schema.fields().iter().any(|f| f.name() == INDEX_COLUMN) {
            return Err(FrameError::schema_mismatch(format!(
                "column name '{INDEX_COLUMN}' is reserved for row labels"
            )));
        }

        Ok(Self {
            schema,
            batches,
            index: Index::Range,
        })
    }

    /// Construct a single-batch `DataFrame` with the given row labels.
    pub fn from_batch(batch: RecordBatch, index: Index) -> Result<Self> {
        Self::from_batches(vec![batch])?.with_index(index)
    }

    /// Zero-row table with the given schema and index layout.
    pub fn new_empty(schema: SchemaRef, index: Option<(Option<String>, DataType)>) -> Self {
        let index = match index {
            None => Index::Range,
            Some((name, dtype)) => Index::Labels {
                name,
                values: new_empty_array(&dtype),
            },
        };
        Self {
            batches: vec![RecordBatch::new_empty(schema.clone())],
            schema,
            index,
        }
    }

    /// Return an empty `DataFrame` (no columns, no rows).
    pub fn empty() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
            index: Index::Range,
        }
    }

    /// Replace the row labels.
    pub fn with_index(mut self, index: Index) -> Result<Self> {
        index.check_len(self.height())?;
        self.index = index;
        Ok(self)
    }

    /// Move column `name` into the row labels.
    pub fn set_index(&self, name: &str) -> Result<Self> {
        let labels = self.column(name)?.to_array()?;
        let keep = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name() != name)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let batch = self.to_batch()?.project(&keep)?;
        Self::from_batch(batch, Index::labels(Some(name), labels))
    }

    /// Return the number of rows.
    pub fn height(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Return the number of columns.
    pub fn width(&self) -> usize {
        self.schema.fields().len()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Return the Arrow schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Return the row labels.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Get a column by name (case-sensitive).
    pub fn column(&self, name: &str) -> Result<Series> {
        let idx = self
            .schema
            .fields()
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| FrameError::column_not_found(name.to_string()))?;

        let chunks = self
            .batches
            .iter()
            .map(|b| b.column(idx).clone())
            .collect::<Vec<_>>();
        Ok(Series::from_arrow_unchecked(name, chunks))
    }

    /// Return all columns in construction order.
    pub fn columns(&self) -> Vec<Series> {
        self.schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, f)| {
                let chunks = self
                    .batches
                    .iter()
                    .map(|b| b.column(idx).clone())
                    .collect::<Vec<_>>();
                Series::from_arrow_unchecked(f.name(), chunks)
            })
            .collect()
    }

    /// Squeeze a one-column table into a `Series`.
    pub fn squeeze(&self) -> Result<Series> {
        match self.width() {
            1 => Ok(self.columns().remove(0)),
            n => Err(FrameError::shape_mismatch(format!(
                "expected exactly one column to squeeze, got {n}"
            ))),
        }
    }

    /// Return the underlying Arrow batches.
    pub fn to_arrow(&self) -> Vec<RecordBatch> {
        self.batches.clone()
    }

    /// Concatenate all batches into a single `RecordBatch`.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        match self.batches.as_slice() {
            [] => Ok(RecordBatch::new_empty(self.schema.clone())),
            [single] => Ok(single.clone()),
            batches => Ok(arrow::compute::concat_batches(&self.schema, batches)?),
        }
    }

    /// Rows `offset..offset + len`, labels included.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        let batch = self.to_batch()?.slice(offset, len);
        Ok(Self {
            schema: self.schema.clone(),
            batches: vec![batch],
            index: self.index.slice(offset, len),
        })
    }

    /// Keep the columns at `indices` (row labels are untouched).
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let batch = self.to_batch()?.project(indices)?;
        Ok(Self {
            schema: batch.schema(),
            batches: vec![batch],
            index: self.index.clone(),
        })
    }

    /// Place column blocks of one row block side by side.
    ///
    /// Row labels are taken from the first block; every block must have the
    /// same height.
    pub fn hconcat(parts: &[DataFrame]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::empty());
        };
        let height = first.height();
        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        for part in parts {
            if part.height() != height {
                return Err(FrameError::schema_mismatch(format!(
                    "column blocks disagree on height: {} != {height}",
                    part.height()
                )));
            }
            let batch = part.to_batch()?;
            fields.extend(batch.schema().fields().iter().cloned());
            arrays.extend(batch.columns().iter().cloned());
        }
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new_with_options(
            schema.clone(),
            arrays,
            &RecordBatchOptions::new().with_row_count(Some(height)),
        )?;
        Ok(Self {
            schema,
            batches: vec![batch],
            index: first.index.clone(),
        })
    }

    /// Stack row blocks that share a schema.
    pub fn vconcat(parts: &[DataFrame]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::empty());
        };
        let schema = first.schema();
        let mut batches = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if part.schema().as_ref() != schema.as_ref() {
                return Err(FrameError::schema_mismatch(format!(
                    "schema mismatch between row blocks: block 0 != block {i}"
                )));
            }
            batches.extend(part.batches.iter().cloned());
        }
        let labels = parts
            .iter()
            .map(|p| (&p.index, p.height()))
            .collect::<Vec<_>>();
        let index = Index::concat(&labels)?;
        Ok(Self {
            schema,
            batches,
            index,
        })
    }

    /// Encode as the engine's table layout: explicit labels travel as a
    /// leading `__index__` column, the default index is left implicit.
    pub fn to_engine_batch(&self) -> Result<RecordBatch> {
        let batch = self.to_batch()?;
        let Index::Labels { name, values } = &self.index else {
            return Ok(batch);
        };
        let mut index_field = Field::new(INDEX_COLUMN, values.data_type().clone(), true);
        if let Some(name) = name {
            index_field = index_field.with_metadata(HashMap::from([(
                INDEX_NAME_METADATA.to_string(),
                name.clone(),
            )]));
        }
        let mut fields = vec![Arc::new(index_field)];
        fields.extend(batch.schema().fields().iter().cloned());
        let mut arrays: Vec<ArrayRef> = vec![values.clone()];
        arrays.extend(batch.columns().iter().cloned());
        Ok(RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            arrays,
            &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
        )?)
    }

    /// Inverse of [`DataFrame::to_engine_batch`].
    pub fn from_engine_batch(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let Some(pos) = schema.fields().iter().position(|f| f.name() == INDEX_COLUMN) else {
            return Self::from_batch(batch, Index::Range);
        };
        let name = schema.field(pos).metadata().get(INDEX_NAME_METADATA).cloned();
        let values = batch.column(pos).clone();
        let keep = (0..schema.fields().len())
            .filter(|i| *i != pos)
            .collect::<Vec<_>>();
        let data = batch.project(&keep)?;
        Self::from_batch(data, Index::Labels { name, values })
    }

    /// Value equality of data and labels, ignoring batch boundaries.
    pub fn frame_equal(&self, other: &DataFrame) -> Result<bool> {
        if self.schema.as_ref() != other.schema.as_ref() || self.height() != other.height() {
            return Ok(false);
        }
        let height = self.height();
        let same_index = match (&self.index, &other.index) {
            (Index::Range, Index::Range) => true,
            (a, b) => {
                a.name() == b.name() && a.to_array(height).as_ref() == b.to_array(height).as_ref()
            }
        };
        Ok(same_index && self.to_batch()? == other.to_batch()?)
    }
}
