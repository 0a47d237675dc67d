use std::collections::HashSet;
use std::sync::Arc;

use arrow::datatypes::{DataType, SchemaRef};

use crate::config::ExecutionConfig;
use crate::dataframe::Index;
use crate::error::ShapeInfo;
use crate::frame::{Partition, PendingNode, Residency, RowCount};
use crate::{DataFrame, FrameError, Result};

/// Row-label layout of a frame, known without its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMeta {
    /// Positional `0..n` labels.
    Default,
    /// Explicit labels.
    Labels {
        name: Option<String>,
        dtype: DataType,
    },
}

impl IndexMeta {
    pub fn of(index: &Index) -> Self {
        match index {
            Index::Range => IndexMeta::Default,
            Index::Labels { name, values } => IndexMeta::Labels {
                name: name.clone(),
                dtype: values.data_type().clone(),
            },
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, IndexMeta::Default)
    }
}

/// A partitioned, immutable table.
///
/// Partitions form a `[row_block][col_block]` grid. Every row block has the
/// same number of column blocks; all blocks of a row block carry the same
/// row labels. Cloning a frame shares its partitions.
#[derive(Debug, Clone)]
pub struct Frame {
    grid: Arc<Vec<Vec<Arc<Partition>>>>,
    schema: SchemaRef,
    index: IndexMeta,
}

impl Frame {
    /// Split a host table by the configured partition sizes.
    pub fn from_dataframe(df: DataFrame, config: &ExecutionConfig) -> Result<Self> {
        let height = df.height();
        let width = df.width();
        let row_bounds = bounds(height, config.row_partition_size);
        let col_bounds = bounds(width, config.column_partition_size);

        let batch = df.to_batch()?;
        let mut grid = Vec::with_capacity(row_bounds.len());
        for (offset, len) in row_bounds {
            let rows = batch.slice(offset, len);
            let labels = df.index().slice(offset, len);
            let mut blocks = Vec::with_capacity(col_bounds.len());
            for (start, count) in &col_bounds {
                let projection = (*start..start + count).collect::<Vec<_>>();
                let block = DataFrame::from_batch(rows.project(&projection)?, labels.clone())?;
                blocks.push(Partition::from_host(block));
            }
            grid.push(blocks);
        }
        Ok(Self {
            grid: Arc::new(grid),
            schema: df.schema(),
            index: IndexMeta::of(df.index()),
        })
    }

    /// Wrap a host table as a one-partition frame.
    pub fn single(df: DataFrame) -> Self {
        let schema = df.schema();
        let index = IndexMeta::of(df.index());
        Self {
            grid: Arc::new(vec![vec![Partition::from_host(df)]]),
            schema,
            index,
        }
    }

    /// Wrap a fallback result: one partition, re-split when larger than
    /// `resplit_rows`.
    pub fn reconcile(df: DataFrame, config: &ExecutionConfig) -> Result<Self> {
        if df.height() > config.resplit_rows {
            Self::from_dataframe(df, config)
        } else {
            Ok(Self::single(df))
        }
    }

    /// A 1x1 frame whose single partition is computed by `node`.
    pub(crate) fn pending(
        node: PendingNode,
        schema: SchemaRef,
        index: IndexMeta,
        rows: Option<usize>,
    ) -> Self {
        let partition = Partition::pending(node, schema.fields().len(), rows);
        Self {
            grid: Arc::new(vec![vec![partition]]),
            schema,
            index,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Arrow dtype per column, in column order.
    pub fn dtypes(&self) -> Vec<DataType> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect()
    }

    pub fn width(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn index_meta(&self) -> &IndexMeta {
        &self.index
    }

    /// Total rows, if every row block's extent is known.
    pub fn known_rows(&self) -> Option<usize> {
        self.grid
            .iter()
            .map(|row| row.first().map(|p| p.rows().exact()).unwrap_or(Some(0)))
            .sum()
    }

    /// `(row blocks, column blocks)`.
    pub fn grid_shape(&self) -> (usize, usize) {
        (
            self.grid.len(),
            self.grid.first().map(|r| r.len()).unwrap_or(0),
        )
    }

    pub fn partition(&self, row: usize, col: usize) -> Option<&Arc<Partition>> {
        self.grid.get(row).and_then(|r| r.get(col))
    }

    pub fn row_blocks(&self) -> &[Vec<Arc<Partition>>] {
        &self.grid
    }

    /// All partitions, row block by row block.
    pub fn partitions(&self) -> impl Iterator<Item = &Arc<Partition>> {
        self.grid.iter().flatten()
    }

    /// Returns `true` while any partition is still pending.
    pub fn is_pending(&self) -> bool {
        self.partitions()
            .any(|p| p.residency() == Residency::Pending)
    }

    /// The pending node behind a native-path frame.
    pub(crate) fn pending_node(&self) -> Option<Arc<PendingNode>> {
        match self.grid.as_slice() {
            [row] => match row.as_slice() {
                [single] => single.pending_node(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Partitions of this frame and of every frame its pending nodes read.
    pub fn lineage_partitions(&self) -> Vec<Arc<Partition>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(frame) = stack.pop() {
            for p in frame.partitions() {
                if !seen.insert(p.id()) {
                    continue;
                }
                out.push(p.clone());
                if let Some(node) = p.pending_node() {
                    stack.extend(node.inputs.iter().cloned());
                }
            }
        }
        out
    }

    /// Shape for error reports.
    pub fn shape_info(&self) -> ShapeInfo {
        ShapeInfo {
            rows: self.known_rows(),
            columns: self.width(),
        }
    }

    /// A zero-row table with this frame's columns and label layout.
    pub fn empty_like(&self) -> DataFrame {
        let index = match &self.index {
            IndexMeta::Default => None,
            IndexMeta::Labels { name, dtype } => Some((name.clone(), dtype.clone())),
        };
        DataFrame::new_empty(self.schema.clone(), index)
    }

    /// Stitch host copies of all partitions back into one table.
    pub(crate) fn assemble(&self) -> Result<DataFrame> {
        let mut rows = Vec::with_capacity(self.grid.len());
        for blocks in self.grid.iter() {
            let parts = blocks
                .iter()
                .map(|p| {
                    p.host().ok_or_else(|| {
                        FrameError::invalid_operation(format!(
                            "partition {} has no host copy",
                            p.id()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(DataFrame::hconcat(&parts)?);
        }
        let df = DataFrame::vconcat(&rows)?;
        let dtypes = df
            .schema()
            .fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect::<Vec<_>>();
        if df.column_names() != self.column_names() || dtypes != self.dtypes() {
            return Err(FrameError::schema_mismatch(format!(
                "resolved columns {:?} do not match expected {:?}",
                df.column_names(),
                self.column_names()
            )));
        }
        Ok(df)
    }

    /// Check the grid invariants: regular block counts, column extents that
    /// add up to the width, one row extent and one label slice per row block.
    pub fn validate(&self) -> Result<()> {
        let (_, col_blocks) = self.grid_shape();
        let Some(first_row) = self.grid.first() else {
            return Err(FrameError::invalid_operation("frame has no row blocks"));
        };
        for (r, blocks) in self.grid.iter().enumerate() {
            if blocks.len() != col_blocks {
                return Err(FrameError::invalid_operation(format!(
                    "row block {r} has {} column blocks, expected {col_blocks}",
                    blocks.len()
                )));
            }
            let width = blocks.iter().map(|p| p.columns()).sum::<usize>();
            if width != self.width() {
                return Err(FrameError::invalid_operation(format!(
                    "row block {r} spans {width} columns, expected {}",
                    self.width()
                )));
            }
            for (c, p) in blocks.iter().enumerate() {
                if p.columns() != first_row[c].columns() {
                    return Err(FrameError::invalid_operation(format!(
                        "column block {c} changes width in row block {r}"
                    )));
                }
                if let (RowCount::Exact(a), RowCount::Exact(b)) = (p.rows(), blocks[0].rows()) {
                    if a != b {
                        return Err(FrameError::invalid_operation(format!(
                            "row block {r} mixes {a} and {b} rows"
                        )));
                    }
                }
            }
            let labels = blocks
                .iter()
                .filter_map(|p| p.host())
                .map(|df| df.index().clone())
                .collect::<Vec<_>>();
            if labels.windows(2).any(|w| w[0] != w[1]) {
                return Err(FrameError::invalid_operation(format!(
                    "row block {r} carries different row labels"
                )));
            }
        }
        Ok(())
    }
}

fn bounds(total: usize, size: usize) -> Vec<(usize, usize)> {
    if total == 0 {
        return vec![(0, 0)];
    }
    (0..total)
        .step_by(size.max(1))
        .map(|start| (start, size.min(total - start)))
        .collect()
}
