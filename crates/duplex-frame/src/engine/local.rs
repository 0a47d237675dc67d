use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use dashmap::DashMap;
use tracing::debug;

use crate::engine::{EngineError, EngineHandle, EnginePlan, ExecOutput, NativeEngine, OutputKind};
use crate::expr::AggFunc;
use crate::frame::NodeId;
use crate::{DataFrame, Operation};

/// Call counters of a [`LocalEngine`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub imports: usize,
    pub executions: usize,
    /// Operations evaluated across all executions; reused nodes count once.
    pub operations: usize,
    pub fetches: usize,
    pub releases: usize,
    /// Tables currently held.
    pub live_tables: usize,
}

/// In-process engine evaluating plans with the crate's kernels.
///
/// Explicit row labels travel as an `__index__` column; a table without one
/// only has the engine's implicit row id, which joins cannot use. Nested,
/// dictionary and union columns are not importable.
#[derive(Debug, Default)]
pub struct LocalEngine {
    tables: DashMap<EngineHandle, DataFrame>,
    next_handle: AtomicU64,
    imports: AtomicUsize,
    executions: AtomicUsize,
    operations: AtomicUsize,
    fetches: AtomicUsize,
    releases: AtomicUsize,
    unsupported: HashSet<String>,
    fail_on: HashSet<String>,
    fault_on: HashSet<String>,
    rejected_dtypes: Vec<DataType>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `operation` (by name) as unsupported up front.
    pub fn without_operation(mut self, operation: impl Into<String>) -> Self {
        self.unsupported.insert(operation.into());
        self
    }

    /// Claim support for `operation` but reject it when a plan runs.
    pub fn fail_on(mut self, operation: impl Into<String>) -> Self {
        self.fail_on.insert(operation.into());
        self
    }

    /// Fail with an internal fault whenever `operation` runs.
    pub fn fault_on(mut self, operation: impl Into<String>) -> Self {
        self.fault_on.insert(operation.into());
        self
    }

    /// Refuse to import tables with a column of `dtype`.
    pub fn reject_dtype(mut self, dtype: DataType) -> Self {
        self.rejected_dtypes.push(dtype);
        self
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            imports: self.imports.load(Ordering::SeqCst),
            executions: self.executions.load(Ordering::SeqCst),
            operations: self.operations.load(Ordering::SeqCst),
            fetches: self.fetches.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
            live_tables: self.tables.len(),
        }
    }

    fn store(&self, df: DataFrame) -> EngineHandle {
        let handle = EngineHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.tables.insert(handle, df);
        handle
    }

    fn table(&self, handle: EngineHandle) -> Result<DataFrame, EngineError> {
        self.tables
            .get(&handle)
            .map(|t| t.value().clone())
            .ok_or(EngineError::UnknownHandle(handle))
    }

    fn representable(&self, dtype: &DataType) -> bool {
        let nested = matches!(
            dtype,
            DataType::Dictionary(_, _)
                | DataType::List(_)
                | DataType::LargeList(_)
                | DataType::FixedSizeList(_, _)
                | DataType::Struct(_)
                | DataType::Map(_, _)
                | DataType::Union(_, _)
        );
        !nested && !self.rejected_dtypes.contains(dtype)
    }

    /// Evaluate `plan`; `done` holds the results of nodes read again later.
    fn run(
        &self,
        plan: &EnginePlan,
        reused: &HashSet<NodeId>,
        done: &mut HashMap<NodeId, DataFrame>,
    ) -> Result<DataFrame, EngineError> {
        match plan {
            EnginePlan::Scan { tables } => {
                let mut rows = Vec::with_capacity(tables.len());
                for row in tables {
                    let blocks = row
                        .iter()
                        .map(|h| self.table(*h))
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.push(DataFrame::hconcat(&blocks).map_err(internal)?);
                }
                DataFrame::vconcat(&rows).map_err(internal)
            }
            EnginePlan::Reuse { node } => done
                .get(node)
                .cloned()
                .ok_or_else(|| EngineError::Internal(format!("{node} is read before it ran"))),
            EnginePlan::Apply {
                node,
                operation,
                inputs,
            } => {
                let name = operation.name();
                if self.fault_on.contains(&name) {
                    return Err(EngineError::Failed {
                        node: *node,
                        operation: name,
                        message: "injected fault".into(),
                    });
                }
                if self.fail_on.contains(&name) || !self.supports(operation) {
                    return Err(EngineError::Unsupported {
                        node: Some(*node),
                        operation: name,
                        reason: "rejected at execution".into(),
                    });
                }
                let inputs = inputs
                    .iter()
                    .map(|p| self.run(p, reused, done))
                    .collect::<Result<Vec<_>, _>>()?;
                if operation.joins_on_index() && inputs.iter().any(|df| df.index().is_default()) {
                    return Err(EngineError::Unsupported {
                        node: Some(*node),
                        operation: name,
                        reason: "cannot join on the implicit row id".into(),
                    });
                }
                let out = operation
                    .eval_tables(&inputs)
                    .map_err(|e| EngineError::Failed {
                        node: *node,
                        operation: name,
                        message: e.to_string(),
                    })?;
                self.operations.fetch_add(1, Ordering::SeqCst);
                if reused.contains(node) {
                    done.insert(*node, out.clone());
                }
                Ok(out)
            }
        }
    }
}

impl NativeEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    fn supports(&self, operation: &Operation) -> bool {
        if self.unsupported.contains(&operation.name()) || operation.contains_host_fn() {
            return false;
        }
        match operation {
            Operation::ValueCounts { .. }
            | Operation::ResetIndex
            | Operation::Unique
            | Operation::CumSum
            | Operation::CatCodes
            | Operation::CatCategories
            | Operation::CatRenameCategories { .. }
            | Operation::CatRemoveUnusedCategories => false,
            other => !other
                .agg_funcs()
                .iter()
                .any(|f| matches!(f, AggFunc::Median | AggFunc::NUnique)),
        }
    }

    fn import_table(&self, batch: &RecordBatch) -> Result<EngineHandle, EngineError> {
        let schema = batch.schema();
        if let Some(field) = schema
            .fields()
            .iter()
            .find(|f| !self.representable(f.data_type()))
        {
            return Err(EngineError::Unrepresentable {
                column: field.name().clone(),
                dtype: field.data_type().to_string(),
            });
        }
        let df = DataFrame::from_engine_batch(batch.clone()).map_err(internal)?;
        self.imports.fetch_add(1, Ordering::SeqCst);
        let handle = self.store(df);
        debug!(handle = %handle, rows = batch.num_rows(), "imported table");
        Ok(handle)
    }

    fn execute(&self, plan: &EnginePlan, output: OutputKind) -> Result<ExecOutput, EngineError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let df = self.run(plan, &plan.reused_nodes(), &mut HashMap::new())?;
        match output {
            OutputKind::Host => Ok(ExecOutput::Host(df.to_engine_batch().map_err(internal)?)),
            OutputKind::Engine => {
                let rows = df.height();
                Ok(ExecOutput::Engine {
                    handle: self.store(df),
                    rows,
                })
            }
        }
    }

    fn fetch(&self, handle: EngineHandle) -> Result<RecordBatch, EngineError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.table(handle)?.to_engine_batch().map_err(internal)
    }

    fn release(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.tables
            .remove(&handle)
            .map(|_| ())
            .ok_or(EngineError::UnknownHandle(handle))
    }
}

fn internal(err: crate::FrameError) -> EngineError {
    EngineError::Internal(err.to_string())
}
