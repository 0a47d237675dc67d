use std::collections::HashSet;

use tracing::{debug, info_span, warn};

use crate::bridge::ImportBridge;
use crate::engine::{EngineError, EngineHandle, EnginePlan, ExecOutput, OutputKind};
use crate::fallback::FallbackRegistry;
use crate::frame::{NodeId, Partition};
use crate::{DataFrame, Frame, FrameError, Result};

/// A native pass that produced no result.
struct PassError {
    /// The pending node the failure belongs to, when known.
    node: Option<NodeId>,
    /// Operation name the engine reported.
    operation: Option<String>,
    cause: FrameError,
}

type PassResult<T> = std::result::Result<T, PassError>;

impl From<FrameError> for PassError {
    fn from(cause: FrameError) -> Self {
        Self {
            node: None,
            operation: None,
            cause,
        }
    }
}

impl From<EngineError> for PassError {
    fn from(err: EngineError) -> Self {
        let (node, operation) = match &err {
            EngineError::Unsupported {
                node, operation, ..
            } => (*node, Some(operation.clone())),
            EngineError::Failed {
                node, operation, ..
            } => (Some(*node), Some(operation.clone())),
            _ => (None, None),
        };
        Self {
            node,
            operation,
            cause: err.into(),
        }
    }
}

/// Resolves pending frames.
///
/// A pending lineage goes to the engine as one plan in one `execute` call,
/// with each pending node planned once however many consumers it has.
/// A node's partition is committed only once the pass or adapter computing
/// it has succeeded. If the engine rejects one node as unsupported, or
/// cannot import one of its inputs, that node runs through its fallback
/// adapter and the nodes above it are planned again for the engine.
pub(crate) struct Trigger<'a> {
    bridge: &'a ImportBridge,
    registry: &'a FallbackRegistry,
}

impl<'a> Trigger<'a> {
    pub(crate) fn new(bridge: &'a ImportBridge, registry: &'a FallbackRegistry) -> Self {
        Self { bridge, registry }
    }

    /// Resolve `frame` and return its host table.
    pub(crate) fn materialize(&self, frame: &Frame) -> Result<DataFrame> {
        self.resolve(frame, OutputKind::Host)?;
        for partition in frame.partitions() {
            if partition.host().is_none() {
                self.fetch(partition)?;
            }
        }
        frame.assemble()
    }

    /// Resolve the pending partition of `frame`, if any, into `want`.
    ///
    /// Engine faults are annotated with the operation of the node they
    /// belong to.
    pub(crate) fn resolve(&self, frame: &Frame, want: OutputKind) -> Result<()> {
        let Some(node) = frame.pending_node() else {
            return Ok(());
        };
        let Some(partition) = frame.partition(0, 0).cloned() else {
            return Ok(());
        };
        let span = info_span!(
            "trigger",
            node = %node.id,
            operation = %node.operation.name(),
            output = ?want
        );
        let _enter = span.enter();

        loop {
            let err = match self.run_native(frame, want) {
                Ok(ExecOutput::Host(batch)) => {
                    partition.resolve_host(DataFrame::from_engine_batch(batch)?);
                    return Ok(());
                }
                Ok(ExecOutput::Engine { handle, rows }) => {
                    partition.resolve_engine(handle, rows);
                    return Ok(());
                }
                Err(err) => err,
            };
            let culprit = locate(frame, &err).unwrap_or_else(|| frame.clone());
            let culprit_node = culprit.pending_node().unwrap_or_else(|| node.clone());
            if !err.cause.is_recoverable() {
                return Err(err
                    .cause
                    .in_operation(culprit_node.operation.name(), culprit.shape_info()));
            }
            self.resolve_fallback(&culprit, err.cause)?;
            if culprit_node.id == node.id {
                return Ok(());
            }
        }
    }

    fn run_native(&self, frame: &Frame, want: OutputKind) -> PassResult<ExecOutput> {
        let mut planned = HashSet::new();
        let mut transient = Vec::new();
        let outcome = self
            .plan(frame, &mut planned, &mut transient)
            .and_then(|plan| {
                debug!(
                    operations = plan.operation_count(),
                    plan = %plan.display(),
                    "executing native plan"
                );
                Ok(self.bridge.engine().execute(&plan, want)?)
            });
        self.release(transient);
        outcome
    }

    /// Plan for `frame`: pending nodes become `Apply` the first time they
    /// are reached and `Reuse` after that; resolved frames become a `Scan`
    /// of imported handles.
    fn plan(
        &self,
        frame: &Frame,
        planned: &mut HashSet<NodeId>,
        transient: &mut Vec<EngineHandle>,
    ) -> PassResult<EnginePlan> {
        let Some(node) = frame.pending_node() else {
            return Ok(self.scan(frame, transient)?);
        };
        if !planned.insert(node.id) {
            return Ok(EnginePlan::Reuse { node: node.id });
        }
        let mut inputs = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            let plan = if input.pending_node().is_some() {
                self.plan(input, planned, transient)?
            } else {
                // an input the engine cannot take makes this node host-only
                self.scan(input, transient).map_err(|cause| PassError {
                    node: Some(node.id),
                    operation: Some(node.operation.name()),
                    cause,
                })?
            };
            inputs.push(plan);
        }
        Ok(EnginePlan::Apply {
            node: node.id,
            operation: node.operation.clone(),
            inputs,
        })
    }

    fn scan(&self, frame: &Frame, transient: &mut Vec<EngineHandle>) -> Result<EnginePlan> {
        let mut tables = Vec::with_capacity(frame.row_blocks().len());
        for blocks in frame.row_blocks() {
            let mut row = Vec::with_capacity(blocks.len());
            for partition in blocks {
                let owned = partition.handle().is_some();
                let handle = self.bridge.import(partition)?;
                if !owned && !self.bridge.caches_handles() {
                    transient.push(handle);
                }
                row.push(handle);
            }
            tables.push(row);
        }
        Ok(EnginePlan::Scan { tables })
    }

    /// Run the pending node of `frame` through its adapter. Inputs are
    /// resolved first, each trying the engine again.
    fn resolve_fallback(&self, frame: &Frame, cause: FrameError) -> Result<()> {
        let (Some(node), Some(partition)) = (frame.pending_node(), frame.partition(0, 0)) else {
            return Err(cause);
        };
        let Ok(adapter) = self.registry.adapter_for(&node.operation) else {
            return Err(cause);
        };
        warn!(
            node = %node.id,
            operation = %node.operation.name(),
            cause = %cause,
            "native path rejected, running fallback"
        );
        let inputs = node
            .inputs
            .iter()
            .map(|input| self.materialize(input))
            .collect::<Result<Vec<_>>>()?;
        let out = adapter.run(&node.operation, &inputs)?;
        partition.resolve_host(out);
        Ok(())
    }

    fn fetch(&self, partition: &Partition) -> Result<()> {
        let handle = partition.handle().ok_or_else(|| {
            FrameError::invalid_operation(format!(
                "partition {} has neither host data nor an engine handle",
                partition.id()
            ))
        })?;
        let batch = self.bridge.engine().fetch(handle)?;
        debug!(partition = %partition.id(), handle = %handle, "fetched engine table");
        partition.record_host(DataFrame::from_engine_batch(batch)?);
        Ok(())
    }

    fn release(&self, handles: Vec<EngineHandle>) {
        for handle in handles {
            if let Err(e) = self.bridge.engine().release(handle) {
                warn!(handle = %handle, error = %e, "failed to release transient import");
            }
        }
    }
}

/// The pending frame in `frame`'s lineage a failed pass points at: by node
/// id when the failure carries one, else the deepest node running the
/// reported operation.
fn locate(frame: &Frame, err: &PassError) -> Option<Frame> {
    let lineage = pending_lineage(frame);
    if let Some(id) = err.node {
        return lineage
            .into_iter()
            .find(|f| f.pending_node().is_some_and(|n| n.id == id));
    }
    let operation = err.operation.as_deref()?;
    lineage
        .into_iter()
        .find(|f| f.pending_node().is_some_and(|n| n.operation.name() == operation))
}

/// Pending frames reachable from `frame`, inputs before their consumers.
fn pending_lineage(frame: &Frame) -> Vec<Frame> {
    fn walk(frame: &Frame, seen: &mut HashSet<NodeId>, out: &mut Vec<Frame>) {
        let Some(node) = frame.pending_node() else {
            return;
        };
        if !seen.insert(node.id) {
            return;
        }
        for input in &node.inputs {
            walk(input, seen, out);
        }
        out.push(frame.clone());
    }
    let mut out = Vec::new();
    walk(frame, &mut HashSet::new(), &mut out);
    out
}
