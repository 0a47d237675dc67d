//! Interface to the native columnar engine.
//!
//! The dispatch layer only imports host tables, hands over one plan per
//! trigger, fetches results and releases handles. [`LocalEngine`] is an
//! in-process engine built on the crate's own kernels.

mod local;
mod plan;

use std::fmt;

use arrow::record_batch::RecordBatch;

use crate::frame::NodeId;
use crate::{FrameError, Operation};

pub use local::{EngineStats, LocalEngine};
pub use plan::EnginePlan;

/// Identifier of one table inside the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// What a plan execution should produce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Ship the result back as a host table.
    Host,
    /// Keep the result inside the engine.
    Engine,
}

/// Result of [`NativeEngine::execute`].
#[derive(Debug, Clone)]
pub enum ExecOutput {
    /// Result table in engine layout (see [`crate::DataFrame::to_engine_batch`]).
    Host(RecordBatch),
    /// Result kept inside the engine.
    Engine { handle: EngineHandle, rows: usize },
}

/// Errors reported by a native engine.
///
/// `node` names the [`EnginePlan::Apply`] node a failure
/// belongs to, so the dispatcher can resubmit just that node.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("operation '{operation}' is not supported: {reason}")]
    Unsupported {
        node: Option<NodeId>,
        operation: String,
        reason: String,
    },

    #[error("operation '{operation}' ({node}) failed: {message}")]
    Failed {
        node: NodeId,
        operation: String,
        message: String,
    },

    #[error("column '{column}' of type {dtype} cannot be represented")]
    Unrepresentable { column: String, dtype: String },

    #[error("unknown engine handle {0}")]
    UnknownHandle(EngineHandle),

    #[error("internal engine fault: {0}")]
    Internal(String),
}

impl From<EngineError> for FrameError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unsupported {
                operation, reason, ..
            } => FrameError::unsupported(operation, reason),
            e @ EngineError::Unrepresentable { .. } => FrameError::import_failure(e.to_string()),
            e => FrameError::engine_execution(e.to_string()),
        }
    }
}

/// A columnar engine the dispatcher can hand work to.
pub trait NativeEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether `operation` may be recorded for native execution.
    fn supports(&self, operation: &Operation) -> bool;

    /// Copy a host table (engine layout) into the engine.
    fn import_table(&self, batch: &RecordBatch) -> Result<EngineHandle, EngineError>;

    /// Run a whole plan in one pass. A [`EnginePlan::Reuse`] must evaluate
    /// to the result of the earlier `Apply` with the same node id.
    fn execute(&self, plan: &EnginePlan, output: OutputKind) -> Result<ExecOutput, EngineError>;

    /// Copy an engine table back to the host (engine layout).
    fn fetch(&self, handle: EngineHandle) -> Result<RecordBatch, EngineError>;

    /// Drop an engine table.
    fn release(&self, handle: EngineHandle) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn engine_errors_map_onto_the_taxonomy() {
        let unsupported: FrameError = EngineError::Unsupported {
            node: None,
            operation: "join".into(),
            reason: "no rowid join".into(),
        }
        .into();
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedOperation);
        assert!(unsupported.is_recoverable());

        let import: FrameError = EngineError::Unrepresentable {
            column: "c".into(),
            dtype: "List(Int64)".into(),
        }
        .into();
        assert_eq!(import.kind(), ErrorKind::ImportFailure);

        let internal: FrameError = EngineError::Internal("boom".into()).into();
        assert_eq!(internal.kind(), ErrorKind::EngineExecution);
        assert!(!internal.is_recoverable());

        let failed: FrameError = EngineError::Failed {
            node: NodeId::next(),
            operation: "filter".into(),
            message: "overflow".into(),
        }
        .into();
        assert_eq!(failed.kind(), ErrorKind::EngineExecution);
        assert!(failed.to_string().contains("'filter'"));
    }
}
