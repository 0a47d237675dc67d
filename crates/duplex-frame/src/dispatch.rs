use std::sync::Arc;

use tracing::debug;

use crate::bridge::ImportBridge;
use crate::config::ExecutionConfig;
use crate::engine::{LocalEngine, NativeEngine, OutputKind};
use crate::error::ShapeInfo;
use crate::fallback::FallbackRegistry;
use crate::frame::{IndexMeta, NodeId, PendingNode, Residency};
use crate::operation::ViewKind;
use crate::trigger::Trigger;
use crate::{DataFrame, Frame, FrameError, Operation, Result};

/// Which path an operation takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Recorded as a pending node for the engine.
    Native,
    /// Computed now on the host.
    Fallback { reason: String },
}

/// Entry point: routes operations and resolves frames.
///
/// ```no_run
/// use duplex_frame::{col, lit, Dispatcher, ExecutionConfig, Operation};
/// # fn run(df: duplex_frame::DataFrame) -> duplex_frame::Result<()> {
/// let dispatcher = Dispatcher::local(ExecutionConfig::default())?;
/// let frame = dispatcher.from_dataframe(df)?;
/// let filtered = dispatcher.apply(
///     Operation::Filter { predicate: col("a").gt(lit(1_i64)) },
///     &[frame],
/// )?;
/// let out = dispatcher.materialize(&filtered)?;
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    engine: Arc<dyn NativeEngine>,
    bridge: ImportBridge,
    registry: FallbackRegistry,
    config: ExecutionConfig,
}

impl Dispatcher {
    /// Dispatcher over `engine` with the standard fallback adapters.
    pub fn new(engine: Arc<dyn NativeEngine>, config: ExecutionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bridge: ImportBridge::new(engine.clone(), config.handle_cache),
            engine,
            registry: FallbackRegistry::standard(),
            config,
        })
    }

    /// Dispatcher over a fresh [`LocalEngine`].
    pub fn local(config: ExecutionConfig) -> Result<Self> {
        Self::new(Arc::new(LocalEngine::new()), config)
    }

    /// Replace the fallback adapters.
    pub fn with_registry(mut self, registry: FallbackRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &FallbackRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FallbackRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    pub fn bridge(&self) -> &ImportBridge {
        &self.bridge
    }

    /// Partition a host table by the configured sizes.
    pub fn from_dataframe(&self, df: DataFrame) -> Result<Frame> {
        Frame::from_dataframe(df, &self.config)
    }

    /// Decide the path for `operation` over `frames` without running it.
    pub fn route(&self, operation: &Operation, frames: &[Frame]) -> Route {
        let fallback = |reason: &str| Route::Fallback {
            reason: reason.to_string(),
        };
        if !self.config.native_enabled {
            return fallback("native execution is disabled");
        }
        if operation.contains_host_fn() {
            return fallback("arguments include a host callable");
        }
        if !self.engine.supports(operation) {
            return fallback("not supported by the engine");
        }
        if operation.joins_on_index() && frames.iter().any(|f| f.index_meta().is_default()) {
            return fallback("join on a default index");
        }
        let failed = frames
            .iter()
            .flat_map(|f| f.lineage_partitions())
            .any(|p| self.bridge.has_failed(&p));
        if failed {
            return fallback("an input partition failed to import");
        }
        Route::Native
    }

    /// Apply `operation` to `frames`.
    ///
    /// On the native path this only records a pending node; its columns and,
    /// where possible, its row count are deduced from the inputs' metadata.
    /// On the fallback path the inputs are materialized and the result is
    /// computed before returning.
    pub fn apply(&self, operation: Operation, frames: &[Frame]) -> Result<Frame> {
        let name = operation.name();
        let shape = frames.first().map(Frame::shape_info).unwrap_or(ShapeInfo {
            rows: Some(0),
            columns: 0,
        });
        self.apply_inner(operation, frames)
            .map_err(|e| e.in_operation(name, shape))
    }

    fn apply_inner(&self, operation: Operation, frames: &[Frame]) -> Result<Frame> {
        operation.check_arity(frames.len())?;
        match self.route(&operation, frames) {
            Route::Native => {
                let empties = frames.iter().map(Frame::empty_like).collect::<Vec<_>>();
                let probe = match operation.view_kind() {
                    ViewKind::Table | ViewKind::Tables => operation.eval_tables(&empties)?,
                    // column kernels live behind the adapters
                    ViewKind::Series | ViewKind::Categorical => self
                        .registry
                        .adapter_for(&operation)?
                        .run(&operation, &empties)?,
                };
                let input_rows = frames.iter().map(Frame::known_rows).collect::<Vec<_>>();
                let rows = operation.output_rows(&input_rows);
                let node = PendingNode {
                    id: NodeId::next(),
                    operation,
                    inputs: frames.to_vec(),
                };
                debug!(
                    node = %node.id,
                    operation = %node.operation,
                    rows = ?rows,
                    "recorded native operation"
                );
                Ok(Frame::pending(
                    node,
                    probe.schema(),
                    IndexMeta::of(probe.index()),
                    rows,
                ))
            }
            Route::Fallback { reason } => {
                let adapter = *self.registry.adapter_for(&operation)?;
                debug!(operation = %operation, reason = %reason, "running fallback");
                let trigger = self.trigger();
                let inputs = frames
                    .iter()
                    .map(|f| trigger.materialize(f))
                    .collect::<Result<Vec<_>>>()?;
                adapter.invoke(&operation, &inputs, &self.config)
            }
        }
    }

    /// Resolve `frame` and return its values. Repeated calls reuse the
    /// resolved partitions.
    pub fn materialize(&self, frame: &Frame) -> Result<DataFrame> {
        self.trigger()
            .materialize(frame)
            .map_err(|e| e.in_operation("materialize", frame.shape_info()))
    }

    /// Resolve `frame` inside the engine without copying it back.
    pub fn execute(&self, frame: &Frame) -> Result<()> {
        self.trigger()
            .resolve(frame, OutputKind::Engine)
            .map_err(|e| e.in_operation("execute", frame.shape_info()))
    }

    /// `(rows, columns)`; resolves the frame when its row count is deferred.
    pub fn shape(&self, frame: &Frame) -> Result<(usize, usize)> {
        if let Some(rows) = frame.known_rows() {
            return Ok((rows, frame.width()));
        }
        self.execute(frame)?;
        let rows = frame.known_rows().ok_or_else(|| {
            FrameError::invalid_operation("row count still unknown after resolution")
                .in_operation("shape", frame.shape_info())
        })?;
        Ok((rows, frame.width()))
    }

    /// Import every host-resident partition of `frames` now.
    ///
    /// Returns the number of partitions imported. Partitions the engine
    /// rejects are remembered and skipped; pending ones are left alone.
    pub fn trigger_import(&self, frames: &[Frame]) -> Result<usize> {
        let mut imported = 0;
        for frame in frames {
            for partition in frame.partitions() {
                if partition.residency() != Residency::HostResident {
                    continue;
                }
                match self.bridge.import(partition) {
                    Ok(_) => imported += 1,
                    Err(e) if e.is_recoverable() => {
                        debug!(partition = %partition.id(), error = %e, "skipping import");
                    }
                    Err(e) => return Err(e.in_operation("trigger_import", frame.shape_info())),
                }
            }
        }
        Ok(imported)
    }

    fn trigger(&self) -> Trigger<'_> {
        Trigger::new(&self.bridge, &self.registry)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("engine", &self.engine.name())
            .field("bridge", &self.bridge)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};

    use super::*;
    use crate::expr::{col, lit};
    use crate::{ErrorKind, Series};

    fn df() -> DataFrame {
        DataFrame::new(vec![Series::from_array(
            "a",
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef,
        )])
        .unwrap()
    }

    #[test]
    fn native_apply_records_without_executing() {
        let engine = Arc::new(LocalEngine::new());
        let dispatcher = Dispatcher::new(engine.clone(), ExecutionConfig::default()).unwrap();
        let frame = dispatcher.from_dataframe(df()).unwrap();
        let out = dispatcher
            .apply(
                Operation::WithColumns {
                    exprs: vec![col("a").mul(lit(2_i64)).alias("b")],
                },
                &[frame],
            )
            .unwrap();
        assert!(out.is_pending());
        assert_eq!(out.column_names(), vec!["a", "b"]);
        assert_eq!(out.known_rows(), Some(4));
        assert_eq!(engine.stats().executions, 0);
        assert_eq!(engine.stats().imports, 0);
    }

    #[test]
    fn bad_column_reference_fails_eagerly_with_context() {
        let dispatcher = Dispatcher::local(ExecutionConfig::default()).unwrap();
        let frame = dispatcher.from_dataframe(df()).unwrap();
        let err = dispatcher
            .apply(
                Operation::Filter {
                    predicate: col("missing").gt(lit(1_i64)),
                },
                &[frame],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        let msg = err.to_string();
        assert!(msg.contains("filter"));
        assert!(msg.contains("(4, 1)"));
    }

    #[test]
    fn routing_follows_the_decision_rule() {
        let dispatcher = Dispatcher::local(ExecutionConfig::default()).unwrap();
        let frame = dispatcher.from_dataframe(df()).unwrap();
        let frames = [frame];
        assert_eq!(
            dispatcher.route(&Operation::Head { n: 1 }, &frames),
            Route::Native
        );
        let mapped = Operation::WithColumns {
            exprs: vec![col("a").map("id", |a| Ok(a.clone()))],
        };
        assert!(matches!(
            dispatcher.route(&mapped, &frames),
            Route::Fallback { .. }
        ));
        let join = Operation::Join {
            how: crate::compute::JoinHow::Inner,
            suffixes: Some(Default::default()),
        };
        let both = [frames[0].clone(), frames[0].clone()];
        assert!(matches!(
            dispatcher.route(&join, &both),
            Route::Fallback { .. }
        ));

        let disabled =
            Dispatcher::local(ExecutionConfig::default().with_native_enabled(false)).unwrap();
        assert!(matches!(
            disabled.route(&Operation::Head { n: 1 }, &frames),
            Route::Fallback { .. }
        ));
    }

    #[test]
    fn shape_of_deferred_frame_triggers_once() {
        let engine = Arc::new(LocalEngine::new());
        let dispatcher = Dispatcher::new(engine.clone(), ExecutionConfig::default()).unwrap();
        let frame = dispatcher.from_dataframe(df()).unwrap();
        let filtered = dispatcher
            .apply(
                Operation::Filter {
                    predicate: col("a").gt(lit(2_i64)),
                },
                &[frame],
            )
            .unwrap();
        assert_eq!(filtered.known_rows(), None);
        assert_eq!(dispatcher.shape(&filtered).unwrap(), (2, 1));
        assert_eq!(dispatcher.shape(&filtered).unwrap(), (2, 1));
        assert_eq!(engine.stats().executions, 1);
        assert_eq!(
            filtered.partition(0, 0).unwrap().residency(),
            Residency::EngineResident
        );
    }
}
