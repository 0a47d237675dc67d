use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::engine::{EngineHandle, NativeEngine};
use crate::frame::{Partition, PartitionId};
use crate::{FrameError, Result};

/// Moves host partitions into the native engine.
///
/// With the handle cache on, each partition is imported at most once per
/// engine: the handle is recorded on the partition, and concurrent imports
/// of the same partition wait on a lock that only lives while an import is
/// in flight. Partitions whose data the engine rejected keep the reason so
/// later dispatches can skip the native path.
pub struct ImportBridge {
    engine: Arc<dyn NativeEngine>,
    cache: bool,
    in_flight: DashMap<PartitionId, Arc<Mutex<()>>>,
}

impl ImportBridge {
    pub fn new(engine: Arc<dyn NativeEngine>, cache: bool) -> Self {
        Self {
            engine,
            cache,
            in_flight: DashMap::new(),
        }
    }

    /// Engine handle for `partition`, importing its host copy if needed.
    ///
    /// Pending partitions cannot be imported. A partition already living in
    /// the engine returns its own handle.
    pub fn import(&self, partition: &Partition) -> Result<EngineHandle> {
        if let Some(handle) = partition.handle() {
            return Ok(handle);
        }
        check_not_failed(partition)?;
        if !self.cache {
            return self.import_uncached(partition);
        }

        let lock = self.in_flight.entry(partition.id()).or_default().clone();
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            // the previous holder may have finished the import
            match partition.handle() {
                Some(handle) => Ok(handle),
                None => check_not_failed(partition)
                    .and_then(|()| self.import_uncached(partition))
                    .inspect(|handle| partition.record_handle(*handle)),
            }
        };
        self.in_flight.remove_if(&partition.id(), |_, current| {
            Arc::ptr_eq(current, &lock) && Arc::strong_count(current) == 2
        });
        outcome
    }

    fn import_uncached(&self, partition: &Partition) -> Result<EngineHandle> {
        let host = partition.host().ok_or_else(|| {
            FrameError::invalid_operation(format!(
                "partition {} is pending and cannot be imported",
                partition.id()
            ))
        })?;
        let batch = host.to_engine_batch()?;
        match self.engine.import_table(&batch) {
            Ok(handle) => {
                debug!(partition = %partition.id(), handle = %handle, rows = batch.num_rows(), "import");
                Ok(handle)
            }
            Err(e) => {
                let err = FrameError::from(e);
                if err.is_recoverable() {
                    partition.record_import_failure(err.to_string());
                }
                debug!(partition = %partition.id(), error = %err, "import rejected");
                Err(err)
            }
        }
    }

    /// Returns `true` if the engine rejected this partition before.
    pub fn has_failed(&self, partition: &Partition) -> bool {
        partition.import_failure().is_some()
    }

    /// Whether imports are cached per partition.
    pub fn caches_handles(&self) -> bool {
        self.cache
    }

    /// Imports currently holding a per-partition lock.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn engine(&self) -> &dyn NativeEngine {
        self.engine.as_ref()
    }
}

fn check_not_failed(partition: &Partition) -> Result<()> {
    match partition.import_failure() {
        Some(reason) => Err(FrameError::import_failure(format!(
            "partition {} was rejected before: {reason}",
            partition.id()
        ))),
        None => Ok(()),
    }
}

impl std::fmt::Debug for ImportBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportBridge")
            .field("engine", &self.engine.name())
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::DataType;

    use super::*;
    use crate::engine::LocalEngine;
    use crate::{DataFrame, ErrorKind, Series};

    fn partition() -> Arc<Partition> {
        Partition::from_host(
            DataFrame::new(vec![Series::from_array(
                "a",
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
            )])
            .unwrap(),
        )
    }

    #[test]
    fn cached_import_happens_once() {
        let engine = Arc::new(LocalEngine::new());
        let bridge = ImportBridge::new(engine.clone(), true);
        let p = partition();
        let a = bridge.import(&p).unwrap();
        let b = bridge.import(&p).unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.stats().imports, 1);
    }

    #[test]
    fn uncached_imports_make_distinct_copies() {
        let engine = Arc::new(LocalEngine::new());
        let bridge = ImportBridge::new(engine.clone(), false);
        let p = partition();
        assert_ne!(bridge.import(&p).unwrap(), bridge.import(&p).unwrap());
        assert_eq!(engine.stats().imports, 2);
    }

    #[test]
    fn rejected_partitions_are_remembered() {
        let engine = Arc::new(LocalEngine::new().reject_dtype(DataType::Utf8));
        let bridge = ImportBridge::new(engine.clone(), true);
        let p = Partition::from_host(
            DataFrame::new(vec![Series::from_array(
                "s",
                Arc::new(StringArray::from(vec!["x"])) as ArrayRef,
            )])
            .unwrap(),
        );
        let err = bridge.import(&p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFailure);
        assert!(bridge.has_failed(&p));
        assert_eq!(bridge.import(&p).unwrap_err().kind(), ErrorKind::ImportFailure);
        assert!(p.import_failure().unwrap().contains("Utf8"));
        assert_eq!(bridge.in_flight(), 0);
    }

    #[test]
    fn bookkeeping_does_not_outlive_imports() {
        let engine = Arc::new(LocalEngine::new());
        let bridge = ImportBridge::new(engine.clone(), true);
        for _ in 0..100 {
            let p = partition();
            let handle = bridge.import(&p).unwrap();
            assert_eq!(p.handle(), Some(handle));
        }
        assert_eq!(bridge.in_flight(), 0);
        assert_eq!(engine.stats().imports, 100);
    }
}
