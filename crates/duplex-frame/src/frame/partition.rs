use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::engine::EngineHandle;
use crate::frame::Frame;
use crate::{DataFrame, Operation};

static NEXT_PARTITION: AtomicU64 = AtomicU64::new(1);
static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

/// Process-unique partition identity; the import cache is keyed by it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(u64);

impl PartitionId {
    fn next() -> Self {
        Self(NEXT_PARTITION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identity of a pending operation node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Where a partition's data currently lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Residency {
    /// Not computed yet.
    Pending,
    /// Materialized in host memory only.
    HostResident,
    /// Available inside the native engine (a host copy may also exist).
    EngineResident,
}

/// Row extent of a partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RowCount {
    Exact(usize),
    /// Only known after the partition is resolved.
    Deferred,
}

impl RowCount {
    pub fn exact(self) -> Option<usize> {
        match self {
            RowCount::Exact(rows) => Some(rows),
            RowCount::Deferred => None,
        }
    }
}

/// A recorded native-path operation waiting for a trigger.
#[derive(Debug)]
pub struct PendingNode {
    pub id: NodeId,
    pub operation: Operation,
    pub inputs: Vec<Frame>,
}

#[derive(Debug, Default)]
struct Payload {
    pending: Option<Arc<PendingNode>>,
    host: Option<DataFrame>,
    handle: Option<EngineHandle>,
}

/// One block of a frame's grid.
///
/// The logical data of a partition never changes. Resolution fills in the
/// payload slots in place, so every frame sharing the partition sees it.
#[derive(Debug)]
pub struct Partition {
    id: PartitionId,
    columns: usize,
    rows: OnceLock<usize>,
    import_failure: OnceLock<String>,
    payload: RwLock<Payload>,
}

impl Partition {
    /// A host-resident block.
    pub fn from_host(df: DataFrame) -> Arc<Self> {
        let rows = OnceLock::new();
        let _ = rows.set(df.height());
        Arc::new(Self {
            id: PartitionId::next(),
            columns: df.width(),
            rows,
            import_failure: OnceLock::new(),
            payload: RwLock::new(Payload {
                host: Some(df),
                ..Payload::default()
            }),
        })
    }

    /// A block computed by `node` once triggered.
    pub(crate) fn pending(node: PendingNode, columns: usize, rows: Option<usize>) -> Arc<Self> {
        let known = OnceLock::new();
        if let Some(rows) = rows {
            let _ = known.set(rows);
        }
        Arc::new(Self {
            id: PartitionId::next(),
            columns,
            rows: known,
            import_failure: OnceLock::new(),
            payload: RwLock::new(Payload {
                pending: Some(Arc::new(node)),
                ..Payload::default()
            }),
        })
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> RowCount {
        match self.rows.get() {
            Some(rows) => RowCount::Exact(*rows),
            None => RowCount::Deferred,
        }
    }

    pub fn residency(&self) -> Residency {
        let payload = self.read();
        if payload.pending.is_some() {
            Residency::Pending
        } else if payload.handle.is_some() {
            Residency::EngineResident
        } else {
            Residency::HostResident
        }
    }

    /// The pending node, while unresolved.
    pub fn pending_node(&self) -> Option<Arc<PendingNode>> {
        self.read().pending.clone()
    }

    /// Host copy, if one exists.
    pub fn host(&self) -> Option<DataFrame> {
        self.read().host.clone()
    }

    /// Engine handle, if the block lives in the engine.
    pub fn handle(&self) -> Option<EngineHandle> {
        self.read().handle
    }

    /// Why the engine refused to import this block, if it did.
    pub fn import_failure(&self) -> Option<&str> {
        self.import_failure.get().map(String::as_str)
    }

    pub(crate) fn record_import_failure(&self, reason: String) {
        let _ = self.import_failure.set(reason);
    }

    pub(crate) fn record_handle(&self, handle: EngineHandle) {
        self.write().handle = Some(handle);
    }

    pub(crate) fn record_host(&self, df: DataFrame) {
        let _ = self.rows.set(df.height());
        self.write().host = Some(df);
    }

    /// Replace the pending computation with its host result.
    pub(crate) fn resolve_host(&self, df: DataFrame) {
        let _ = self.rows.set(df.height());
        let mut payload = self.write();
        payload.host = Some(df);
        payload.pending = None;
    }

    /// Replace the pending computation with an engine-resident result.
    pub(crate) fn resolve_engine(&self, handle: EngineHandle, rows: usize) {
        let _ = self.rows.set(rows);
        let mut payload = self.write();
        payload.handle = Some(handle);
        payload.pending = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Payload> {
        self.payload.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Payload> {
        self.payload.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int64Array};

    use super::*;
    use crate::engine::EngineHandle;
    use crate::Series;

    fn df(n: i64) -> DataFrame {
        DataFrame::new(vec![Series::from_array(
            "a",
            Arc::new(Int64Array::from_iter_values(0..n)) as ArrayRef,
        )])
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let a = Partition::from_host(df(1));
        let b = Partition::from_host(df(1));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn residency_follows_payload() {
        let p = Partition::from_host(df(3));
        assert_eq!(p.residency(), Residency::HostResident);
        assert_eq!(p.rows(), RowCount::Exact(3));
        p.record_handle(EngineHandle::new(7));
        assert_eq!(p.residency(), Residency::EngineResident);
        assert!(p.host().is_some());
    }
}
