//! Partitioned frames and their partitions.

#[allow(clippy::module_inception)]
mod frame;
mod partition;

pub use frame::{Frame, IndexMeta};
pub use partition::{NodeId, Partition, PartitionId, PendingNode, Residency, RowCount};
