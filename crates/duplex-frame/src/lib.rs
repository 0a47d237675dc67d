//! `duplex-frame` routes dataframe operations between a native columnar
//! engine and a single-node fallback.
//!
//! A [`Frame`] is a grid of [`frame::Partition`]s. [`Dispatcher::apply`]
//! either records the operation as a pending node for the engine (nothing
//! runs yet) or, when the engine cannot take it, materializes the inputs and
//! computes the result on the host right away. Pending work is resolved by a
//! trigger ([`Dispatcher::materialize`], [`Dispatcher::execute`], a deferred
//! [`Dispatcher::shape`], or a writer), which hands the whole pending lineage
//! to the engine in one call.
//!
//! ```no_run
//! use duplex_frame::{col, lit, Dispatcher, ExecutionConfig, Operation};
//!
//! # fn main() -> duplex_frame::Result<()> {
//! let dispatcher = Dispatcher::local(ExecutionConfig::from_env()?)?;
//! let trips = duplex_frame::io::read_csv(&dispatcher, "trips.csv")?;
//! let long = dispatcher.apply(
//!     Operation::Filter { predicate: col("distance").gt(lit(10.0)) },
//!     &[trips],
//! )?;
//! let (rows, _) = dispatcher.shape(&long)?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod dispatch;
mod error;
mod fallback;
mod operation;
mod trigger;

/// Single-node kernels shared by the fallback and the local engine.
pub mod compute;
/// Host-resident tables.
pub mod dataframe;
/// Native engine interface and the in-process reference engine.
pub mod engine;
/// Expression DSL.
pub mod expr;
/// Partitioned frames.
pub mod frame;
/// CSV / Parquet readers and writers.
pub mod io;

pub use crate::bridge::ImportBridge;
pub use crate::config::{
    ExecutionConfig, ENV_COLUMN_PARTITION_SIZE, ENV_HANDLE_CACHE, ENV_NATIVE,
    ENV_ROW_PARTITION_SIZE,
};
pub use crate::dataframe::{DataFrame, Index, Series};
pub use crate::dispatch::{Dispatcher, Route};
pub use crate::error::{ErrorKind, FrameError, Result, ShapeInfo};
pub use crate::expr::{all, col, cols, lit, AggFunc, Expr, Scalar};
pub use crate::fallback::{FallbackAdapter, FallbackRegistry, View};
pub use crate::frame::Frame;
pub use crate::operation::{Arity, Operation, ViewKind};
