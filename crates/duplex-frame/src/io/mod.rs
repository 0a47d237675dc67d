mod csv;
mod options;
mod parquet;
mod resource;

/// CSV readers and writers.
pub use csv::{read_csv, read_csv_with_options, write_csv, write_csv_with_options};
/// I/O option types.
pub use options::{CsvReadOptions, CsvWriteOptions, ParquetReadOptions};
/// Parquet readers and writers.
pub use parquet::{read_parquet, read_parquet_with_options, write_parquet};
/// Result of a write whose resources were released.
pub use resource::Released;

use crate::expr::cols;
use crate::{DataFrame, Dispatcher, Expr, Frame, Operation, Result};

fn finish_read(
    dispatcher: &Dispatcher,
    df: DataFrame,
    predicate: Option<Expr>,
    projection: Option<&[String]>,
) -> Result<Frame> {
    let mut frame = dispatcher.from_dataframe(df)?;
    if let Some(predicate) = predicate {
        frame = dispatcher.apply(Operation::Filter { predicate }, &[frame])?;
    }
    if let Some(columns) = projection {
        let exprs = cols(columns);
        frame = dispatcher.apply(Operation::Select { exprs }, &[frame])?;
    }
    Ok(frame)
}
