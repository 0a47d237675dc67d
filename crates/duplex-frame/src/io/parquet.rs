use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatchReader;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use tracing::debug;

use crate::io::options::ParquetReadOptions;
use crate::io::resource::{scoped, Released};
use crate::{DataFrame, Dispatcher, Frame, FrameError, Result};

/// Read a Parquet file into a frame partitioned by the dispatcher's config.
pub fn read_parquet(dispatcher: &Dispatcher, path: impl AsRef<Path>) -> Result<Frame> {
    read_parquet_with_options(dispatcher, path, &ParquetReadOptions::default())
}

/// Read a Parquet file with `options`.
///
/// The reader only decodes the selected columns plus those the predicate
/// needs; the predicate and final projection are recorded on the frame.
pub fn read_parquet_with_options(
    dispatcher: &Dispatcher,
    path: impl AsRef<Path>,
    options: &ParquetReadOptions,
) -> Result<Frame> {
    options.validate()?;
    let path = path.as_ref();
    let df = read_table(path, options)?;
    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "read parquet");
    let projection = match (&options.columns, &options.predicate) {
        (Some(columns), Some(_)) => Some(columns.as_slice()),
        _ => None,
    };
    super::finish_read(dispatcher, df, options.predicate.clone(), projection)
}

fn read_table(path: &Path, options: &ParquetReadOptions) -> Result<DataFrame> {
    let file = File::open(path).map_err(|source| FrameError::io_with_path(source, path))?;
    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(options.batch_size);
    if let Some(row_groups) = options.row_groups.as_deref() {
        builder = builder.with_row_groups(row_groups.to_vec());
    }

    let mut wanted = options.columns.clone();
    if let (Some(columns), Some(predicate)) = (wanted.as_mut(), &options.predicate) {
        for name in predicate.referenced_columns() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }
    if let Some(columns) = wanted.as_deref() {
        let schema = builder.schema();
        let indices = columns
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map_err(|_| FrameError::column_not_found(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
    }

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    if batches.is_empty() {
        return Ok(DataFrame::new_empty(schema, None));
    }
    DataFrame::from_batches(batches)
}

/// Resolve `frame` and write its columns to a Parquet file.
///
/// Row labels are not written; reset the index first to keep them. The
/// writer is closed on every path out.
pub fn write_parquet(
    dispatcher: &Dispatcher,
    frame: &Frame,
    path: impl AsRef<Path>,
) -> Result<Released<()>> {
    let path = path.as_ref();
    let df = dispatcher.materialize(frame)?;
    let file = File::create(path).map_err(|source| FrameError::io_with_path(source, path))?;
    let writer = ArrowWriter::try_new(file, df.schema(), None)?;

    let out = scoped(
        writer,
        |w| {
            for batch in df.to_arrow() {
                w.write(&batch)?;
            }
            Ok(())
        },
        |w| {
            w.close().map(|_| ()).map_err(|e| {
                FrameError::resource_handle(path.display().to_string(), std::io::Error::other(e))
            })
        },
    )?;
    debug!(path = %path.display(), rows = df.height(), "wrote parquet");
    Ok(out)
}
