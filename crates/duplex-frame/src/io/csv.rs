use std::fs::File;
use std::io::{BufReader, BufWriter, Seek};
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow_csv::reader::{Format, ReaderBuilder};
use arrow_csv::{Writer, WriterBuilder};
use regex::Regex;
use tracing::debug;

use crate::io::options::{CsvReadOptions, CsvWriteOptions};
use crate::io::resource::{scoped, Released};
use crate::{DataFrame, Dispatcher, Frame, FrameError, Result};

/// Read a CSV file into a frame partitioned by the dispatcher's config.
pub fn read_csv(dispatcher: &Dispatcher, path: impl AsRef<Path>) -> Result<Frame> {
    read_csv_with_options(dispatcher, path, &CsvReadOptions::default())
}

/// Read a CSV file with `options`.
///
/// Without a predicate the projection is applied while reading. With one,
/// the filter and then the projection are recorded on the returned frame.
pub fn read_csv_with_options(
    dispatcher: &Dispatcher,
    path: impl AsRef<Path>,
    options: &CsvReadOptions,
) -> Result<Frame> {
    options.validate()?;
    let path = path.as_ref();
    let df = read_table(path, options)?;
    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "read csv");
    let projection = match (&options.projection, &options.predicate) {
        (Some(columns), Some(_)) => Some(columns.as_slice()),
        _ => None,
    };
    super::finish_read(dispatcher, df, options.predicate.clone(), projection)
}

fn read_table(path: &Path, options: &CsvReadOptions) -> Result<DataFrame> {
    let file = File::open(path).map_err(|source| FrameError::io_with_path(source, path))?;
    let mut reader = BufReader::new(file);

    let mut format = Format::default()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter);
    if let Some(quote_char) = options.quote_char {
        format = format.with_quote(quote_char);
    }
    if !options.null_values.is_empty() {
        format = format.with_null_regex(null_regex(&options.null_values)?);
    }

    let (schema, _) = format.infer_schema(&mut reader, Some(options.infer_schema_length))?;
    let schema: SchemaRef = Arc::new(schema);
    reader
        .rewind()
        .map_err(|source| FrameError::io_with_path(source, path))?;

    let projection = match (&options.projection, &options.predicate) {
        (Some(columns), None) => Some(projection_indices(&schema, columns)?),
        _ => None,
    };
    let csv_reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(reader)?;

    let mut batches = Vec::new();
    for batch in csv_reader {
        let batch = batch?;
        batches.push(match &projection {
            Some(indices) => batch.project(indices)?,
            None => batch,
        });
    }
    if batches.is_empty() {
        let schema = match &projection {
            Some(indices) => Arc::new(schema.project(indices)?),
            None => schema,
        };
        return Ok(DataFrame::new_empty(schema, None));
    }
    DataFrame::from_batches(batches)
}

fn null_regex(values: &[String]) -> Result<Regex> {
    let pattern = values
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| FrameError::configuration("null_values", format!("invalid regex: {e}")))
}

fn projection_indices(schema: &SchemaRef, columns: &[String]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| FrameError::column_not_found(name.clone()))
        })
        .collect()
}

/// Resolve `frame` and write its columns to a CSV file.
///
/// Row labels are not written; reset the index first to keep them.
pub fn write_csv(
    dispatcher: &Dispatcher,
    frame: &Frame,
    path: impl AsRef<Path>,
) -> Result<Released<()>> {
    write_csv_with_options(dispatcher, frame, path, &CsvWriteOptions::default())
}

/// Resolve `frame` and write it with `options`. The file is flushed and
/// synced on every path out.
pub fn write_csv_with_options(
    dispatcher: &Dispatcher,
    frame: &Frame,
    path: impl AsRef<Path>,
    options: &CsvWriteOptions,
) -> Result<Released<()>> {
    options.validate()?;
    let path = path.as_ref();
    let df = dispatcher.materialize(frame)?;
    let batch = df.to_batch()?;

    let file = File::create(path).map_err(|source| FrameError::io_with_path(source, path))?;
    let writer = WriterBuilder::new()
        .with_header(options.has_header)
        .with_delimiter(options.delimiter)
        .build(BufWriter::new(file));

    let out = scoped(
        writer,
        |w: &mut Writer<BufWriter<File>>| Ok(w.write(&batch)?),
        |w| close(w, path),
    )?;
    debug!(path = %path.display(), rows = batch.num_rows(), "wrote csv");
    Ok(out)
}

fn close(writer: Writer<BufWriter<File>>, path: &Path) -> Result<()> {
    let resource = || path.display().to_string();
    let file = writer
        .into_inner()
        .into_inner()
        .map_err(|e| FrameError::resource_handle(resource(), e.into_error()))?;
    file.sync_all()
        .map_err(|e| FrameError::resource_handle(resource(), e))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};

    use super::*;
    use crate::config::ExecutionConfig;
    use crate::expr::{col, lit};
    use crate::{ErrorKind, Series};

    fn dispatcher() -> Dispatcher {
        Dispatcher::local(ExecutionConfig::default()).unwrap()
    }

    #[test]
    fn csv_roundtrip_basic() {
        let dispatcher = dispatcher();
        let df = DataFrame::new(vec![
            Series::from_array(
                "a",
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
            ),
            Series::from_array(
                "b",
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])) as ArrayRef,
            ),
            Series::from_array(
                "c",
                Arc::new(StringArray::from(vec![Some("x"), None, Some("z")])) as ArrayRef,
            ),
        ])
        .unwrap();
        let frame = dispatcher.from_dataframe(df.clone()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");

        assert!(write_csv(&dispatcher, &frame, &path).unwrap().is_clean());
        let back = read_csv(&dispatcher, &path).unwrap();
        let back = dispatcher.materialize(&back).unwrap();
        assert_eq!(back.schema().as_ref(), df.schema().as_ref());
        assert_eq!(back.height(), 3);
    }

    #[test]
    fn csv_projection_unknown_column_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let options = CsvReadOptions::default().with_projection(["a", "x"]);
        let err = read_csv_with_options(&dispatcher(), &path, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }

    #[test]
    fn csv_predicate_is_recorded_on_the_frame() {
        let dispatcher = dispatcher();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a,b\n1,x\n2,y\n3,z\n").unwrap();

        let options = CsvReadOptions::default()
            .with_predicate(col("a").gt(lit(1_i64)))
            .with_projection(["b"]);
        let frame = read_csv_with_options(&dispatcher, &path, &options).unwrap();
        assert!(frame.is_pending());
        assert_eq!(frame.column_names(), vec!["b"]);
        assert_eq!(dispatcher.shape(&frame).unwrap(), (2, 1));
    }

    #[test]
    fn csv_invalid_delimiter_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let options = CsvReadOptions::default().with_delimiter(b'\0');
        let err = read_csv_with_options(&dispatcher(), &path, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = read_csv(&dispatcher(), "/definitely/not/here.csv").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("here.csv"));
    }
}
