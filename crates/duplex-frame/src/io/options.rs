use crate::{Expr, FrameError, Result};

/// Options for reading CSV files into a frame.
#[derive(Debug, Clone)]
pub struct CsvReadOptions {
    pub has_header: bool,
    /// Field delimiter byte (e.g. `b','`).
    pub delimiter: u8,
    pub quote_char: Option<u8>,
    /// Values read as null.
    pub null_values: Vec<String>,
    /// Rows sampled for schema inference.
    pub infer_schema_length: usize,
    /// Columns to keep, in this order.
    pub projection: Option<Vec<String>>,
    /// Filter recorded on the returned frame.
    pub predicate: Option<Expr>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quote_char: Some(b'"'),
            null_values: Vec::new(),
            infer_schema_length: 100,
            projection: None,
            predicate: None,
        }
    }
}

impl CsvReadOptions {
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote_char(mut self, quote_char: Option<u8>) -> Self {
        self.quote_char = quote_char;
        self
    }

    pub fn with_null_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_infer_schema_length(mut self, infer_schema_length: usize) -> Self {
        self.infer_schema_length = infer_schema_length;
        self
    }

    pub fn with_projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_byte("delimiter", Some(self.delimiter))?;
        validate_byte("quote_char", self.quote_char)?;
        if self.infer_schema_length == 0 {
            return Err(FrameError::configuration(
                "infer_schema_length",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Options for writing a frame as CSV.
#[derive(Debug, Clone)]
pub struct CsvWriteOptions {
    pub has_header: bool,
    pub delimiter: u8,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
        }
    }
}

impl CsvWriteOptions {
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_byte("delimiter", Some(self.delimiter))
    }
}

/// Options for reading Parquet files into a frame.
#[derive(Debug, Clone)]
pub struct ParquetReadOptions {
    /// Columns to keep, in this order.
    pub columns: Option<Vec<String>>,
    pub row_groups: Option<Vec<usize>>,
    /// Record batch size for the Parquet reader.
    pub batch_size: usize,
    /// Filter recorded on the returned frame.
    pub predicate: Option<Expr>,
}

impl Default for ParquetReadOptions {
    fn default() -> Self {
        Self {
            columns: None,
            row_groups: None,
            batch_size: 65_536,
            predicate: None,
        }
    }
}

impl ParquetReadOptions {
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_row_groups<I>(mut self, row_groups: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.row_groups = Some(row_groups.into_iter().collect());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FrameError::configuration(
                "batch_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn validate_byte(option: &str, byte: Option<u8>) -> Result<()> {
    if byte == Some(b'\0') {
        return Err(FrameError::configuration(
            option,
            format!("{option} must not be NUL (0x00)"),
        ));
    }
    Ok(())
}
