use std::fmt;
use std::path::PathBuf;

/// Errors returned by `duplex-frame` operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The native engine cannot run this operation.
    #[error("operation '{operation}' is not supported by the native engine: {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    /// A partition's data cannot be represented inside the native engine.
    #[error("failed to import partition into the native engine: {message}")]
    ImportFailure { message: String },

    /// The input shape does not fit the view an operation needs.
    #[error("shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// The native engine failed while resolving a pending plan.
    #[error("native engine execution failed: {message}")]
    EngineExecution { message: String },

    /// Releasing an external resource (file, writer, session) failed.
    #[error("failed to release {resource}: {source}")]
    ResourceHandle {
        resource: String,
        source: std::io::Error,
    },

    /// OS-level I/O error (optionally associated with a path).
    #[error("I/O error{path}: {source}", path = path_display(.path))]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Arrow schema-related mismatch (e.g. different schema across batches).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Data type mismatch (e.g. non-numeric aggregation or incompatible dtypes).
    #[error(
        "type mismatch{column}: expected {expected}, got {actual}",
        column = column_display(.column)
    )]
    TypeMismatch {
        column: Option<String>,
        expected: String,
        actual: String,
    },

    /// Referenced column does not exist.
    #[error("column not found: {name}")]
    ColumnNotFound { name: String },

    /// Operation is invalid for the current inputs.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Invalid configuration option was provided.
    #[error("invalid configuration option '{option}': {message}")]
    Configuration { option: String, message: String },

    /// Error originating from Arrow compute / record batch APIs.
    #[error("arrow error: {source}")]
    Arrow { source: arrow::error::ArrowError },

    /// Error originating from Parquet APIs.
    #[error("parquet error: {source}")]
    Parquet {
        source: parquet::errors::ParquetError,
    },

    /// A surfaced failure annotated with the operation and frame it happened on.
    #[error("{operation} on frame of shape {shape} failed: {source}")]
    Operation {
        operation: String,
        shape: ShapeInfo,
        source: Box<FrameError>,
    },

    /// A primary failure whose resource cleanup also failed.
    #[error("{primary} ({} release failure(s) while unwinding)", .secondary.len())]
    WithReleaseFailures {
        primary: Box<FrameError>,
        secondary: Vec<FrameError>,
    },
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Coarse classification of a [`FrameError`], looking through wrappers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedOperation,
    ImportFailure,
    ShapeMismatch,
    EngineExecution,
    ResourceHandle,
    Io,
    SchemaMismatch,
    TypeMismatch,
    ColumnNotFound,
    InvalidOperation,
    Configuration,
    Arrow,
    Parquet,
}

/// Frame shape as known when an error is raised; rows may still be deferred.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShapeInfo {
    pub rows: Option<usize>,
    pub columns: usize,
}

impl fmt::Display for ShapeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rows {
            Some(rows) => write!(f, "({rows}, {})", self.columns),
            None => write!(f, "(?, {})", self.columns),
        }
    }
}

impl FrameError {
    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an import failure.
    pub fn import_failure(message: impl Into<String>) -> Self {
        Self::ImportFailure {
            message: message.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Create an engine execution error.
    pub fn engine_execution(message: impl Into<String>) -> Self {
        Self::EngineExecution {
            message: message.into(),
        }
    }

    /// Create a resource release error.
    pub fn resource_handle(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::ResourceHandle {
            resource: resource.into(),
            source,
        }
    }

    /// Create an I/O error without a path.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create an I/O error associated with a path.
    pub fn io_with_path(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create a schema mismatch error with a message.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create a type mismatch error with optional column context.
    pub fn type_mismatch(
        column: impl Into<Option<String>>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a missing column error.
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn configuration(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Annotate a surfaced failure with the operation name and frame shape.
    ///
    /// Already-annotated errors are returned unchanged so the innermost
    /// operation stays visible.
    pub fn in_operation(self, operation: impl Into<String>, shape: ShapeInfo) -> Self {
        match self {
            err @ Self::Operation { .. } => err,
            other => Self::Operation {
                operation: operation.into(),
                shape,
                source: Box::new(other),
            },
        }
    }

    /// Attach release failures collected while unwinding from `self`.
    pub fn with_release_failures(self, secondary: Vec<FrameError>) -> Self {
        if secondary.is_empty() {
            self
        } else {
            Self::WithReleaseFailures {
                primary: Box::new(self),
                secondary,
            }
        }
    }

    /// Classify this error, looking through the `Operation` and
    /// `WithReleaseFailures` wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::ImportFailure { .. } => ErrorKind::ImportFailure,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::EngineExecution { .. } => ErrorKind::EngineExecution,
            Self::ResourceHandle { .. } => ErrorKind::ResourceHandle,
            Self::Io { .. } => ErrorKind::Io,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Arrow { .. } => ErrorKind::Arrow,
            Self::Parquet { .. } => ErrorKind::Parquet,
            Self::Operation { source, .. } => source.kind(),
            Self::WithReleaseFailures { primary, .. } => primary.kind(),
        }
    }

    /// Returns `true` for failures the dispatch layer recovers from by
    /// falling back to the single-node path.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedOperation | ErrorKind::ImportFailure
        )
    }
}

impl From<arrow::error::ArrowError> for FrameError {
    fn from(source: arrow::error::ArrowError) -> Self {
        Self::Arrow { source }
    }
}

impl From<parquet::errors::ParquetError> for FrameError {
    fn from(source: parquet::errors::ParquetError) -> Self {
        Self::Parquet { source }
    }
}

fn column_display(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|c| format!(" for column '{c}'"))
        .unwrap_or_default()
}

fn path_display(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" for path '{}'", p.display()))
        .unwrap_or_default()
}
