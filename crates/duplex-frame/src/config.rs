use crate::{FrameError, Result};

/// Environment variable overriding [`ExecutionConfig::row_partition_size`].
pub const ENV_ROW_PARTITION_SIZE: &str = "DUPLEX_ROW_PARTITION_SIZE";
/// Environment variable overriding [`ExecutionConfig::column_partition_size`].
pub const ENV_COLUMN_PARTITION_SIZE: &str = "DUPLEX_COLUMN_PARTITION_SIZE";
/// Environment variable overriding [`ExecutionConfig::native_enabled`].
pub const ENV_NATIVE: &str = "DUPLEX_NATIVE";
/// Environment variable overriding [`ExecutionConfig::handle_cache`].
pub const ENV_HANDLE_CACHE: &str = "DUPLEX_HANDLE_CACHE";

/// Options controlling partitioning and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Maximum number of rows per partition when splitting a table.
    pub row_partition_size: usize,
    /// Maximum number of columns per partition when splitting a table.
    pub column_partition_size: usize,
    /// Whether operations may be routed to the native engine at all.
    pub native_enabled: bool,
    /// Whether the import bridge caches handles per partition.
    pub handle_cache: bool,
    /// Fallback results with more rows than this are re-split into a grid.
    pub resplit_rows: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            row_partition_size: 65_536,
            column_partition_size: 32,
            native_enabled: true,
            handle_cache: true,
            resplit_rows: 4 * 65_536,
        }
    }
}

impl ExecutionConfig {
    /// Set `row_partition_size`.
    pub fn with_row_partition_size(mut self, rows: usize) -> Self {
        self.row_partition_size = rows;
        self
    }

    /// Set `column_partition_size`.
    pub fn with_column_partition_size(mut self, columns: usize) -> Self {
        self.column_partition_size = columns;
        self
    }

    /// Set `native_enabled`.
    pub fn with_native_enabled(mut self, enabled: bool) -> Self {
        self.native_enabled = enabled;
        self
    }

    /// Set `handle_cache`.
    pub fn with_handle_cache(mut self, enabled: bool) -> Self {
        self.handle_cache = enabled;
        self
    }

    /// Set `resplit_rows`.
    pub fn with_resplit_rows(mut self, rows: usize) -> Self {
        self.resplit_rows = rows;
        self
    }

    /// Defaults overridden by `DUPLEX_*` environment variables, validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_ROW_PARTITION_SIZE) {
            cfg.row_partition_size = parse_usize(ENV_ROW_PARTITION_SIZE, &v)?;
            cfg.resplit_rows = cfg.row_partition_size.saturating_mul(4);
        }
        if let Some(v) = lookup(ENV_COLUMN_PARTITION_SIZE) {
            cfg.column_partition_size = parse_usize(ENV_COLUMN_PARTITION_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_NATIVE) {
            cfg.native_enabled = parse_bool(ENV_NATIVE, &v)?;
        }
        if let Some(v) = lookup(ENV_HANDLE_CACHE) {
            cfg.handle_cache = parse_bool(ENV_HANDLE_CACHE, &v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that all sizes are usable.
    pub fn validate(&self) -> Result<()> {
        if self.row_partition_size == 0 {
            return Err(FrameError::configuration(
                "row_partition_size",
                "must be greater than zero",
            ));
        }
        if self.column_partition_size == 0 {
            return Err(FrameError::configuration(
                "column_partition_size",
                "must be greater than zero",
            ));
        }
        if self.resplit_rows < self.row_partition_size {
            return Err(FrameError::configuration(
                "resplit_rows",
                format!(
                    "must be at least row_partition_size ({})",
                    self.row_partition_size
                ),
            ));
        }
        Ok(())
    }
}

fn parse_usize(option: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| FrameError::configuration(option, format!("'{raw}' is not a count: {e}")))
}

fn parse_bool(option: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FrameError::configuration(
            option,
            format!("'{raw}' is not a boolean"),
        )),
    }
}
