#[allow(clippy::module_inception)]
mod dataframe;
mod index;
mod series;

/// Host-resident table.
pub use dataframe::DataFrame;
/// Row labels.
pub use index::Index;
/// A named, chunked Arrow array.
pub use series::Series;

/// Column name explicit row labels travel under inside the native engine.
pub const INDEX_COLUMN: &str = "__index__";
