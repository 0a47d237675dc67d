//! Single-node columnar kernels.
//!
//! These are the operations the fallback path runs on a materialized
//! [`DataFrame`](crate::DataFrame). The in-process [`LocalEngine`](crate::engine::LocalEngine)
//! evaluates its plans with the same kernels.

mod aggregate;
mod categorical;
pub(crate) mod eval;
mod join;
mod ops;

pub use aggregate::{cumsum, group_by_agg, reduce, reduce_array, unique, value_counts};
pub use categorical::{to_categorical, CategoricalAccessor};
pub use eval::{cast_strict, evaluate, fill_null, output_name};
pub use join::{join_on_index, merge, JoinHow, Suffixes};
pub use ops::{
    astype, concat, drop, fillna, filter, head, reset_index, select, sort_values, with_columns,
};
