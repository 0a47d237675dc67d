#![allow(dead_code)]

use std::sync::{Arc, Once};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use duplex_frame::engine::LocalEngine;
use duplex_frame::{DataFrame, Dispatcher, ExecutionConfig, Index, Series};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

static TRACING: Once = Once::new();

/// Install a stderr subscriber filtered by `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A dispatcher over `engine` with small partitions so grids have several
/// blocks per axis.
pub fn dispatcher(engine: Arc<LocalEngine>) -> Dispatcher {
    init_test_tracing();
    let config = ExecutionConfig::default()
        .with_row_partition_size(16)
        .with_column_partition_size(2)
        .with_resplit_rows(64);
    Dispatcher::new(engine, config).unwrap()
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn ints(name: &str, values: Vec<i64>) -> Series {
    Series::from_array(name, Arc::new(Int64Array::from(values)) as ArrayRef)
}

pub fn floats(name: &str, values: Vec<f64>) -> Series {
    Series::from_array(name, Arc::new(Float64Array::from(values)) as ArrayRef)
}

pub fn strings(name: &str, values: Vec<&str>) -> Series {
    Series::from_array(name, Arc::new(StringArray::from(values)) as ArrayRef)
}

/// `rows` x (`k` int key in 0..keys, `v` int, `w` float, `s` string).
pub fn random_table(rng: &mut StdRng, rows: usize, keys: i64) -> DataFrame {
    let k = (0..rows).map(|_| rng.gen_range(0..keys)).collect();
    let v = (0..rows).map(|_| rng.gen_range(-100..100)).collect();
    let w = (0..rows).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let words = ["alpha", "beta", "gamma", "delta"];
    let s = (0..rows)
        .map(|_| words[rng.gen_range(0..words.len())])
        .collect();
    DataFrame::new(vec![
        ints("k", k),
        ints("v", v),
        floats("w", w),
        strings("s", s),
    ])
    .unwrap()
}

/// Explicit integer labels named `id`.
pub fn with_labels(df: DataFrame, labels: Vec<i64>) -> DataFrame {
    let values: ArrayRef = Arc::new(Int64Array::from(labels));
    df.with_index(Index::labels(Some("id"), values)).unwrap()
}

pub fn int_column(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    let array = df.column(name).unwrap().to_array().unwrap();
    let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

pub fn label_values(df: &DataFrame) -> Vec<Option<i64>> {
    let array = df.index().to_array(df.height());
    let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}
