mod common;

use std::sync::Arc;

use duplex_frame::engine::LocalEngine;
use duplex_frame::expr::{col, lit};
use duplex_frame::io::{self, CsvReadOptions, CsvWriteOptions};
use duplex_frame::{ErrorKind, Operation};

use common::{dispatcher, random_table, rng};

#[test]
fn writing_a_pending_frame_triggers_one_pass() {
    let engine = Arc::new(LocalEngine::new());
    let dispatcher = dispatcher(engine.clone());
    let source = dispatcher
        .from_dataframe(random_table(&mut rng(41), 50, 4))
        .unwrap();
    let filtered = dispatcher
        .apply(
            Operation::Filter {
                predicate: col("k").eq(lit(1_i64)),
            },
            &[source],
        )
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filtered.parquet");

    let written = io::write_parquet(&dispatcher, &filtered, &path).unwrap();
    assert!(written.is_clean());
    assert_eq!(engine.stats().executions, 1);

    let back = io::read_parquet(&dispatcher, &path).unwrap();
    let back = dispatcher.materialize(&back).unwrap();
    let expected = dispatcher.materialize(&filtered).unwrap();
    assert_eq!(back.height(), expected.height());
    assert_eq!(back.column_names(), expected.column_names());
    assert_eq!(engine.stats().executions, 1);
}

#[test]
fn csv_options_round_trip() {
    let dispatcher = dispatcher(Arc::new(LocalEngine::new()));
    let frame = dispatcher
        .from_dataframe(random_table(&mut rng(42), 30, 3))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.tsv");

    let options = CsvWriteOptions::default().with_delimiter(b'\t');
    io::write_csv_with_options(&dispatcher, &frame, &path, &options).unwrap();
    let read = CsvReadOptions::default()
        .with_delimiter(b'\t')
        .with_projection(["s", "k"]);
    let back = io::read_csv_with_options(&dispatcher, &path, &read).unwrap();
    assert!(!back.is_pending());
    assert_eq!(back.column_names(), vec!["s", "k"]);
    assert_eq!(dispatcher.shape(&back).unwrap(), (30, 2));
}

#[test]
fn failed_open_leaves_no_partial_state() {
    let dispatcher = dispatcher(Arc::new(LocalEngine::new()));
    let frame = dispatcher
        .from_dataframe(random_table(&mut rng(43), 5, 2))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.csv");

    let err = io::write_csv(&dispatcher, &frame, &path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!path.exists());
}
