mod common;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::DataType;
use duplex_frame::compute::{self, CategoricalAccessor, JoinHow};
use duplex_frame::engine::LocalEngine;
use duplex_frame::frame::Residency;
use duplex_frame::{
    DataFrame, Dispatcher, ErrorKind, ExecutionConfig, Frame, Operation, Route, Series,
};
use rand::seq::SliceRandom;

use common::{dispatcher, int_column, ints, label_values, rng, with_labels};

fn labelled(labels: Vec<i64>, names: [&str; 3], scale: i64) -> DataFrame {
    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| ints(name, labels.iter().map(|l| l * scale + i as i64).collect()))
        .collect();
    with_labels(DataFrame::new(columns).unwrap(), labels)
}

fn join(dispatcher: &Dispatcher, left: &Frame, right: &Frame, how: JoinHow) -> DataFrame {
    let joined = dispatcher
        .apply(
            Operation::Join {
                how,
                suffixes: None,
            },
            &[left.clone(), right.clone()],
        )
        .unwrap();
    dispatcher.materialize(&joined).unwrap()
}

#[test]
fn join_on_explicit_index_matches_reference() {
    let mut rng = rng(2024);
    let mut left_labels = (0..100).collect::<Vec<i64>>();
    let mut right_labels = (50..150).collect::<Vec<i64>>();
    left_labels.shuffle(&mut rng);
    right_labels.shuffle(&mut rng);
    let left_df = labelled(left_labels.clone(), ["a", "b", "c"], 10);
    let right_df = labelled(right_labels.clone(), ["d", "e", "f"], 100);

    let engine = Arc::new(LocalEngine::new());
    let dispatcher = dispatcher(engine.clone());
    let left = dispatcher.from_dataframe(left_df.clone()).unwrap();
    let right = dispatcher.from_dataframe(right_df.clone()).unwrap();
    let op = Operation::Join {
        how: JoinHow::Inner,
        suffixes: None,
    };
    assert_eq!(
        dispatcher.route(&op, &[left.clone(), right.clone()]),
        Route::Native
    );

    let right_rows: HashMap<i64, usize> = right_labels
        .iter()
        .enumerate()
        .map(|(i, l)| (*l, i))
        .collect();
    let expected_d = |label: i64| right_rows.get(&label).map(|_| label * 100);

    let inner = join(&dispatcher, &left, &right, JoinHow::Inner);
    let want: Vec<i64> = left_labels
        .iter()
        .copied()
        .filter(|l| right_rows.contains_key(l))
        .collect();
    assert_eq!(inner.height(), 50);
    assert_eq!(
        inner.column_names(),
        vec!["a", "b", "c", "d", "e", "f"]
    );
    assert_eq!(label_values(&inner), want.iter().map(|l| Some(*l)).collect::<Vec<_>>());
    assert_eq!(
        int_column(&inner, "d"),
        want.iter().map(|l| expected_d(*l)).collect::<Vec<_>>()
    );
    assert_eq!(
        int_column(&inner, "a"),
        want.iter().map(|l| Some(l * 10)).collect::<Vec<_>>()
    );

    let left_join = join(&dispatcher, &left, &right, JoinHow::Left);
    assert_eq!(left_join.height(), 100);
    assert_eq!(
        label_values(&left_join),
        left_labels.iter().map(|l| Some(*l)).collect::<Vec<_>>()
    );
    assert_eq!(
        int_column(&left_join, "d"),
        left_labels.iter().map(|l| expected_d(*l)).collect::<Vec<_>>()
    );
    assert_eq!(engine.stats().executions, 2);

    let host = Dispatcher::local(ExecutionConfig::default().with_native_enabled(false)).unwrap();
    let host_left = host.from_dataframe(left_df).unwrap();
    let host_right = host.from_dataframe(right_df).unwrap();
    let host_inner = join(&host, &host_left, &host_right, JoinHow::Inner);
    assert!(inner.frame_equal(&host_inner).unwrap());
}

#[test]
fn join_on_default_index_uses_the_fallback() {
    let engine = Arc::new(LocalEngine::new());
    let dispatcher = dispatcher(engine.clone());
    let left = dispatcher
        .from_dataframe(DataFrame::new(vec![ints("a", vec![1, 2, 3])]).unwrap())
        .unwrap();
    let right = dispatcher
        .from_dataframe(DataFrame::new(vec![ints("b", vec![4, 5])]).unwrap())
        .unwrap();
    let op = Operation::Join {
        how: JoinHow::Left,
        suffixes: None,
    };
    assert!(matches!(
        dispatcher.route(&op, &[left.clone(), right.clone()]),
        Route::Fallback { .. }
    ));
    let out = join(&dispatcher, &left, &right, JoinHow::Left);
    assert_eq!(int_column(&out, "b"), vec![Some(4), Some(5), None]);
    assert_eq!(engine.stats().executions, 0);
}

fn category_frame(dispatcher: &Dispatcher, values: &[&str]) -> (Series, Frame) {
    let raw: ArrayRef = Arc::new(StringArray::from(values.to_vec()));
    let series = Series::from_array("c", compute::to_categorical(&raw, &DataType::Utf8).unwrap());
    let frame = dispatcher
        .from_dataframe(DataFrame::new(vec![series.clone()]).unwrap())
        .unwrap();
    (series, frame)
}

#[test]
fn category_adapter_matches_direct_computation() {
    let engine = Arc::new(LocalEngine::new());
    let dispatcher =
        Dispatcher::new(engine.clone(), ExecutionConfig::default()).unwrap();
    let words = ["red", "green", "blue", "green", "red", "red"];
    let (series, frame) = category_frame(&dispatcher, &words);

    let codes = dispatcher.apply(Operation::CatCodes, &[frame]).unwrap();
    assert_eq!(codes.grid_shape(), (1, 1));
    assert_eq!(codes.known_rows(), Some(words.len()));
    assert_eq!(
        codes.partition(0, 0).unwrap().residency(),
        Residency::HostResident
    );
    let got = dispatcher.materialize(&codes).unwrap();
    let want = CategoricalAccessor::try_new(&series).unwrap().codes();
    assert_eq!(got.column("c").unwrap().to_array().unwrap().as_ref(), want.as_ref());
    assert_eq!(engine.stats().executions, 0);
}

#[test]
fn category_operations_after_a_native_head() {
    let engine = Arc::new(LocalEngine::new());
    let dispatcher = Dispatcher::new(engine.clone(), ExecutionConfig::default()).unwrap();
    let (series, frame) = category_frame(&dispatcher, &["x", "y", "z", "x"]);

    // dictionary columns cannot be imported, so the head resolves on the host
    let head = dispatcher
        .apply(Operation::Head { n: 2 }, &[frame])
        .unwrap();
    assert!(head.is_pending());
    let pruned = dispatcher
        .apply(Operation::CatRemoveUnusedCategories, &[head])
        .unwrap();
    let renamed = dispatcher
        .apply(
            Operation::CatRenameCategories {
                categories: vec!["X".into(), "Y".into()],
            },
            &[pruned.clone()],
        )
        .unwrap();

    let first_two = Series::from_array("c", series.to_array().unwrap().slice(0, 2));
    let direct = CategoricalAccessor::try_new(&first_two)
        .unwrap()
        .remove_unused_categories()
        .unwrap();
    let got = dispatcher.materialize(&pruned).unwrap();
    assert_eq!(got.column("c").unwrap().to_array().unwrap().as_ref(), direct.as_ref());

    let categories = dispatcher
        .apply(Operation::CatCategories, &[renamed])
        .unwrap();
    let categories = dispatcher.materialize(&categories).unwrap();
    let values = categories.column("c").unwrap().to_array().unwrap();
    let values = values.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(values.iter().flatten().collect::<Vec<_>>(), vec!["X", "Y"]);
    assert_eq!(engine.stats().imports, 0);
}

#[test]
fn single_column_views_reject_wide_frames() {
    let dispatcher = dispatcher(Arc::new(LocalEngine::new()));
    let df = DataFrame::new(vec![ints("a", vec![1, 2]), ints("b", vec![3, 4])]).unwrap();
    let frame = dispatcher.from_dataframe(df.clone()).unwrap();
    for op in [Operation::CatCodes, Operation::Unique, Operation::CumSum] {
        let err = dispatcher.apply(op, &[frame.clone()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }
    assert!(dispatcher.materialize(&frame).unwrap().frame_equal(&df).unwrap());

    let narrow = dispatcher
        .from_dataframe(DataFrame::new(vec![ints("a", vec![1, 2])]).unwrap())
        .unwrap();
    let err = dispatcher.apply(Operation::CatCodes, &[narrow]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn series_operations_keep_labels_when_row_aligned() {
    let dispatcher = dispatcher(Arc::new(LocalEngine::new()));
    let df = with_labels(
        DataFrame::new(vec![ints("a", vec![3, 1, 3, 2])]).unwrap(),
        vec![10, 11, 12, 13],
    );
    let frame = dispatcher.from_dataframe(df).unwrap();

    let cumsum = dispatcher.apply(Operation::CumSum, &[frame.clone()]).unwrap();
    let cumsum = dispatcher.materialize(&cumsum).unwrap();
    assert_eq!(int_column(&cumsum, "a"), vec![Some(3), Some(4), Some(7), Some(9)]);
    assert_eq!(label_values(&cumsum), vec![Some(10), Some(11), Some(12), Some(13)]);

    let unique = dispatcher.apply(Operation::Unique, &[frame]).unwrap();
    let unique = dispatcher.materialize(&unique).unwrap();
    assert_eq!(int_column(&unique, "a"), vec![Some(3), Some(1), Some(2)]);
    assert!(unique.index().is_default());
}
