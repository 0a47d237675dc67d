mod common;

use std::sync::Arc;

use arrow::datatypes::DataType;
use duplex_frame::compute::{JoinHow, Suffixes};
use duplex_frame::engine::LocalEngine;
use duplex_frame::expr::{col, lit};
use duplex_frame::{AggFunc, DataFrame, Dispatcher, ExecutionConfig, Frame, Operation, Scalar};
use proptest::prelude::*;

use common::{random_table, rng};

fn pipelines() -> Vec<Vec<Operation>> {
    vec![
        vec![
            Operation::Filter {
                predicate: col("v").gt(lit(0_i64)).and_(col("w").lt(lit(0.5))),
            },
            Operation::WithColumns {
                exprs: vec![col("v").add(col("k")).alias("vk")],
            },
            Operation::SortValues {
                by: vec!["k".into(), "v".into()],
                descending: false,
            },
        ],
        vec![Operation::GroupByAgg {
            by: vec!["k".into()],
            aggs: vec![
                col("v").sum().alias("v_sum"),
                col("w").mean().alias("w_mean"),
                col("s").count().alias("n"),
                col("v").min().alias("v_min"),
                col("w").max().alias("w_max"),
            ],
        }],
        vec![
            Operation::Drop {
                columns: vec!["s".into()],
            },
            Operation::Reduce { func: AggFunc::Sum },
        ],
        vec![
            Operation::FillNa {
                value: Scalar::from(0_i64),
                subset: Some(vec!["v".into()]),
            },
            Operation::AsType {
                dtypes: vec![("k".into(), DataType::Float64)],
            },
            Operation::SortValues {
                by: vec!["w".into()],
                descending: true,
            },
            Operation::Head { n: 7 },
            Operation::Select {
                exprs: vec![col("k"), col("w")],
            },
        ],
    ]
}

fn config(native: bool) -> ExecutionConfig {
    ExecutionConfig::default()
        .with_row_partition_size(8)
        .with_column_partition_size(3)
        .with_resplit_rows(32)
        .with_native_enabled(native)
}

fn run(dispatcher: &Dispatcher, df: &DataFrame, ops: &[Operation]) -> DataFrame {
    let source = dispatcher.from_dataframe(df.clone()).unwrap();
    let out = ops.iter().cloned().fold(source, |frame, op| {
        dispatcher.apply(op, &[frame]).unwrap()
    });
    dispatcher.materialize(&out).unwrap()
}

fn binary(dispatcher: &Dispatcher, df: &DataFrame, op: Operation) -> DataFrame {
    let left = dispatcher.from_dataframe(df.clone()).unwrap();
    let right = dispatcher
        .apply(
            Operation::Filter {
                predicate: col("v").ge(lit(0_i64)),
            },
            &[left.clone()],
        )
        .unwrap();
    let out: Frame = dispatcher.apply(op, &[left, right]).unwrap();
    dispatcher.materialize(&out).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn native_and_fallback_paths_agree(seed in any::<u64>(), rows in 0usize..60, keys in 1i64..6) {
        let df = random_table(&mut rng(seed), rows, keys);
        let native = Dispatcher::new(Arc::new(LocalEngine::new()), config(true)).unwrap();
        let host = Dispatcher::local(config(false)).unwrap();
        for ops in pipelines() {
            let a = run(&native, &df, &ops);
            let b = run(&host, &df, &ops);
            prop_assert!(a.frame_equal(&b).unwrap(), "pipeline {:?} diverged", ops);
        }
    }

    #[test]
    fn binary_operations_agree(seed in any::<u64>(), rows in 1usize..40) {
        let df = random_table(&mut rng(seed), rows, 4);
        let native = Dispatcher::new(Arc::new(LocalEngine::new()), config(true)).unwrap();
        let host = Dispatcher::local(config(false)).unwrap();
        let ops = [
            Operation::Concat,
            Operation::Merge {
                on: vec!["k".into()],
                how: JoinHow::Inner,
                suffixes: Suffixes::default(),
            },
            Operation::Merge {
                on: vec!["k".into(), "s".into()],
                how: JoinHow::Left,
                suffixes: Suffixes::new("_l", "_r"),
            },
        ];
        for op in ops {
            let a = binary(&native, &df, op.clone());
            let b = binary(&host, &df, op.clone());
            prop_assert!(a.frame_equal(&b).unwrap(), "{} diverged", op);
        }
    }
}

#[test]
fn materialize_is_idempotent() {
    let engine = Arc::new(LocalEngine::new());
    let dispatcher = Dispatcher::new(engine.clone(), config(true)).unwrap();
    let df = random_table(&mut rng(99), 50, 3);
    let source = dispatcher.from_dataframe(df).unwrap();
    let out = pipelines()[0].iter().cloned().fold(source, |frame, op| {
        dispatcher.apply(op, &[frame]).unwrap()
    });

    let first = dispatcher.materialize(&out).unwrap();
    let after_first = engine.stats();
    let second = dispatcher.materialize(&out).unwrap();
    assert!(first.frame_equal(&second).unwrap());
    assert_eq!(engine.stats(), after_first);
    assert_eq!(after_first.executions, 1);

    // a clone shares the resolved partition
    let third = dispatcher.materialize(&out.clone()).unwrap();
    assert!(first.frame_equal(&third).unwrap());
    assert_eq!(engine.stats(), after_first);
}
