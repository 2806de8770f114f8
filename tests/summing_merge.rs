mod common;

use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, AsArray, Decimal128Array, DictionaryArray, Int32Array, Int64Array,
        RecordBatch, StringArray,
    },
    datatypes::{
        DataType, Decimal128Type, Field, Int32Type, Int64Type, Schema, SchemaRef, UInt32Type,
    },
};
use common::{
    by_key, i64_column, i64_lists, kv_batch, kv_rows, kv_schema, list_rows, list_type, run,
    single_chunks, u32_lists,
};
use summing_merge::{
    aggregate::{AggregateError, AggregateFunction, AggregateState, Arena},
    column::ColumnBuffer,
    definition::{AGGREGATE_STATE_METADATA_KEY, SIMPLE_AGGREGATE_METADATA_KEY},
    merge_sorted_runs, AggregateFunctionFactory, MergeError, MergeInput, SummingMergeOptions,
    Value,
};

#[test]
fn cancelled_key_is_elided() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            kv_batch(&[(1, 10), (2, 1)]),
            kv_batch(&[(1, -10), (2, 4)]),
        ]),
    );
    assert_eq!(kv_rows(&out), vec![(2, 5)]);
}

#[test]
fn output_is_sorted_without_duplicate_keys() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            kv_batch(&[(1, 1), (3, 1), (3, 2), (7, 1)]),
            kv_batch(&[(2, 5), (3, 4), (8, 1)]),
            kv_batch(&[(1, 2), (7, 6)]),
        ]),
    );
    assert_eq!(
        kv_rows(&out),
        vec![(1, 3), (2, 5), (3, 7), (7, 7), (8, 1)]
    );
}

#[test]
fn one_row_chunks_hold_whole_groups() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default().max_block_size_rows(1),
        single_chunks(vec![
            kv_batch(&[(1, 1), (2, 2), (3, 3)]),
            kv_batch(&[(1, 1), (2, 2), (3, 3)]),
        ]),
    );
    assert_eq!(out.len(), 3);
    for (batch, expected) in out.iter().zip([(1, 2), (2, 4), (3, 6)]) {
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(kv_rows(std::slice::from_ref(batch)), vec![expected]);
    }
}

#[test]
fn byte_cap_splits_output() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default().max_block_size_bytes(1),
        single_chunks(vec![kv_batch(&[(1, 1), (2, 2)])]),
    );
    assert_eq!(out.len(), 2);
    assert_eq!(kv_rows(&out), vec![(1, 1), (2, 2)]);
}

#[test]
fn byte_cap_counts_copied_rows() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("amount", DataType::Decimal128(20, 2), false),
    ]));
    let batch = |keys: Vec<i64>| {
        let amounts = Decimal128Array::from_iter_values(keys.iter().map(|k| *k as i128 * 100))
            .with_precision_and_scale(20, 2)
            .unwrap();
        RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(keys)) as ArrayRef, Arc::new(amounts)],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default().max_block_size_bytes(1024),
        single_chunks(vec![
            batch((0..400).step_by(2).collect()),
            batch((1..400).step_by(2).collect()),
        ]),
    );
    // about 24 bytes per row
    assert!((2..=20).contains(&out.len()), "{} chunks", out.len());
    let keys = out
        .iter()
        .flat_map(|batch| i64_column(batch, "key"))
        .collect::<Vec<_>>();
    assert_eq!(keys, (0..400).collect::<Vec<_>>());
    let amounts = out
        .iter()
        .flat_map(|batch| {
            batch
                .column(1)
                .as_primitive::<Decimal128Type>()
                .values()
                .to_vec()
        })
        .collect::<Vec<_>>();
    assert_eq!(amounts, (0..400).map(|k| k * 100).collect::<Vec<i128>>());
}

#[test]
fn pass_through_keeps_last_row() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("val", DataType::Int64, false),
        Field::new("note", DataType::Utf8, false),
    ]));
    let batch = |rows: &[(i64, i64, &str)]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.2))),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            batch(&[(1, 1, "first"), (1, 2, "second"), (2, 1, "only")]),
            batch(&[(1, 4, "third")]),
        ]),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(i64_column(&out[0], "val"), vec![7, 1]);
    let notes = out[0].column(2).as_string::<i32>();
    assert_eq!(notes.value(0), "third");
    assert_eq!(notes.value(1), "only");
}

#[test]
fn exhausted_chunk_does_not_close_group() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default(),
        vec![
            vec![
                MergeInput::new(kv_batch(&[(1, 1)])),
                MergeInput::new(kv_batch(&[(1, 2)])),
                MergeInput::new(kv_batch(&[(1, 3), (2, 3)])),
            ],
            vec![MergeInput::new(kv_batch(&[(1, 4)]))],
        ],
    );
    assert_eq!(kv_rows(&out), vec![(1, 10), (2, 3)]);
}

#[test]
fn skipped_last_rows_never_reach_output() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default(),
        vec![
            vec![
                MergeInput::new(kv_batch(&[(1, 1), (2, 100)])).with_skip_last_row(true),
                MergeInput::new(kv_batch(&[(2, 5)])).with_skip_last_row(true),
                MergeInput::new(kv_batch(&[(2, 2), (3, 3)])),
            ],
            vec![MergeInput::new(kv_batch(&[(1, 1)]))],
        ],
    );
    assert_eq!(kv_rows(&out), vec![(1, 2), (2, 2), (3, 3)]);
}

#[test]
fn merging_merged_output_is_a_no_op() {
    let first = run(
        kv_schema(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            kv_batch(&[(1, 10), (2, 1), (4, 0)]),
            kv_batch(&[(1, -10), (2, 4), (3, 9)]),
        ]),
    );
    assert_eq!(kv_rows(&first), vec![(2, 5), (3, 9)]);
    let second = run(
        kv_schema(),
        SummingMergeOptions::default(),
        single_chunks(first.clone()),
    );
    assert_eq!(kv_rows(&second), kv_rows(&first));
}

#[test]
fn keeping_default_values() {
    let out = run(
        kv_schema(),
        SummingMergeOptions::default().remove_default_values(false),
        single_chunks(vec![kv_batch(&[(1, 10)]), kv_batch(&[(1, -10)])]),
    );
    assert_eq!(kv_rows(&out), vec![(1, 0)]);
}

fn map_schema(composite: bool) -> SchemaRef {
    let mut fields = vec![
        Field::new("key", DataType::Int64, false),
        Field::new("statsMap.id", list_type(DataType::UInt32), true),
    ];
    if composite {
        fields.push(Field::new(
            "statsMap.regionType",
            list_type(DataType::UInt32),
            true,
        ));
    }
    fields.push(Field::new("statsMap.val", list_type(DataType::Int64), true));
    Arc::new(Schema::new(fields))
}

#[test]
fn map_group_union() {
    let schema = map_schema(false);
    let batch = |ids: &[&[u32]], vals: &[&[i64]]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1i64; ids.len()])) as ArrayRef,
                u32_lists(ids),
                i64_lists(vals),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![batch(&[&[1, 2]], &[&[5, 3]]), batch(&[&[2, 3]], &[&[-3, 7]])]),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].schema(), schema);
    assert_eq!(list_rows::<UInt32Type>(out[0].column(1)), vec![vec![1, 3]]);
    assert_eq!(list_rows::<Int64Type>(out[0].column(2)), vec![vec![5, 7]]);
}

#[test]
fn cancelled_map_group_is_elided() {
    let schema = map_schema(false);
    let batch = |key: i64, ids: &[u32], vals: &[i64]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![key])) as ArrayRef,
                u32_lists(&[ids]),
                i64_lists(&[vals]),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![batch(1, &[4], &[2]), batch(1, &[4], &[-2])]),
    );
    assert!(out.is_empty());
}

#[test]
fn composite_key_map_group_union() {
    let schema = map_schema(true);
    let batch = |ids: &[u32], regions: &[u32], vals: &[i64]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1i64])) as ArrayRef,
                u32_lists(&[ids]),
                u32_lists(&[regions]),
                i64_lists(&[vals]),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            batch(&[1, 2], &[0, 0], &[5, 3]),
            batch(&[2, 2, 3], &[0, 1, 0], &[-3, 1, 7]),
        ]),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(list_rows::<UInt32Type>(out[0].column(1)), vec![vec![1, 2, 3]]);
    assert_eq!(list_rows::<UInt32Type>(out[0].column(2)), vec![vec![0, 1, 0]]);
    assert_eq!(list_rows::<Int64Type>(out[0].column(3)), vec![vec![5, 1, 7]]);
}

#[test]
fn mismatched_map_arrays_fail() {
    let schema = map_schema(true);
    let batch = |ids: &[u32], regions: &[u32], vals: &[i64]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1i64])) as ArrayRef,
                u32_lists(&[ids]),
                u32_lists(&[regions]),
                i64_lists(&[vals]),
            ],
        )
        .unwrap()
    };
    let result = merge_sorted_runs(
        schema.clone(),
        &by_key(),
        SummingMergeOptions::default(),
        single_chunks(vec![batch(&[1], &[0], &[5]), batch(&[2, 3], &[0], &[1, 1])]),
    );
    assert!(matches!(result, Err(MergeError::NestedSizeMismatch { row: 0 })));
}

#[test]
fn dictionary_values_keep_their_encoding() {
    let dict_type = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Int64));
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("val", dict_type.clone(), false),
    ]));
    let batch = |keys: Vec<i64>, codes: Vec<i32>, values: Vec<i64>| {
        let dict = DictionaryArray::<Int32Type>::try_new(
            Int32Array::from(codes),
            Arc::new(Int64Array::from(values)),
        )
        .unwrap();
        RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(keys)) as ArrayRef, Arc::new(dict)],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            batch(vec![1, 2], vec![0, 1], vec![3, 4]),
            batch(vec![1, 2], vec![0, 1], vec![-3, 0]),
        ]),
    );
    assert_eq!(out.len(), 1);
    let column = out[0].column(1);
    assert_eq!(column.data_type(), &dict_type);
    let dict = column.as_dictionary::<Int32Type>();
    let values = dict.values().as_primitive::<Int64Type>();
    let decoded = dict
        .keys()
        .values()
        .iter()
        .map(|code| values.value(*code as usize))
        .collect::<Vec<_>>();
    assert_eq!(i64_column(&out[0], "key"), vec![2]);
    assert_eq!(decoded, vec![4]);
}

fn tagged(name: &str, key: &str, function: &str) -> Field {
    Field::new(name, DataType::Int64, false)
        .with_metadata(HashMap::from([(key.to_owned(), function.to_owned())]))
}

#[test]
fn tagged_columns_use_their_functions() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("val", DataType::Int64, false),
        tagged("peak", SIMPLE_AGGREGATE_METADATA_KEY, "max"),
        tagged("partial", AGGREGATE_STATE_METADATA_KEY, "sumWithOverflow"),
    ]));
    let batch = |rows: &[(i64, i64, i64, i64)]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))) as ArrayRef,
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.3))),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            batch(&[(1, 5, 3, 10), (2, 1, 1, 1)]),
            batch(&[(1, -5, 8, 20), (1, 0, 2, 30)]),
        ]),
    );
    assert_eq!(out.len(), 1);
    // key 1 nets to zero in `val` but tagged columns keep the row
    assert_eq!(i64_column(&out[0], "key"), vec![1, 2]);
    assert_eq!(i64_column(&out[0], "val"), vec![0, 1]);
    assert_eq!(i64_column(&out[0], "peak"), vec![8, 1]);
    assert_eq!(i64_column(&out[0], "partial"), vec![60, 1]);
}

#[test]
fn stored_states_start_empty() {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        tagged("lo", AGGREGATE_STATE_METADATA_KEY, "min"),
        tagged("hi", AGGREGATE_STATE_METADATA_KEY, "max"),
        tagged("first", AGGREGATE_STATE_METADATA_KEY, "any"),
    ]));
    let batch = |rows: &[(i64, i64, i64, i64)]| {
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))) as ArrayRef,
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2))),
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.3))),
            ],
        )
        .unwrap()
    };
    let out = run(
        schema.clone(),
        SummingMergeOptions::default(),
        single_chunks(vec![
            batch(&[(1, 5, -5, 42), (2, 3, 3, 7)]),
            batch(&[(1, 7, -2, 43)]),
        ]),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(i64_column(&out[0], "key"), vec![1, 2]);
    assert_eq!(i64_column(&out[0], "lo"), vec![5, 3]);
    assert_eq!(i64_column(&out[0], "hi"), vec![-2, 3]);
    assert_eq!(i64_column(&out[0], "first"), vec![42, 7]);
}

#[derive(Debug)]
struct OutOfBoundsRead {
    return_type: DataType,
}

#[derive(Debug)]
struct OutOfBoundsState;

impl AggregateFunction for OutOfBoundsRead {
    fn name(&self) -> &str {
        "outOfBoundsRead"
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(OutOfBoundsState)
    }

    fn merge_state(
        &self,
        _target: &mut Value,
        _other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        Ok(())
    }
}

impl AggregateState for OutOfBoundsState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        Value::from_array(columns[0].as_ref(), row + columns[0].len())?;
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        Ok(out.insert_default()?)
    }
}

#[test]
fn corrupted_cells_report_row_and_column() {
    let mut factory = AggregateFunctionFactory::default();
    factory.register("outOfBoundsRead", |arguments| {
        Ok(Arc::new(OutOfBoundsRead {
            return_type: arguments[0].clone(),
        }) as Arc<dyn AggregateFunction>)
    });
    let result = merge_sorted_runs(
        kv_schema(),
        &by_key(),
        SummingMergeOptions::default()
            .function_factory(factory)
            .sum_function_name("outOfBoundsRead"),
        single_chunks(vec![kv_batch(&[(1, 1)])]),
    );
    match result {
        Err(MergeError::CorruptedData {
            row, column, name, ..
        }) => {
            assert_eq!((row, column), (0, 1));
            assert_eq!(name, "val");
        }
        other => panic!("expected corrupted data, got {other:?}"),
    }
}

#[test]
fn mismatched_input_schema_is_rejected() {
    let wrong: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("val", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        wrong,
        vec![
            Arc::new(Int64Array::from(vec![1i64])) as ArrayRef,
            Arc::new(StringArray::from(vec!["x"])),
        ],
    )
    .unwrap();
    let result = merge_sorted_runs(
        kv_schema(),
        &by_key(),
        SummingMergeOptions::default(),
        vec![vec![MergeInput::new(kv_batch(&[(0, 1)]))], vec![MergeInput::new(batch)]],
    );
    assert!(matches!(
        result,
        Err(MergeError::SchemaMismatch {
            source_idx: 1,
            column: 1,
            ..
        })
    ));
}
