//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, Int64Array, ListArray, RecordBatch},
    datatypes::{DataType, Field, Int64Type, Schema, SchemaRef, UInt32Type},
};
use summing_merge::{merge_sorted_runs, MergeInput, SortColumn, SummingMergeOptions};

/// `key: Int64, val: Int64`, sorted on `key`.
pub fn kv_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Int64, false),
        Field::new("val", DataType::Int64, false),
    ]))
}

pub fn kv_batch(rows: &[(i64, i64)]) -> RecordBatch {
    RecordBatch::try_new(
        kv_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|(k, _)| *k))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|(_, v)| *v))),
        ],
    )
    .unwrap()
}

pub fn by_key() -> Vec<SortColumn> {
    vec![SortColumn::new("key")]
}

/// One run per input, each handed over as a single chunk.
pub fn single_chunks(batches: Vec<RecordBatch>) -> Vec<Vec<MergeInput>> {
    batches
        .into_iter()
        .map(|batch| vec![MergeInput::new(batch)])
        .collect()
}

pub fn run(
    schema: SchemaRef,
    options: SummingMergeOptions,
    inputs: Vec<Vec<MergeInput>>,
) -> Vec<RecordBatch> {
    merge_sorted_runs(schema, &by_key(), options, inputs).unwrap()
}

pub fn i64_column(batch: &RecordBatch, name: &str) -> Vec<i64> {
    let column = batch.column_by_name(name).unwrap();
    column.as_primitive::<Int64Type>().values().to_vec()
}

pub fn kv_rows(batches: &[RecordBatch]) -> Vec<(i64, i64)> {
    batches
        .iter()
        .flat_map(|batch| {
            i64_column(batch, "key")
                .into_iter()
                .zip(i64_column(batch, "val"))
        })
        .collect()
}

pub fn list_type(element: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", element, true)))
}

pub fn u32_lists(rows: &[&[u32]]) -> ArrayRef {
    Arc::new(ListArray::from_iter_primitive::<UInt32Type, _, _>(
        rows.iter()
            .map(|row| Some(row.iter().copied().map(Some).collect::<Vec<_>>())),
    ))
}

pub fn i64_lists(rows: &[&[i64]]) -> ArrayRef {
    Arc::new(ListArray::from_iter_primitive::<Int64Type, _, _>(
        rows.iter()
            .map(|row| Some(row.iter().copied().map(Some).collect::<Vec<_>>())),
    ))
}

/// Elements of every list cell of a primitive list column.
pub fn list_rows<T: arrow::datatypes::ArrowPrimitiveType>(
    column: &ArrayRef,
) -> Vec<Vec<T::Native>> {
    let lists = column.as_list::<i32>();
    (0..lists.len())
        .map(|row| lists.value(row).as_primitive::<T>().values().to_vec())
        .collect()
}
