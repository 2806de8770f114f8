//! Conversion of input batches into the column layout the merge works on, and
//! of accumulated output columns back into batches of the merge schema.

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions, RunArray, UInt64Array},
    compute::{cast, take},
    datatypes::{DataType, Int16Type, Int32Type, Int64Type, RunEndIndexType},
    error::ArrowError,
};

use crate::{definition::ColumnsDefinition, error::MergeError};

fn expand_runs<R: RunEndIndexType>(array: &dyn Array) -> Result<ArrayRef, MergeError> {
    let runs = array
        .as_any()
        .downcast_ref::<RunArray<R>>()
        .ok_or_else(|| {
            ArrowError::InvalidArgumentError(format!(
                "run-end encoded array of type {:?} could not be downcast",
                array.data_type()
            ))
        })?;
    let indices = UInt64Array::from_iter_values(
        (0..runs.len()).map(|row| runs.get_physical_index(row) as u64),
    );
    Ok(take(runs.values().as_ref(), &indices, None)?)
}

/// Expands a run-end encoded array whose values have the declared type.
fn decode_run_end(array: &ArrayRef, expected: &DataType) -> Result<Option<ArrayRef>, MergeError> {
    let DataType::RunEndEncoded(run_ends, values) = array.data_type() else {
        return Ok(None);
    };
    if values.data_type() != expected {
        return Ok(None);
    }
    let expanded = match run_ends.data_type() {
        DataType::Int16 => expand_runs::<Int16Type>(array.as_ref())?,
        DataType::Int32 => expand_runs::<Int32Type>(array.as_ref())?,
        DataType::Int64 => expand_runs::<Int64Type>(array.as_ref())?,
        _ => return Ok(None),
    };
    Ok(Some(expanded))
}

/// Validates `batch` against the merge schema and returns the columns the
/// driver reads from: run-end encoding removed, dictionary-encoded aggregated
/// columns unwrapped to their nested type.
pub(crate) fn preprocess(
    def: &ColumnsDefinition,
    source_idx: usize,
    batch: &RecordBatch,
) -> Result<Vec<ArrayRef>, MergeError> {
    let fields = def.schema.fields();
    if batch.num_columns() != fields.len() {
        return Err(MergeError::ColumnCountMismatch {
            source_idx,
            expected: fields.len(),
            actual: batch.num_columns(),
        });
    }

    let mut columns = Vec::with_capacity(fields.len());
    for (idx, (field, array)) in fields.iter().zip(batch.columns()).enumerate() {
        if array.data_type() == field.data_type() {
            columns.push(array.clone());
            continue;
        }
        match decode_run_end(array, field.data_type())? {
            Some(expanded) => columns.push(expanded),
            None => {
                return Err(MergeError::SchemaMismatch {
                    source_idx,
                    column: idx,
                    expected: field.data_type().clone(),
                    actual: array.data_type().clone(),
                })
            }
        }
    }

    for desc in &def.columns_to_aggregate {
        if let Some(nested) = desc.nested_type() {
            let idx = desc.column_numbers()[0];
            columns[idx] = cast(&columns[idx], nested)?;
        }
    }
    Ok(columns)
}

/// Assembles a batch in schema order from the accumulator columns: one per
/// aggregate descriptor followed by one per pass-through column.
pub(crate) fn postprocess(
    def: &ColumnsDefinition,
    columns: Vec<ArrayRef>,
    num_rows: usize,
) -> Result<RecordBatch, MergeError> {
    let mut result: Vec<Option<ArrayRef>> = vec![None; def.schema.fields().len()];
    let mut columns = columns.into_iter();

    for desc in &def.columns_to_aggregate {
        let Some(column) = columns.next() else {
            break;
        };
        if desc.unpacks_tuple() {
            let tuple = column.as_struct_opt().ok_or_else(|| {
                ArrowError::InvalidArgumentError(format!(
                    "expected a tuple result from {}, got {:?}",
                    desc.function().name(),
                    column.data_type()
                ))
            })?;
            for (child, idx) in tuple.columns().iter().zip(desc.column_numbers()) {
                result[*idx] = Some(child.clone());
            }
        } else if desc.nested_type().is_some() {
            result[desc.column_numbers()[0]] = Some(cast(&column, desc.real_type())?);
        } else {
            result[desc.column_numbers()[0]] = Some(column);
        }
    }
    for (idx, column) in def.column_numbers_not_to_aggregate.iter().zip(columns) {
        result[*idx] = Some(column);
    }

    let arrays = result
        .into_iter()
        .enumerate()
        .map(|(idx, column)| {
            column.ok_or_else(|| MergeError::NoSuchColumn(def.column_names[idx].clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new_with_options(
        def.schema.clone(),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(num_rows)),
    )?)
}
