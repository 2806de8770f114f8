use std::collections::{btree_map::Entry, BTreeMap};

use arrow::{array::ArrayRef, datatypes::DataType};

use crate::{
    column::RowSlot,
    definition::MapDescription,
    error::MergeError,
    value::{Value, ValueError},
};

fn slot_list(slot: &RowSlot, data_type: &DataType) -> Result<Vec<Value>, ValueError> {
    let value = match slot {
        RowSlot::Empty => Value::Null,
        RowSlot::Value(value) => value.clone(),
        RowSlot::Column(array) => Value::from_array(array.as_ref(), 0)?,
    };
    match value {
        Value::List(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ValueError::TypeMismatch {
            expected: data_type.clone(),
            actual: format!("{other:?}"),
        }),
    }
}

/// Parallel key and value arrays of one row of a map group.
struct Matrix {
    keys: Vec<Vec<Value>>,
    values: Vec<Vec<Value>>,
}

impl Matrix {
    fn len(&self, row: usize) -> Result<usize, MergeError> {
        let len = self.keys.first().map_or(0, Vec::len);
        let consistent = self
            .keys
            .iter()
            .chain(self.values.iter())
            .all(|array| array.len() == len);
        if !consistent {
            return Err(MergeError::NestedSizeMismatch { row });
        }
        Ok(len)
    }

    fn tuple(arrays: &[Vec<Value>], idx: usize) -> Vec<Value> {
        arrays.iter().map(|array| array[idx].clone()).collect()
    }
}

/// Sums the entries of the map group `desc` of input row `row` into the row buffer.
///
/// Keys present on both sides have their value tuples added element-wise; an
/// entry whose tuple becomes all zero is dropped. The merged arrays are written
/// back sorted by key tuple. Returns whether any entry survived.
pub(crate) fn merge_map(
    desc: &MapDescription,
    row_buffer: &mut [RowSlot],
    columns: &[ArrayRef],
    row: usize,
    column_names: &[String],
) -> Result<bool, MergeError> {
    let read_left = |idx: &usize| {
        let data_type = columns
            .get(*idx)
            .map_or(DataType::Null, |column| column.data_type().clone());
        slot_list(&row_buffer[*idx], &data_type)
            .map_err(|err| MergeError::corrupted(row, *idx, &column_names[*idx], err))
    };
    let left = Matrix {
        keys: desc.key_col_nums.iter().map(&read_left).collect::<Result<_, _>>()?,
        values: desc.val_col_nums.iter().map(&read_left).collect::<Result<_, _>>()?,
    };

    let read_right = |idx: &usize| {
        let column = columns
            .get(*idx)
            .ok_or_else(|| MergeError::NoSuchColumn(column_names[*idx].clone()))?;
        match Value::from_array(column.as_ref(), row) {
            Ok(Value::List(items)) => Ok(items),
            Ok(Value::Null) => Ok(Vec::new()),
            Ok(other) => Err(MergeError::corrupted(
                row,
                *idx,
                &column_names[*idx],
                ValueError::TypeMismatch {
                    expected: column.data_type().clone(),
                    actual: format!("{other:?}"),
                },
            )),
            Err(err) => Err(MergeError::corrupted(row, *idx, &column_names[*idx], err)),
        }
    };
    let right = Matrix {
        keys: desc.key_col_nums.iter().map(&read_right).collect::<Result<_, _>>()?,
        values: desc.val_col_nums.iter().map(&read_right).collect::<Result<_, _>>()?,
    };

    let mut merged: BTreeMap<Vec<Value>, Vec<Value>> = BTreeMap::new();
    for matrix in [&left, &right] {
        for idx in 0..matrix.len(row)? {
            let key = Matrix::tuple(&matrix.keys, idx);
            let value = Matrix::tuple(&matrix.values, idx);
            match merged.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
                Entry::Occupied(mut entry) => {
                    let mut has_non_zero = false;
                    for (sum, addend) in entry.get_mut().iter_mut().zip(&value) {
                        has_non_zero |= sum.accumulate(addend)?;
                    }
                    if !has_non_zero {
                        entry.remove();
                    }
                }
            }
        }
    }

    let survived = !merged.is_empty();
    let mut keys = vec![Vec::with_capacity(merged.len()); desc.key_col_nums.len()];
    let mut values = vec![Vec::with_capacity(merged.len()); desc.val_col_nums.len()];
    for (key, value) in merged {
        for (array, item) in keys.iter_mut().zip(key) {
            array.push(item);
        }
        for (array, item) in values.iter_mut().zip(value) {
            array.push(item);
        }
    }
    for (idx, array) in desc.key_col_nums.iter().zip(keys) {
        row_buffer[*idx] = RowSlot::Value(Value::List(array));
    }
    for (idx, array) in desc.val_col_nums.iter().zip(values) {
        row_buffer[*idx] = RowSlot::Value(Value::List(array));
    }
    Ok(survived)
}
