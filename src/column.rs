//! Growable output columns and row-buffer slots.
//!
//! Arrow arrays are immutable, so output rows are staged here until a chunk
//! is pulled. A column whose type [`Value`] can represent is staged as cells;
//! any other column is staged as one-row slices of its input arrays and
//! concatenated on [`ColumnBuffer::finish`].

use arrow::{
    array::{new_null_array, Array, ArrayRef, UInt32Array},
    compute::{concat, take},
    datatypes::DataType,
};

use crate::value::{needs_columnar, values_to_array, Value, ValueError};

/// Logical size of one staged row, without the capacity of the buffers behind it.
fn row_bytes(cell: &ArrayRef) -> usize {
    cell.to_data()
        .get_slice_memory_size()
        .unwrap_or_else(|_| cell.get_array_memory_size())
}

#[derive(Debug)]
enum Staged {
    Values(Vec<Value>),
    Slices(Vec<ArrayRef>),
}

/// An output column that supports appending, reading back and popping rows.
#[derive(Debug)]
pub struct ColumnBuffer {
    data_type: DataType,
    staged: Staged,
    bytes: usize,
}

impl ColumnBuffer {
    /// Create an empty column of `data_type`.
    pub fn new(data_type: DataType) -> Self {
        let staged = if needs_columnar(&data_type) {
            Staged::Slices(Vec::new())
        } else {
            Staged::Values(Vec::new())
        };
        Self {
            data_type,
            staged,
            bytes: 0,
        }
    }

    /// An empty column of the same type.
    pub fn clone_empty(&self) -> Self {
        Self::new(self.data_type.clone())
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn len(&self) -> usize {
        match &self.staged {
            Staged::Values(values) => values.len(),
            Staged::Slices(slices) => slices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate number of bytes staged so far.
    pub fn byte_size(&self) -> usize {
        self.bytes
    }

    /// Cell at `row`; slice-staged columns are read through [`Value::from_array`].
    pub fn value_at(&self, row: usize) -> Result<Value, ValueError> {
        match &self.staged {
            Staged::Values(values) => values
                .get(row)
                .cloned()
                .ok_or(ValueError::RowOutOfBounds(row, values.len())),
            Staged::Slices(slices) => {
                let slice = slices
                    .get(row)
                    .ok_or(ValueError::RowOutOfBounds(row, slices.len()))?;
                Value::from_array(slice.as_ref(), 0)
            }
        }
    }

    /// Mutable access to the last staged cell, used to merge aggregate states in place.
    pub fn last_mut(&mut self) -> Option<&mut Value> {
        match &mut self.staged {
            Staged::Values(values) => values.last_mut(),
            Staged::Slices(_) => None,
        }
    }

    /// Appends a cell.
    pub fn push(&mut self, value: Value) -> Result<(), ValueError> {
        match &mut self.staged {
            Staged::Values(values) => {
                self.bytes += value.size_hint();
                values.push(value);
                Ok(())
            }
            Staged::Slices(_) => Err(ValueError::UnsupportedType(self.data_type.clone())),
        }
    }

    /// Appends the cell at `row` of `array`.
    pub fn push_row(&mut self, array: &ArrayRef, row: usize) -> Result<(), ValueError> {
        match &mut self.staged {
            Staged::Values(values) => {
                let value = Value::from_array(array.as_ref(), row)?;
                self.bytes += value.size_hint();
                values.push(value);
            }
            Staged::Slices(slices) => {
                if row >= array.len() {
                    return Err(ValueError::RowOutOfBounds(row, array.len()));
                }
                // copied out so the staged row does not keep the input chunk alive
                let cell = take(array.as_ref(), &UInt32Array::from(vec![row as u32]), None)?;
                self.bytes += row_bytes(&cell);
                slices.push(cell);
            }
        }
        Ok(())
    }

    /// Appends the value held by a row-buffer slot.
    pub fn push_slot(&mut self, slot: &RowSlot) -> Result<(), ValueError> {
        match slot {
            RowSlot::Value(value) => self.push(value.clone()),
            RowSlot::Column(array) => self.push_row(array, 0),
            RowSlot::Empty => self.insert_default(),
        }
    }

    /// Appends the default cell of the column type.
    pub fn insert_default(&mut self) -> Result<(), ValueError> {
        match &mut self.staged {
            Staged::Values(values) => {
                values.push(Value::default_for(&self.data_type));
                self.bytes += 8;
            }
            Staged::Slices(slices) => {
                slices.push(new_null_array(&self.data_type, 1));
                self.bytes += 8;
            }
        }
        Ok(())
    }

    /// Removes the last `n` rows.
    pub fn pop_back(&mut self, n: usize) {
        match &mut self.staged {
            Staged::Values(values) => {
                for _ in 0..n.min(values.len()) {
                    if let Some(value) = values.pop() {
                        self.bytes = self.bytes.saturating_sub(value.size_hint());
                    }
                }
            }
            Staged::Slices(slices) => {
                for _ in 0..n.min(slices.len()) {
                    if let Some(slice) = slices.pop() {
                        self.bytes = self.bytes.saturating_sub(row_bytes(&slice));
                    }
                }
            }
        }
    }

    /// Returns true when the cell at `row` is the type's default.
    pub fn is_default_at(&self, row: usize) -> bool {
        match &self.staged {
            Staged::Values(values) => values.get(row).map_or(false, Value::is_default),
            Staged::Slices(slices) => slices.get(row).map_or(false, |s| s.is_null(0)),
        }
    }

    /// Drains the staged rows into an array, leaving the column empty.
    pub fn finish(&mut self) -> Result<ArrayRef, ValueError> {
        self.bytes = 0;
        match &mut self.staged {
            Staged::Values(values) => {
                let values = std::mem::take(values);
                values_to_array(&self.data_type, &values)
            }
            Staged::Slices(slices) => {
                let slices = std::mem::take(slices);
                if slices.is_empty() {
                    return Ok(new_null_array(&self.data_type, 0));
                }
                let parts = slices.iter().map(|s| s.as_ref()).collect::<Vec<_>>();
                Ok(concat(&parts)?)
            }
        }
    }
}

/// One column of the row buffer that holds the representative row of the open group.
#[derive(Debug, Clone, Default)]
pub enum RowSlot {
    #[default]
    Empty,
    /// The cell as an owned scalar.
    Value(Value),
    /// The cell as a one-row slice of the input array.
    Column(ArrayRef),
}

impl RowSlot {
    /// Captures the cell at `row`, picking the representation from `columnar`.
    pub fn read(array: &ArrayRef, row: usize, columnar: bool) -> Result<Self, ValueError> {
        if columnar {
            if row >= array.len() {
                return Err(ValueError::RowOutOfBounds(row, array.len()));
            }
            Ok(RowSlot::Column(array.slice(row, 1)))
        } else {
            Value::from_array(array.as_ref(), row).map(RowSlot::Value)
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RowSlot::Value(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{AsArray, Decimal128Array, DictionaryArray, Int64Array},
        datatypes::{Decimal128Type, Int32Type, Int64Type},
    };

    use super::*;

    #[test]
    fn push_pop_and_finish_values() {
        let mut column = ColumnBuffer::new(DataType::Int64);
        column.push(Value::Int64(1)).unwrap();
        column.insert_default().unwrap();
        assert!(column.is_default_at(1));
        column.pop_back(1);
        column.push(Value::Int64(5)).unwrap();
        let array = column.finish().unwrap();
        assert_eq!(
            array.as_primitive::<Int64Type>().values().to_vec(),
            vec![1, 5]
        );
        assert!(column.is_empty());
    }

    #[test]
    fn dictionary_rows_are_sliced() {
        let dict: DictionaryArray<Int32Type> = vec!["a", "b", "a"].into_iter().collect();
        let array: ArrayRef = Arc::new(dict);
        let mut column = ColumnBuffer::new(array.data_type().clone());
        column.push_row(&array, 2).unwrap();
        column.push_row(&array, 1).unwrap();
        assert!(column.push(Value::from("c")).is_err());
        let out = column.finish().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.data_type(), array.data_type());
        assert_eq!(column.clone_empty().data_type(), array.data_type());
    }

    #[test]
    fn staged_rows_count_their_own_bytes() {
        let array: ArrayRef = Arc::new(
            Decimal128Array::from_iter_values(0..4096)
                .with_precision_and_scale(20, 2)
                .unwrap(),
        );
        let mut column = ColumnBuffer::new(array.data_type().clone());
        column.push_row(&array, 7).unwrap();
        column.push_row(&array, 4000).unwrap();
        assert_eq!(column.byte_size(), 32);
        column.pop_back(1);
        assert_eq!(column.byte_size(), 16);

        let out = column.finish().unwrap();
        assert_eq!(out.as_primitive::<Decimal128Type>().value(0), 7);
        assert_eq!(column.byte_size(), 0);
    }

    #[test]
    fn slot_representation_follows_flag() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![4, 9]));
        assert!(matches!(
            RowSlot::read(&array, 1, false).unwrap(),
            RowSlot::Value(Value::Int64(9))
        ));
        assert!(matches!(
            RowSlot::read(&array, 1, true).unwrap(),
            RowSlot::Column(_)
        ));
        assert!(RowSlot::read(&array, 2, true).is_err());
    }
}
