use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BinaryArray, BooleanArray, Date32Array, Date64Array, FixedSizeBinaryArray,
        Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, Int8Array,
        LargeBinaryArray, LargeListArray, LargeStringArray, ListArray, NullArray, PrimitiveArray,
        StringArray, StructArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
    },
    buffer::{NullBuffer, OffsetBuffer},
    datatypes::{
        DataType, FieldRef, Fields, TimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
    },
};

use super::{Value, ValueError};

fn mismatch(expected: &DataType, actual: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected: expected.clone(),
        actual: format!("{actual:?}"),
    }
}

/// Builds an array of `data_type` from owned cells.
pub(crate) fn values_to_array(
    data_type: &DataType,
    values: &[Value],
) -> Result<ArrayRef, ValueError> {
    macro_rules! primitive {
        ($array:ty, $variant:ident) => {{
            let array = values
                .iter()
                .map(|value| match value {
                    Value::$variant(v) => Ok(Some(*v)),
                    Value::Null => Ok(None),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<$array, _>>()?;
            Arc::new(array) as ArrayRef
        }};
    }

    macro_rules! timestamp {
        ($ty:ty, $tz:expr) => {{
            let array = values
                .iter()
                .map(|value| match value {
                    Value::Timestamp(v) => Ok(Some(*v)),
                    Value::Null => Ok(None),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<PrimitiveArray<$ty>, _>>()?
                .with_timezone_opt($tz.clone());
            Arc::new(array) as ArrayRef
        }};
    }

    macro_rules! bytes {
        ($array:ty, $variant:ident, $as_ref:ident) => {{
            let array = values
                .iter()
                .map(|value| match value {
                    Value::$variant(v) => Ok(Some(v.$as_ref())),
                    Value::Null => Ok(None),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<$array, _>>()?;
            Arc::new(array) as ArrayRef
        }};
    }

    let array = match data_type {
        DataType::Null => Arc::new(NullArray::new(values.len())) as ArrayRef,
        DataType::Boolean => primitive!(BooleanArray, Boolean),
        DataType::Int8 => primitive!(Int8Array, Int8),
        DataType::Int16 => primitive!(Int16Array, Int16),
        DataType::Int32 => primitive!(Int32Array, Int32),
        DataType::Int64 => primitive!(Int64Array, Int64),
        DataType::UInt8 => primitive!(UInt8Array, UInt8),
        DataType::UInt16 => primitive!(UInt16Array, UInt16),
        DataType::UInt32 => primitive!(UInt32Array, UInt32),
        DataType::UInt64 => primitive!(UInt64Array, UInt64),
        DataType::Float32 => primitive!(Float32Array, Float32),
        DataType::Float64 => primitive!(Float64Array, Float64),
        DataType::Date32 => primitive!(Date32Array, Date32),
        DataType::Date64 => primitive!(Date64Array, Date64),
        DataType::Timestamp(TimeUnit::Second, tz) => timestamp!(TimestampSecondType, tz),
        DataType::Timestamp(TimeUnit::Millisecond, tz) => timestamp!(TimestampMillisecondType, tz),
        DataType::Timestamp(TimeUnit::Microsecond, tz) => timestamp!(TimestampMicrosecondType, tz),
        DataType::Timestamp(TimeUnit::Nanosecond, tz) => timestamp!(TimestampNanosecondType, tz),
        DataType::Utf8 => bytes!(StringArray, String, as_str),
        DataType::LargeUtf8 => bytes!(LargeStringArray, String, as_str),
        DataType::Binary => bytes!(BinaryArray, Binary, as_slice),
        DataType::LargeBinary => bytes!(LargeBinaryArray, Binary, as_slice),
        DataType::FixedSizeBinary(size) => {
            let cells = values
                .iter()
                .map(|value| match value {
                    Value::Binary(v) => Ok(Some(v.as_slice())),
                    Value::Null => Ok(None),
                    other => Err(mismatch(data_type, other)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(FixedSizeBinaryArray::try_from_sparse_iter_with_size(
                cells.into_iter(),
                *size,
            )?) as ArrayRef
        }
        DataType::List(field) => {
            let (offsets, child, nulls) = flatten_lists(data_type, field, values)?;
            Arc::new(ListArray::try_new(
                field.clone(),
                OffsetBuffer::<i32>::from_lengths(offsets),
                child,
                nulls,
            )?) as ArrayRef
        }
        DataType::LargeList(field) => {
            let (offsets, child, nulls) = flatten_lists(data_type, field, values)?;
            Arc::new(LargeListArray::try_new(
                field.clone(),
                OffsetBuffer::<i64>::from_lengths(offsets),
                child,
                nulls,
            )?) as ArrayRef
        }
        DataType::Struct(fields) => tuples_to_array(data_type, fields, values)?,
        other => return Err(ValueError::UnsupportedType(other.clone())),
    };
    Ok(array)
}

fn validity_buffer(validity: Vec<bool>) -> Option<NullBuffer> {
    validity
        .iter()
        .any(|valid| !valid)
        .then(|| NullBuffer::from(validity))
}

fn flatten_lists(
    data_type: &DataType,
    field: &FieldRef,
    values: &[Value],
) -> Result<(Vec<usize>, ArrayRef, Option<NullBuffer>), ValueError> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut validity = Vec::with_capacity(values.len());
    let mut children = Vec::new();
    for value in values {
        match value {
            Value::List(items) => {
                lengths.push(items.len());
                validity.push(true);
                children.extend(items.iter().cloned());
            }
            Value::Null => {
                lengths.push(0);
                validity.push(false);
            }
            other => return Err(mismatch(data_type, other)),
        }
    }
    let child = values_to_array(field.data_type(), &children)?;
    Ok((lengths, child, validity_buffer(validity)))
}

fn tuples_to_array(
    data_type: &DataType,
    fields: &Fields,
    values: &[Value],
) -> Result<ArrayRef, ValueError> {
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(values.len()); fields.len()];
    let mut validity = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Tuple(items) if items.len() == fields.len() => {
                for (column, item) in columns.iter_mut().zip(items) {
                    column.push(item.clone());
                }
                validity.push(true);
            }
            Value::Null => {
                // Children of a null struct slot still need a valid placeholder.
                for (column, field) in columns.iter_mut().zip(fields.iter()) {
                    column.push(Value::default_for(field.data_type()));
                }
                validity.push(false);
            }
            other => return Err(mismatch(data_type, other)),
        }
    }
    let arrays = fields
        .iter()
        .zip(columns.iter())
        .map(|(field, column)| values_to_array(field.data_type(), column))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(StructArray::try_new(
        fields.clone(),
        arrays,
        validity_buffer(validity),
    )?))
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{Array, AsArray},
        datatypes::{Field, Int64Type},
    };

    use super::*;

    #[test]
    fn builds_nested_lists() {
        let field = Arc::new(Field::new("item", DataType::Int64, true));
        let data_type = DataType::List(field);
        let values = vec![
            Value::List(vec![Value::Int64(1), Value::Int64(2)]),
            Value::Null,
            Value::List(vec![]),
        ];
        let array = values_to_array(&data_type, &values).unwrap();
        let list = array.as_list::<i32>();
        assert_eq!(list.len(), 3);
        assert!(list.is_null(1));
        assert_eq!(
            list.value(0).as_primitive::<Int64Type>().values().to_vec(),
            vec![1, 2]
        );
        assert_eq!(list.value(2).len(), 0);
    }

    #[test]
    fn builds_struct_from_tuples() {
        let fields = Fields::from(vec![
            Field::new("k", DataType::Utf8, false),
            Field::new("v", DataType::UInt32, false),
        ]);
        let data_type = DataType::Struct(fields);
        let values = vec![
            Value::Tuple(vec![Value::from("a"), Value::UInt32(7)]),
            Value::Null,
        ];
        let array = values_to_array(&data_type, &values).unwrap();
        let tuple = array.as_struct();
        assert!(tuple.is_null(1));
        assert_eq!(tuple.column(0).as_string::<i32>().value(0), "a");
    }

    #[test]
    fn rejects_mismatched_cells() {
        let err = values_to_array(&DataType::Int32, &[Value::Int64(1)]).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }
}
