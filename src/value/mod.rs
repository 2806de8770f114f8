//! Owned scalar cells used by the row buffer, the map-pair merger and the
//! built-in aggregate functions.
//!
//! Only types that survive an array -> [`Value`] -> array round trip without
//! losing structure are representable; everything else is carried as a
//! one-row array slice (see [`needs_columnar`]).

mod array;

use std::{cmp::Ordering, sync::Arc};

use arrow::{
    array::{Array, AsArray},
    datatypes::{
        DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type, Int32Type,
        Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
        TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type,
        UInt8Type,
    },
    error::ArrowError,
};
pub(crate) use array::values_to_array;
use thiserror::Error;

/// Error raised while converting between arrays and [`Value`]s.
#[derive(Debug, Error)]
pub enum ValueError {
    /// The data type has no scalar representation.
    #[error("unsupported data type: {0:?}")]
    UnsupportedType(DataType),
    /// The array's physical layout does not match its declared data type.
    #[error("array does not match declared type {0:?}")]
    Downcast(DataType),
    /// A value does not fit the requested data type.
    #[error("type mismatch: expected {expected:?}, got {actual}")]
    TypeMismatch {
        /// Target data type.
        expected: DataType,
        /// Debug rendering of the offending value.
        actual: String,
    },
    /// Two values cannot be added.
    #[error("cannot sum {lhs} and {rhs}")]
    CannotSum {
        /// Debug rendering of the accumulator.
        lhs: String,
        /// Debug rendering of the addend.
        rhs: String,
    },
    /// Row index is outside the array.
    #[error("invalid row index {0} (len={1})")]
    RowOutOfBounds(usize, usize),
    /// Arrow failure while assembling an array.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// A single owned cell.
///
/// Strings and binaries of every offset width map to [`Value::String`] and
/// [`Value::Binary`]; lists map to [`Value::List`] and structs to
/// [`Value::Tuple`]. The declared [`DataType`] of the surrounding column
/// decides the physical layout when values are turned back into an array.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null is less than any non-null value.
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
    Date32(i32),
    Date64(i64),
    /// Timestamp in the unit of the column it belongs to.
    Timestamp(i64),
    /// Elements of a list cell.
    List(Vec<Value>),
    /// Children of a struct cell.
    Tuple(Vec<Value>),
}

/// Returns true when cells of `data_type` must be kept as one-row array slices.
pub fn needs_columnar(data_type: &DataType) -> bool {
    !is_supported_type(data_type)
}

/// Returns true when [`Value`] can represent cells of `data_type` losslessly.
pub fn is_supported_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::FixedSizeBinary(_)
        | DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _) => true,
        DataType::List(field) | DataType::LargeList(field) => is_supported_type(field.data_type()),
        DataType::Struct(fields) => fields.iter().all(|f| is_supported_type(f.data_type())),
        _ => false,
    }
}

impl Value {
    /// Reads the cell at `row` of `array`.
    pub fn from_array(array: &dyn Array, row: usize) -> Result<Value, ValueError> {
        if row >= array.len() {
            return Err(ValueError::RowOutOfBounds(row, array.len()));
        }
        if array.is_null(row) {
            return Ok(Value::Null);
        }
        let data_type = array.data_type();
        let downcast = || ValueError::Downcast(data_type.clone());

        macro_rules! primitive {
            ($ty:ty, $variant:ident) => {
                array
                    .as_primitive_opt::<$ty>()
                    .map(|a| Value::$variant(a.value(row)))
                    .ok_or_else(downcast)
            };
        }

        match data_type {
            DataType::Null => Ok(Value::Null),
            DataType::Boolean => array
                .as_boolean_opt()
                .map(|a| Value::Boolean(a.value(row)))
                .ok_or_else(downcast),
            DataType::Int8 => primitive!(Int8Type, Int8),
            DataType::Int16 => primitive!(Int16Type, Int16),
            DataType::Int32 => primitive!(Int32Type, Int32),
            DataType::Int64 => primitive!(Int64Type, Int64),
            DataType::UInt8 => primitive!(UInt8Type, UInt8),
            DataType::UInt16 => primitive!(UInt16Type, UInt16),
            DataType::UInt32 => primitive!(UInt32Type, UInt32),
            DataType::UInt64 => primitive!(UInt64Type, UInt64),
            DataType::Float32 => primitive!(Float32Type, Float32),
            DataType::Float64 => primitive!(Float64Type, Float64),
            DataType::Date32 => primitive!(Date32Type, Date32),
            DataType::Date64 => primitive!(Date64Type, Date64),
            DataType::Timestamp(TimeUnit::Second, _) => primitive!(TimestampSecondType, Timestamp),
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                primitive!(TimestampMillisecondType, Timestamp)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                primitive!(TimestampMicrosecondType, Timestamp)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                primitive!(TimestampNanosecondType, Timestamp)
            }
            DataType::Utf8 => array
                .as_string_opt::<i32>()
                .map(|a| Value::String(a.value(row).to_owned()))
                .ok_or_else(downcast),
            DataType::LargeUtf8 => array
                .as_string_opt::<i64>()
                .map(|a| Value::String(a.value(row).to_owned()))
                .ok_or_else(downcast),
            DataType::Binary => array
                .as_binary_opt::<i32>()
                .map(|a| Value::Binary(a.value(row).to_vec()))
                .ok_or_else(downcast),
            DataType::LargeBinary => array
                .as_binary_opt::<i64>()
                .map(|a| Value::Binary(a.value(row).to_vec()))
                .ok_or_else(downcast),
            DataType::FixedSizeBinary(_) => array
                .as_fixed_size_binary_opt()
                .map(|a| Value::Binary(a.value(row).to_vec()))
                .ok_or_else(downcast),
            DataType::List(_) => {
                let list = array.as_list_opt::<i32>().ok_or_else(downcast)?;
                Self::list_from_array(list.value(row).as_ref())
            }
            DataType::LargeList(_) => {
                let list = array.as_list_opt::<i64>().ok_or_else(downcast)?;
                Self::list_from_array(list.value(row).as_ref())
            }
            DataType::Struct(_) => {
                let tuple = array.as_struct_opt().ok_or_else(downcast)?;
                tuple
                    .columns()
                    .iter()
                    .map(|column| Value::from_array(column.as_ref(), row))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Tuple)
            }
            other => Err(ValueError::UnsupportedType(other.clone())),
        }
    }

    fn list_from_array(elements: &dyn Array) -> Result<Value, ValueError> {
        (0..elements.len())
            .map(|idx| Value::from_array(elements, idx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }

    /// The default ("zero") cell of `data_type`.
    pub fn default_for(data_type: &DataType) -> Value {
        match data_type {
            DataType::Boolean => Value::Boolean(false),
            DataType::Int8 => Value::Int8(0),
            DataType::Int16 => Value::Int16(0),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::UInt8 => Value::UInt8(0),
            DataType::UInt16 => Value::UInt16(0),
            DataType::UInt32 => Value::UInt32(0),
            DataType::UInt64 => Value::UInt64(0),
            DataType::Float32 => Value::Float32(0.0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Utf8 | DataType::LargeUtf8 => Value::String(String::new()),
            DataType::Binary | DataType::LargeBinary => Value::Binary(Vec::new()),
            DataType::FixedSizeBinary(size) => Value::Binary(vec![0; (*size).max(0) as usize]),
            DataType::Date32 => Value::Date32(0),
            DataType::Date64 => Value::Date64(0),
            DataType::Timestamp(_, _) => Value::Timestamp(0),
            DataType::List(_) | DataType::LargeList(_) => Value::List(Vec::new()),
            DataType::Struct(fields) => Value::Tuple(
                fields
                    .iter()
                    .map(|field| Value::default_for(field.data_type()))
                    .collect(),
            ),
            _ => Value::Null,
        }
    }

    /// Returns true for null and for the zero value of every type.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => !*v,
            Value::Int8(v) => *v == 0,
            Value::Int16(v) => *v == 0,
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::UInt8(v) => *v == 0,
            Value::UInt16(v) => *v == 0,
            Value::UInt32(v) => *v == 0,
            Value::UInt64(v) => *v == 0,
            Value::Float32(v) => *v == 0.0,
            Value::Float64(v) => *v == 0.0,
            Value::String(v) => v.is_empty(),
            Value::Binary(v) => v.iter().all(|b| *b == 0),
            Value::Date32(v) => *v == 0,
            Value::Date64(v) | Value::Timestamp(v) => *v == 0,
            Value::List(v) => v.is_empty(),
            Value::Tuple(v) => v.iter().all(Value::is_default),
        }
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Elements of a list cell; null reads as an empty list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Null => Some(&[]),
            _ => None,
        }
    }

    /// Adds `rhs` into `self` and reports whether the result is non-zero.
    ///
    /// Integers wrap on overflow. Null on either side is the additive identity.
    pub fn accumulate(&mut self, rhs: &Value) -> Result<bool, ValueError> {
        if rhs.is_null() {
            return Ok(!self.is_default());
        }
        if self.is_null() {
            *self = rhs.clone();
            return Ok(!self.is_default());
        }

        macro_rules! wrapping {
            ($($variant:ident),*) => {
                match (&mut *self, rhs) {
                    $((Value::$variant(lhs), Value::$variant(rhs)) => *lhs = lhs.wrapping_add(*rhs),)*
                    (Value::Float32(lhs), Value::Float32(rhs)) => *lhs += *rhs,
                    (Value::Float64(lhs), Value::Float64(rhs)) => *lhs += *rhs,
                    (lhs, rhs) => {
                        return Err(ValueError::CannotSum {
                            lhs: format!("{lhs:?}"),
                            rhs: format!("{rhs:?}"),
                        })
                    }
                }
            };
        }

        wrapping!(Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64);
        Ok(!self.is_default())
    }

    /// Rough heap + inline footprint used for output byte caps.
    pub fn size_hint(&self) -> usize {
        match self {
            Value::String(v) => v.len() + 8,
            Value::Binary(v) => v.len() + 8,
            Value::List(v) | Value::Tuple(v) => 8 + v.iter().map(Value::size_hint).sum::<usize>(),
            _ => 8,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int8(_) => 2,
            Value::Int16(_) => 3,
            Value::Int32(_) => 4,
            Value::Int64(_) => 5,
            Value::UInt8(_) => 6,
            Value::UInt16(_) => 7,
            Value::UInt32(_) => 8,
            Value::UInt64(_) => 9,
            Value::Float32(_) => 10,
            Value::Float64(_) => 11,
            Value::String(_) => 12,
            Value::Binary(_) => 13,
            Value::Date32(_) => 14,
            Value::Date64(_) => 15,
            Value::Timestamp(_) => 16,
            Value::List(_) => 17,
            Value::Tuple(_) => 18,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
            (Value::Int8(l), Value::Int8(r)) => l.cmp(r),
            (Value::Int16(l), Value::Int16(r)) => l.cmp(r),
            (Value::Int32(l), Value::Int32(r)) => l.cmp(r),
            (Value::Int64(l), Value::Int64(r)) => l.cmp(r),
            (Value::UInt8(l), Value::UInt8(r)) => l.cmp(r),
            (Value::UInt16(l), Value::UInt16(r)) => l.cmp(r),
            (Value::UInt32(l), Value::UInt32(r)) => l.cmp(r),
            (Value::UInt64(l), Value::UInt64(r)) => l.cmp(r),
            (Value::Float32(l), Value::Float32(r)) => l.total_cmp(r),
            (Value::Float64(l), Value::Float64(r)) => l.total_cmp(r),
            (Value::String(l), Value::String(r)) => l.cmp(r),
            (Value::Binary(l), Value::Binary(r)) => l.cmp(r),
            (Value::Date32(l), Value::Date32(r)) => l.cmp(r),
            (Value::Date64(l), Value::Date64(r)) => l.cmp(r),
            (Value::Timestamp(l), Value::Timestamp(r)) => l.cmp(r),
            (Value::List(l), Value::List(r)) | (Value::Tuple(l), Value::Tuple(r)) => l.cmp(r),
            (lhs, rhs) => lhs.rank().cmp(&rhs.rank()),
        }
    }
}

macro_rules! impl_from_native {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Boolean,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Binary,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::String(value.as_ref().to_owned())
    }
}
