//! Aggregate function abstraction bound to columns at classification time.
//!
//! A function is resolved once by name through [`AggregateFunctionFactory`]
//! and shared as `Arc<dyn AggregateFunction>`; every aggregate group gets a
//! fresh [`AggregateState`] from [`AggregateFunction::create_state`], which is
//! dropped when the group is flushed.

mod any;
mod factory;
mod group_array;
mod min_max;
mod sum;
mod sum_map;

use std::fmt;

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Fields},
};
pub use factory::{AggregateFunctionFactory, FunctionBuilder};
use thiserror::Error;

use crate::{
    column::ColumnBuffer,
    value::{Value, ValueError},
};

/// Region allocator for scratch memory of aggregate functions.
///
/// Owned by one merge instance and replaced wholesale when it grows.
pub type Arena = bumpalo::Bump;

/// Default function bound to scalar summable columns.
pub const SUM_WITH_OVERFLOW: &str = "sumWithOverflow";
/// Default function bound to map groups with a single key array.
pub const SUM_MAP_WITH_OVERFLOW: &str = "sumMapWithOverflow";

/// Errors raised while resolving or running aggregate functions.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// No function is registered under the name.
    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),
    /// The function cannot accept the argument types.
    #[error("illegal arguments for {function}: {reason}")]
    IllegalArguments {
        /// Function name.
        function: String,
        /// Why the arguments were rejected.
        reason: String,
    },
    /// The state or input cell has an unexpected shape.
    #[error("{function}: malformed {what}")]
    Malformed {
        /// Function name.
        function: &'static str,
        /// Description of the offending input.
        what: String,
    },
    /// Scalar conversion failure.
    #[error("value error: {0}")]
    Value(#[from] ValueError),
}

/// Capability set of an aggregate function.
pub trait AggregateFunction: fmt::Debug + Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Type of the value written by [`AggregateState::insert_result_into`].
    fn return_type(&self) -> &DataType;

    /// Whether states of this function use the arena handed to `add` / `insert_result_into`.
    fn allocates_memory_in_arena(&self) -> bool {
        false
    }

    /// A fresh, empty state.
    fn create_state(&self) -> Box<dyn AggregateState>;

    /// Initial cell of an aggregate-state column. `Null` stands for a state that saw no rows,
    /// so `merge_state` must take it as the identity.
    fn default_state(&self) -> Value {
        Value::Null
    }

    /// Folds a stored partial state `other` into `target`.
    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        arena: &Arena,
    ) -> Result<(), AggregateError>;
}

/// Transient per-group state of an [`AggregateFunction`].
pub trait AggregateState: fmt::Debug + Send {
    /// Folds the row `row` of the argument `columns` into the state.
    fn add(&mut self, columns: &[&ArrayRef], row: usize, arena: &Arena)
        -> Result<(), AggregateError>;

    /// Appends the aggregate result to `out`.
    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        arena: &Arena,
    ) -> Result<(), AggregateError>;
}

/// Returns true for types the built-in sum functions can add.
pub fn is_summable(data_type: &DataType) -> bool {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => true,
        DataType::Dictionary(_, value) => is_summable(value),
        _ => false,
    }
}

/// Result type of a map-summing function over `arguments`: a tuple holding one
/// array per argument, in argument order.
pub fn map_tuple_type(arguments: &[DataType]) -> DataType {
    DataType::Struct(
        arguments
            .iter()
            .enumerate()
            .map(|(idx, data_type)| Field::new((idx + 1).to_string(), data_type.clone(), true))
            .collect::<Fields>(),
    )
}

fn argument<'a>(
    function: &'static str,
    columns: &[&'a ArrayRef],
    idx: usize,
) -> Result<&'a ArrayRef, AggregateError> {
    columns.get(idx).copied().ok_or_else(|| AggregateError::Malformed {
        function,
        what: format!("argument list (missing argument {idx})"),
    })
}

fn expect_arguments(
    function: &str,
    arguments: &[DataType],
    expected: usize,
) -> Result<(), AggregateError> {
    if arguments.len() != expected {
        return Err(AggregateError::IllegalArguments {
            function: function.to_owned(),
            reason: format!("expected {expected} arguments, got {}", arguments.len()),
        });
    }
    Ok(())
}
