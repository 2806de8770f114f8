use arrow::{datatypes::DataType, error::ArrowError};
use thiserror::Error;

use crate::{
    aggregate::AggregateError,
    logging::merge_log,
    value::ValueError,
};

/// Error type returned by every fallible merge operation.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A cell could not be materialized from an input chunk.
    #[error("failed to read row {row} of column {column} ({name}): {source}")]
    CorruptedData {
        /// Row index inside the offending chunk.
        row: usize,
        /// Schema position of the column.
        column: usize,
        /// Column name.
        name: String,
        /// Underlying conversion failure.
        source: ValueError,
    },
    /// A row was folded into, or flushed from, an aggregate slot whose state was never created.
    #[error("aggregate state for column {column} was not created")]
    StateNotCreated {
        /// Name of the first column bound to the slot.
        column: String,
    },
    /// `merge` was called while a requested input was still outstanding.
    #[error("input {0} was requested but not consumed")]
    InputNotConsumed(usize),
    /// `merge` or `consume` was called before `initialize`.
    #[error("merge algorithm is not initialized")]
    NotInitialized,
    /// A source index outside `0..num_inputs` was supplied.
    #[error("unknown input source {0}")]
    UnknownSource(usize),
    /// `consume` was called for a source the driver did not ask for.
    #[error("input {0} was not requested")]
    UnexpectedInput(usize),
    /// An input chunk does not match the merge schema.
    #[error("input {source_idx} column {column}: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        /// Input index the chunk came from.
        source_idx: usize,
        /// Column position.
        column: usize,
        /// Declared data type.
        expected: DataType,
        /// Data type of the incoming array.
        actual: DataType,
    },
    /// An input chunk carries the wrong number of columns.
    #[error("input {source_idx}: expected {expected} columns, got {actual}")]
    ColumnCountMismatch {
        /// Input index the chunk came from.
        source_idx: usize,
        /// Number of schema fields.
        expected: usize,
        /// Number of columns in the chunk.
        actual: usize,
    },
    /// A sort column is not part of the schema.
    #[error("no such column in schema: {0}")]
    NoSuchColumn(String),
    /// A bound aggregate function produces a type the output column cannot hold.
    #[error("function {function} for column {column} returns {actual:?}, expected {expected:?}")]
    ResultTypeMismatch {
        /// Column name.
        column: String,
        /// Function name.
        function: String,
        /// Output column type.
        expected: DataType,
        /// Function result type.
        actual: DataType,
    },
    /// Parallel arrays of one map group have different lengths in one row.
    #[error("nested arrays of map group differ in length at row {row}")]
    NestedSizeMismatch {
        /// Row index inside the offending chunk.
        row: usize,
    },
    /// Aggregate function failure.
    #[error("aggregate error: {0}")]
    Aggregate(#[from] AggregateError),
    /// Scalar conversion failure outside of input reading.
    #[error("value error: {0}")]
    Value(#[from] ValueError),
    /// Arrow kernel failure.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// Failure reported by an upstream input stream.
    #[error("input source error: {0}")]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl MergeError {
    /// Attributes a cell read failure to its row and column.
    pub(crate) fn corrupted(row: usize, column: usize, name: &str, source: ValueError) -> Self {
        merge_log!(
            log::Level::Error,
            "corrupted_cell",
            "row={} column={} name={} error={}",
            row,
            column,
            name,
            source
        );
        MergeError::CorruptedData {
            row,
            column,
            name: name.to_owned(),
            source,
        }
    }
}
