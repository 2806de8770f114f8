//! Summing k-way merge of key-sorted Arrow runs.
//!
//! Rows of all inputs that share a merge key collapse into one output row:
//! numeric columns are summed, columns tagged with an aggregate function are
//! folded by that function, map groups (`<name>Map.<column>` list columns)
//! are merged entry by entry, and every other column keeps the value of the
//! last row in merge order. Groups whose aggregated values net to zero are
//! dropped entirely.
//!
//! [`SummingSortedAlgorithm`] is the synchronous core: it never blocks and
//! asks its caller for the next chunk of a specific input through
//! [`MergeStatus::NeedInput`]. [`SummingMerge`] drives it over async streams
//! and [`merge_sorted_runs`] over in-memory runs.

/// Aggregate functions and the registry that resolves them by name.
pub mod aggregate;
/// The merge driver state machine.
pub mod algorithm;
mod chunk;
/// Output column buffers and row-buffer slots.
pub mod column;
/// Schema classification into aggregated, map-merged and pass-through columns.
pub mod definition;
/// Per-column aggregate slots.
pub mod descriptor;
mod error;
mod logging;
mod map_merge;
mod merge;
mod merged;
mod option;
/// Owned scalar cells.
pub mod value;

pub use crate::{
    aggregate::{AggregateError, AggregateFunction, AggregateFunctionFactory, AggregateState},
    algorithm::{MergeInput, MergeStatus, SummingSortedAlgorithm},
    definition::{define_columns, ColumnsDefinition, MapDescription},
    error::MergeError,
    merge::{merge_sorted_runs, BatchStream, SummingMerge},
    option::{SortColumn, SummingMergeOptions},
    value::{Value, ValueError},
};
