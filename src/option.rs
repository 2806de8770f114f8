use arrow::compute::SortOptions;

use crate::aggregate::{AggregateFunctionFactory, SUM_MAP_WITH_OVERFLOW, SUM_WITH_OVERFLOW};

/// One column of the merge key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    pub name: String,
    pub options: SortOptions,
}

impl SortColumn {
    /// Ascending, nulls first.
    pub fn new(name: impl Into<String>) -> Self {
        SortColumn {
            name: name.into(),
            options: SortOptions::default(),
        }
    }

    pub fn with_options(name: impl Into<String>, options: SortOptions) -> Self {
        SortColumn {
            name: name.into(),
            options,
        }
    }
}

/// Knobs of one summing merge.
#[derive(Debug, Clone)]
pub struct SummingMergeOptions {
    pub(crate) max_block_size_rows: usize,
    pub(crate) max_block_size_bytes: Option<usize>,
    pub(crate) sum_function_name: String,
    pub(crate) sum_function_map_name: String,
    /// Only these columns are summed when non-empty.
    pub(crate) column_names_to_sum: Vec<String>,
    /// Never aggregated, on top of the sort key.
    pub(crate) partition_and_sorting_required_columns: Vec<String>,
    pub(crate) aggregate_all_columns: bool,
    pub(crate) remove_default_values: bool,
    pub(crate) function_factory: AggregateFunctionFactory,
}

impl Default for SummingMergeOptions {
    fn default() -> Self {
        SummingMergeOptions {
            max_block_size_rows: 8192,
            max_block_size_bytes: None,
            sum_function_name: SUM_WITH_OVERFLOW.to_owned(),
            sum_function_map_name: SUM_MAP_WITH_OVERFLOW.to_owned(),
            column_names_to_sum: Vec::new(),
            partition_and_sorting_required_columns: Vec::new(),
            aggregate_all_columns: false,
            remove_default_values: true,
            function_factory: AggregateFunctionFactory::default(),
        }
    }
}

impl SummingMergeOptions {
    /// Row cap of an output chunk; zero is treated as one.
    pub fn max_block_size_rows(self, max_block_size_rows: usize) -> Self {
        SummingMergeOptions {
            max_block_size_rows: max_block_size_rows.max(1),
            ..self
        }
    }

    pub fn max_block_size_bytes(self, max_block_size_bytes: usize) -> Self {
        SummingMergeOptions {
            max_block_size_bytes: Some(max_block_size_bytes),
            ..self
        }
    }

    pub fn sum_function_name(self, sum_function_name: impl Into<String>) -> Self {
        SummingMergeOptions {
            sum_function_name: sum_function_name.into(),
            ..self
        }
    }

    pub fn sum_function_map_name(self, sum_function_map_name: impl Into<String>) -> Self {
        SummingMergeOptions {
            sum_function_map_name: sum_function_map_name.into(),
            ..self
        }
    }

    pub fn column_names_to_sum<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SummingMergeOptions {
            column_names_to_sum: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn partition_and_sorting_required_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SummingMergeOptions {
            partition_and_sorting_required_columns: columns.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn aggregate_all_columns(self, aggregate_all_columns: bool) -> Self {
        SummingMergeOptions {
            aggregate_all_columns,
            ..self
        }
    }

    pub fn remove_default_values(self, remove_default_values: bool) -> Self {
        SummingMergeOptions {
            remove_default_values,
            ..self
        }
    }

    pub fn function_factory(self, function_factory: AggregateFunctionFactory) -> Self {
        SummingMergeOptions {
            function_factory,
            ..self
        }
    }
}
