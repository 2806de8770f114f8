//! Static classification of a schema into aggregated, map-merged and
//! pass-through columns.
//!
//! Map groups are recognized by naming convention: list columns named
//! `<table>.<column>` whose table name ends with [`MAP_TABLE_SUFFIX`] belong
//! to the group `<table>`. Inside a group the first column and every column
//! ending with one of [`MAP_KEY_SUFFIXES`] hold keys, the others hold values.

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
    compute::SortOptions,
    datatypes::{DataType, Field, FieldRef, SchemaRef},
};

use crate::{
    aggregate::{is_summable, map_tuple_type, AggregateError, AggregateFunction},
    descriptor::{AggregateDescriptor, DescriptorKind},
    error::MergeError,
    logging::merge_log,
    option::{SortColumn, SummingMergeOptions},
    value::needs_columnar,
};

/// Row-origin bookkeeping column, always carried through.
pub const BLOCK_NUMBER_COLUMN: &str = "_block_number";
/// Row-origin bookkeeping column, always carried through.
pub const BLOCK_OFFSET_COLUMN: &str = "_block_offset";

/// Table-name suffix of list columns forming a map group.
pub const MAP_TABLE_SUFFIX: &str = "Map";
/// Column-name suffixes of key arrays inside a map group.
pub const MAP_KEY_SUFFIXES: [&str; 3] = ["ID", "Key", "Type"];

/// Field metadata marking a column as constant over its run; never aggregated.
pub const CONSTANT_METADATA_KEY: &str = "summing.constant";
/// Field metadata naming the function that combines plain values of the column.
pub const SIMPLE_AGGREGATE_METADATA_KEY: &str = "summing.simple_aggregate_function";
/// Field metadata naming the function whose partial states the column holds.
pub const AGGREGATE_STATE_METADATA_KEY: &str = "summing.aggregate_function";

/// Key and value columns of a composite-key map group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapDescription {
    pub key_col_nums: Vec<usize>,
    pub val_col_nums: Vec<usize>,
}

/// Result of [`define_columns`]; fixed for the lifetime of one merge.
#[derive(Debug)]
pub struct ColumnsDefinition {
    pub(crate) schema: SchemaRef,
    pub(crate) column_names: Vec<String>,
    /// Schema positions and options of the merge key.
    pub(crate) sort_columns: Vec<(usize, SortOptions)>,
    pub(crate) columns_to_aggregate: Vec<AggregateDescriptor>,
    /// Pass-through columns, the last row of a group wins.
    pub(crate) column_numbers_not_to_aggregate: Vec<usize>,
    pub(crate) maps_to_sum: Vec<MapDescription>,
    pub(crate) allocates_memory_in_arena: bool,
    pub(crate) remove_default_values: bool,
    /// Per column: whether the row buffer keeps the cell as a one-row slice.
    pub(crate) columnar: Vec<bool>,
}

impl ColumnsDefinition {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn columns_to_aggregate(&self) -> &[AggregateDescriptor] {
        &self.columns_to_aggregate
    }

    pub fn column_numbers_not_to_aggregate(&self) -> &[usize] {
        &self.column_numbers_not_to_aggregate
    }

    pub fn maps_to_sum(&self) -> &[MapDescription] {
        &self.maps_to_sum
    }

    pub fn allocates_memory_in_arena(&self) -> bool {
        self.allocates_memory_in_arena
    }

    pub fn remove_default_values(&self) -> bool {
        self.remove_default_values
    }

    /// Whether `column` is merged by the map-pair merger.
    pub(crate) fn is_map_column(&self, column: usize) -> bool {
        self.maps_to_sum.iter().any(|map| {
            map.key_col_nums.contains(&column) || map.val_col_nums.contains(&column)
        })
    }
}

/// Text before the first `.`, or the whole name when it has no inner dot.
pub fn nested_table_name(name: &str) -> &str {
    match name.find('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => &name[..pos],
        _ => name,
    }
}

/// `data_type` with every dictionary replaced by its value type.
pub fn remove_dictionary(data_type: &DataType) -> DataType {
    fn nested_field(field: &FieldRef) -> FieldRef {
        Arc::new(
            Field::new(
                field.name(),
                remove_dictionary(field.data_type()),
                field.is_nullable(),
            )
            .with_metadata(field.metadata().clone()),
        )
    }

    match data_type {
        DataType::Dictionary(_, value) => remove_dictionary(value),
        DataType::List(field) => DataType::List(nested_field(field)),
        DataType::LargeList(field) => DataType::LargeList(nested_field(field)),
        DataType::Struct(fields) => DataType::Struct(fields.iter().map(nested_field).collect()),
        other => other.clone(),
    }
}

fn is_integer_represented(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Date32
            | DataType::Date64
            | DataType::Timestamp(_, _)
    )
}

fn is_map_key_element(data_type: &DataType) -> bool {
    is_integer_represented(data_type)
        || matches!(
            data_type,
            DataType::Utf8
                | DataType::LargeUtf8
                | DataType::Binary
                | DataType::LargeBinary
                | DataType::FixedSizeBinary(_)
        )
}

fn is_map_value_element(data_type: &DataType) -> bool {
    is_summable(data_type) && !matches!(data_type, DataType::Dictionary(_, _))
}

fn list_element(data_type: &DataType) -> Option<&DataType> {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) => Some(field.data_type()),
        _ => None,
    }
}

fn metadata<'a>(field: &'a Field, key: &str) -> Option<&'a str> {
    field.metadata().get(key).map(String::as_str)
}

fn check_result_type(
    column: &str,
    function: &dyn AggregateFunction,
    expected: &DataType,
) -> Result<(), MergeError> {
    if function.return_type() != expected {
        return Err(MergeError::ResultTypeMismatch {
            column: column.to_owned(),
            function: function.name().to_owned(),
            expected: expected.clone(),
            actual: function.return_type().clone(),
        });
    }
    Ok(())
}

/// Classifies every column of `schema`.
pub fn define_columns(
    schema: &SchemaRef,
    sort_description: &[SortColumn],
    options: &SummingMergeOptions,
) -> Result<ColumnsDefinition, MergeError> {
    let factory = &options.function_factory;
    let sort_columns = sort_description
        .iter()
        .map(|sort| {
            schema
                .index_of(&sort.name)
                .map(|idx| (idx, sort.options))
                .map_err(|_| MergeError::NoSuchColumn(sort.name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let is_key_or_required = |name: &str| {
        sort_description.iter().any(|sort| sort.name == name)
            || options
                .partition_and_sorting_required_columns
                .iter()
                .any(|required| required == name)
    };

    let mut def = ColumnsDefinition {
        schema: schema.clone(),
        column_names: schema.fields().iter().map(|f| f.name().clone()).collect(),
        sort_columns,
        columns_to_aggregate: Vec::new(),
        column_numbers_not_to_aggregate: Vec::new(),
        maps_to_sum: Vec::new(),
        allocates_memory_in_arena: false,
        remove_default_values: options.remove_default_values,
        columnar: schema
            .fields()
            .iter()
            .map(|f| needs_columnar(f.data_type()))
            .collect(),
    };
    let mut discovered_maps: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

    for (idx, field) in schema.fields().iter().enumerate() {
        let name = field.name().as_str();
        let data_type = field.data_type();
        let simple = metadata(field, SIMPLE_AGGREGATE_METADATA_KEY);
        let state_function = metadata(field, AGGREGATE_STATE_METADATA_KEY);

        if name == BLOCK_NUMBER_COLUMN || name == BLOCK_OFFSET_COLUMN {
            def.column_numbers_not_to_aggregate.push(idx);
            continue;
        }

        if list_element(data_type).is_some() && simple.is_none() {
            let table = nested_table_name(name);
            if table == name || !table.ends_with(MAP_TABLE_SUFFIX) {
                def.column_numbers_not_to_aggregate.push(idx);
            } else {
                discovered_maps.entry(table).or_default().push(idx);
            }
            continue;
        }

        let constant = metadata(field, CONSTANT_METADATA_KEY) == Some("true");
        let aggregatable = is_summable(data_type) || state_function.is_some() || simple.is_some();
        if !options.aggregate_all_columns && (!aggregatable || constant) {
            def.column_numbers_not_to_aggregate.push(idx);
            continue;
        }
        if is_key_or_required(name) {
            def.column_numbers_not_to_aggregate.push(idx);
            continue;
        }
        if !options.column_names_to_sum.is_empty()
            && !options.column_names_to_sum.iter().any(|c| c == name)
        {
            def.column_numbers_not_to_aggregate.push(idx);
            continue;
        }

        let nested = remove_dictionary(data_type);
        let argument_type = nested.clone();
        let nested_type = (nested != *data_type).then_some(nested);
        let (kind, function) = match (simple, state_function) {
            (Some(function), _) => (
                DescriptorKind::SimpleAggregate,
                factory.get(function, &[argument_type])?,
            ),
            (None, Some(function)) => {
                if needs_columnar(&argument_type) {
                    return Err(AggregateError::IllegalArguments {
                        function: function.to_owned(),
                        reason: format!("state column {name} has non-scalar type {argument_type:?}"),
                    }
                    .into());
                }
                (
                    DescriptorKind::AggregateState,
                    factory.get(function, &[argument_type])?,
                )
            }
            (None, None) => (
                DescriptorKind::Default,
                factory.get(&options.sum_function_name, &[argument_type])?,
            ),
        };
        let expected = nested_type.as_ref().unwrap_or(data_type);
        check_result_type(name, function.as_ref(), expected)?;
        if function.allocates_memory_in_arena() {
            def.allocates_memory_in_arena = true;
        }
        def.columns_to_aggregate.push(AggregateDescriptor::new(
            function,
            kind,
            vec![(idx, name.to_owned())],
            data_type.clone(),
            nested_type,
            options.remove_default_values,
        ));
    }

    for (table, columns) in discovered_maps {
        let demote = |def: &mut ColumnsDefinition, reason: &str| {
            merge_log!(
                log::Level::Debug,
                "map_group_demoted",
                "group={} reason={}",
                table,
                reason
            );
            def.column_numbers_not_to_aggregate.extend(&columns);
        };

        if columns.len() < 2 {
            demote(&mut def, "single_column");
            continue;
        }
        if columns
            .iter()
            .any(|idx| is_key_or_required(schema.field(*idx).name()))
        {
            demote(&mut def, "key_column");
            continue;
        }

        let mut map = MapDescription {
            key_col_nums: Vec::new(),
            val_col_nums: Vec::new(),
        };
        let mut valid = true;
        for (pos, idx) in columns.iter().enumerate() {
            let field = schema.field(*idx);
            let Some(element) = list_element(field.data_type()) else {
                valid = false;
                break;
            };
            let is_key = pos == 0
                || MAP_KEY_SUFFIXES
                    .iter()
                    .any(|suffix| field.name().ends_with(suffix));
            if is_key && is_map_key_element(element) {
                map.key_col_nums.push(*idx);
            } else if !is_key && is_map_value_element(element) {
                map.val_col_nums.push(*idx);
            } else {
                valid = false;
                break;
            }
        }
        if !valid || map.val_col_nums.is_empty() {
            demote(&mut def, "element_type");
            continue;
        }

        if map.key_col_nums.len() == 1 {
            let argument_types = columns
                .iter()
                .map(|idx| schema.field(*idx).data_type().clone())
                .collect::<Vec<_>>();
            let function = factory.get(&options.sum_function_map_name, &argument_types)?;
            let tuple_type = map_tuple_type(&argument_types);
            check_result_type(table, function.as_ref(), &tuple_type)?;
            if function.allocates_memory_in_arena() {
                def.allocates_memory_in_arena = true;
            }
            def.columns_to_aggregate.push(AggregateDescriptor::new(
                function,
                DescriptorKind::Default,
                columns
                    .iter()
                    .map(|idx| (*idx, schema.field(*idx).name().clone()))
                    .collect(),
                tuple_type,
                None,
                options.remove_default_values,
            ));
        } else {
            def.column_numbers_not_to_aggregate.extend(&columns);
            def.maps_to_sum.push(map);
        }
    }

    merge_log!(
        log::Level::Debug,
        "columns_defined",
        "aggregated={} pass_through={} maps={} arena={}",
        def.columns_to_aggregate.len(),
        def.column_numbers_not_to_aggregate.len(),
        def.maps_to_sum.len(),
        def.allocates_memory_in_arena
    );
    Ok(def)
}
