use arrow::{array::ArrayRef, datatypes::DataType};
use bumpalo::collections::Vec as BumpVec;

use super::{argument, expect_arguments, AggregateError, AggregateFunction, AggregateState, Arena};
use crate::{
    column::ColumnBuffer,
    value::{is_supported_type, Value},
};

const GROUP_ARRAY_ARRAY: &str = "groupArrayArray";
const GROUP_UNIQ_ARRAY_ARRAY: &str = "groupUniqArrayArray";

fn list_argument(
    function: &'static str,
    arguments: &[DataType],
) -> Result<DataType, AggregateError> {
    expect_arguments(function, arguments, 1)?;
    match &arguments[0] {
        DataType::List(field) | DataType::LargeList(field)
            if is_supported_type(field.data_type()) =>
        {
            Ok(arguments[0].clone())
        }
        other => Err(AggregateError::IllegalArguments {
            function: function.to_owned(),
            reason: format!("expected an array argument, got {other:?}"),
        }),
    }
}

fn read_elements(
    function: &'static str,
    columns: &[&ArrayRef],
    row: usize,
) -> Result<Vec<Value>, AggregateError> {
    let column = argument(function, columns, 0)?;
    match Value::from_array(column.as_ref(), row)? {
        Value::List(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(AggregateError::Malformed {
            function,
            what: format!("array cell {other:?}"),
        }),
    }
}

fn merge_lists(
    function: &'static str,
    target: &mut Value,
    other: &Value,
) -> Result<(), AggregateError> {
    let extra = other.as_list().ok_or_else(|| AggregateError::Malformed {
        function,
        what: format!("state {other:?}"),
    })?;
    match target {
        Value::List(items) => items.extend(extra.iter().cloned()),
        Value::Null => *target = Value::List(extra.to_vec()),
        other => {
            return Err(AggregateError::Malformed {
                function,
                what: format!("state {other:?}"),
            })
        }
    }
    Ok(())
}

/// Concatenates the arrays of a group.
#[derive(Debug)]
pub(crate) struct GroupArrayArray {
    return_type: DataType,
}

impl GroupArrayArray {
    pub(crate) fn try_new(arguments: &[DataType]) -> Result<Self, AggregateError> {
        Ok(Self {
            return_type: list_argument(GROUP_ARRAY_ARRAY, arguments)?,
        })
    }
}

impl AggregateFunction for GroupArrayArray {
    fn name(&self) -> &str {
        GROUP_ARRAY_ARRAY
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(ConcatState {
            elements: Vec::new(),
        })
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        merge_lists(GROUP_ARRAY_ARRAY, target, other)
    }
}

#[derive(Debug)]
struct ConcatState {
    elements: Vec<Value>,
}

impl AggregateState for ConcatState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        self.elements.extend(read_elements(GROUP_ARRAY_ARRAY, columns, row)?);
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        out.push(Value::List(std::mem::take(&mut self.elements)))?;
        Ok(())
    }
}

/// Sorted distinct union of the arrays of a group.
#[derive(Debug)]
pub(crate) struct GroupUniqArrayArray {
    return_type: DataType,
}

impl GroupUniqArrayArray {
    pub(crate) fn try_new(arguments: &[DataType]) -> Result<Self, AggregateError> {
        Ok(Self {
            return_type: list_argument(GROUP_UNIQ_ARRAY_ARRAY, arguments)?,
        })
    }
}

fn sorted_distinct(elements: &[Value], arena: &Arena) -> Vec<Value> {
    let mut scratch = BumpVec::with_capacity_in(elements.len(), arena);
    scratch.extend(elements.iter());
    scratch.sort();
    scratch.dedup();
    scratch.iter().map(|value| (*value).clone()).collect()
}

impl AggregateFunction for GroupUniqArrayArray {
    fn name(&self) -> &str {
        GROUP_UNIQ_ARRAY_ARRAY
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn allocates_memory_in_arena(&self) -> bool {
        true
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(UniqState {
            elements: Vec::new(),
        })
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        arena: &Arena,
    ) -> Result<(), AggregateError> {
        merge_lists(GROUP_UNIQ_ARRAY_ARRAY, target, other)?;
        if let Value::List(items) = target {
            *items = sorted_distinct(items, arena);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct UniqState {
    elements: Vec<Value>,
}

impl AggregateState for UniqState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        // duplicates are dropped once, by `sorted_distinct`
        self.elements
            .extend(read_elements(GROUP_UNIQ_ARRAY_ARRAY, columns, row)?);
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        arena: &Arena,
    ) -> Result<(), AggregateError> {
        let elements = std::mem::take(&mut self.elements);
        out.push(Value::List(sorted_distinct(&elements, arena)))?;
        Ok(())
    }
}
