use arrow::{
    array::{Array, ArrayRef},
    datatypes::DataType,
};

use super::{argument, expect_arguments, AggregateError, AggregateFunction, AggregateState, Arena};
use crate::{column::ColumnBuffer, value::Value};

/// `any` keeps the first non-null cell of the group, `anyLast` the last one.
///
/// Works on every type: the chosen cell is kept as a one-row slice.
#[derive(Debug)]
pub(crate) struct Any {
    last: bool,
    return_type: DataType,
}

impl Any {
    pub(crate) fn try_new(last: bool, arguments: &[DataType]) -> Result<Self, AggregateError> {
        expect_arguments(name(last), arguments, 1)?;
        Ok(Self {
            last,
            return_type: arguments[0].clone(),
        })
    }
}

fn name(last: bool) -> &'static str {
    if last {
        "anyLast"
    } else {
        "any"
    }
}

impl AggregateFunction for Any {
    fn name(&self) -> &str {
        name(self.last)
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(AnyState {
            last: self.last,
            chosen: None,
        })
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        if !other.is_null() && (self.last || target.is_null()) {
            *target = other.clone();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AnyState {
    last: bool,
    chosen: Option<ArrayRef>,
}

impl AggregateState for AnyState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        if self.chosen.is_some() && !self.last {
            return Ok(());
        }
        let column = argument(name(self.last), columns, 0)?;
        if row >= column.len() {
            return Err(AggregateError::Malformed {
                function: name(self.last),
                what: format!("row {row} of a column with {} rows", column.len()),
            });
        }
        if column.is_valid(row) {
            self.chosen = Some(column.slice(row, 1));
        }
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        match self.chosen.take() {
            Some(cell) => out.push_row(&cell, 0)?,
            None => out.insert_default()?,
        }
        Ok(())
    }
}
