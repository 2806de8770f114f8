use arrow::{array::ArrayRef, datatypes::DataType};

use super::{argument, expect_arguments, AggregateError, AggregateFunction, AggregateState, Arena};
use crate::{
    column::ColumnBuffer,
    value::{is_supported_type, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MinMaxKind {
    Min,
    Max,
}

impl MinMaxKind {
    fn name(self) -> &'static str {
        match self {
            MinMaxKind::Min => "min",
            MinMaxKind::Max => "max",
        }
    }

    fn prefers(self, candidate: &Value, current: &Value) -> bool {
        match self {
            MinMaxKind::Min => candidate < current,
            MinMaxKind::Max => candidate > current,
        }
    }
}

/// `min` / `max` over any scalar type; nulls are ignored.
#[derive(Debug)]
pub(crate) struct MinMax {
    kind: MinMaxKind,
    return_type: DataType,
}

impl MinMax {
    pub(crate) fn try_new(
        kind: MinMaxKind,
        arguments: &[DataType],
    ) -> Result<Self, AggregateError> {
        expect_arguments(kind.name(), arguments, 1)?;
        if !is_supported_type(&arguments[0]) {
            return Err(AggregateError::IllegalArguments {
                function: kind.name().to_owned(),
                reason: format!("type {:?} is not comparable", arguments[0]),
            });
        }
        Ok(Self {
            kind,
            return_type: arguments[0].clone(),
        })
    }
}

impl AggregateFunction for MinMax {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(MinMaxState {
            kind: self.kind,
            current: None,
        })
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        if other.is_null() {
            return Ok(());
        }
        if target.is_null() || self.kind.prefers(other, target) {
            *target = other.clone();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MinMaxState {
    kind: MinMaxKind,
    current: Option<Value>,
}

impl AggregateState for MinMaxState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        let column = argument(self.kind.name(), columns, 0)?;
        let value = Value::from_array(column.as_ref(), row)?;
        if value.is_null() {
            return Ok(());
        }
        let replace = self
            .current
            .as_ref()
            .map_or(true, |current| self.kind.prefers(&value, current));
        if replace {
            self.current = Some(value);
        }
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        match self.current.take() {
            Some(value) => out.push(value)?,
            None => out.insert_default()?,
        }
        Ok(())
    }
}
