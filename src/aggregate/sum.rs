use arrow::{array::ArrayRef, datatypes::DataType};

use super::{
    argument, expect_arguments, is_summable, AggregateError, AggregateFunction, AggregateState,
    Arena, SUM_WITH_OVERFLOW,
};
use crate::{column::ColumnBuffer, value::Value};

/// Sum that keeps the argument type and wraps integers on overflow.
#[derive(Debug)]
pub(crate) struct SumWithOverflow {
    return_type: DataType,
}

impl SumWithOverflow {
    pub(crate) fn try_new(arguments: &[DataType]) -> Result<Self, AggregateError> {
        expect_arguments(SUM_WITH_OVERFLOW, arguments, 1)?;
        let data_type = &arguments[0];
        if !is_summable(data_type) || matches!(data_type, DataType::Dictionary(_, _)) {
            return Err(AggregateError::IllegalArguments {
                function: SUM_WITH_OVERFLOW.to_owned(),
                reason: format!("type {data_type:?} is not summable"),
            });
        }
        Ok(Self {
            return_type: data_type.clone(),
        })
    }
}

impl AggregateFunction for SumWithOverflow {
    fn name(&self) -> &str {
        SUM_WITH_OVERFLOW
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(SumState {
            sum: Value::default_for(&self.return_type),
        })
    }

    fn default_state(&self) -> Value {
        Value::default_for(&self.return_type)
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        target.accumulate(other)?;
        Ok(())
    }
}

#[derive(Debug)]
struct SumState {
    sum: Value,
}

impl AggregateState for SumState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        let column = argument(SUM_WITH_OVERFLOW, columns, 0)?;
        let value = Value::from_array(column.as_ref(), row)?;
        self.sum.accumulate(&value)?;
        Ok(())
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        out.push(self.sum.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int32Array, StringArray};

    use super::*;

    #[test]
    fn sums_with_wraparound() {
        let function = SumWithOverflow::try_new(&[DataType::Int32]).unwrap();
        let arena = Arena::new();
        let column: ArrayRef = Arc::new(Int32Array::from(vec![Some(i32::MAX), None, Some(2)]));
        let mut state = function.create_state();
        for row in 0..3 {
            state.add(&[&column], row, &arena).unwrap();
        }
        let mut out = ColumnBuffer::new(DataType::Int32);
        state.insert_result_into(&mut out, &arena).unwrap();
        assert_eq!(out.value_at(0).unwrap(), Value::Int32(i32::MIN + 1));
    }

    #[test]
    fn rejects_non_numeric_arguments() {
        assert!(SumWithOverflow::try_new(&[DataType::Utf8]).is_err());
        assert!(SumWithOverflow::try_new(&[]).is_err());

        let function = SumWithOverflow::try_new(&[DataType::Int64]).unwrap();
        let column: ArrayRef = Arc::new(StringArray::from(vec!["x"]));
        let mut state = function.create_state();
        assert!(state.add(&[&column], 0, &Arena::new()).is_err());
    }

    #[test]
    fn merges_stored_states() {
        let function = SumWithOverflow::try_new(&[DataType::Float64]).unwrap();
        let arena = Arena::new();
        let mut target = function.default_state();
        assert_eq!(target, Value::Float64(0.0));
        function.merge_state(&mut target, &Value::Float64(1.25), &arena).unwrap();
        function.merge_state(&mut target, &Value::Float64(0.5), &arena).unwrap();
        assert_eq!(target, Value::Float64(1.75));
    }
}
