use std::collections::BTreeMap;

use arrow::{array::ArrayRef, datatypes::DataType};

use super::{
    argument, is_summable, map_tuple_type, AggregateError, AggregateFunction, AggregateState,
    Arena, SUM_MAP_WITH_OVERFLOW,
};
use crate::{
    column::ColumnBuffer,
    value::{is_supported_type, Value},
};

fn element_type(data_type: &DataType) -> Option<&DataType> {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) => Some(field.data_type()),
        _ => None,
    }
}

fn illegal(reason: String) -> AggregateError {
    AggregateError::IllegalArguments {
        function: SUM_MAP_WITH_OVERFLOW.to_owned(),
        reason,
    }
}

fn malformed(what: String) -> AggregateError {
    AggregateError::Malformed {
        function: SUM_MAP_WITH_OVERFLOW,
        what,
    }
}

/// Sums parallel value arrays by key: `(keys, values...) -> (keys, sums...)`.
///
/// Result keys are sorted and entries whose sums are all zero are dropped.
/// Integer sums wrap on overflow.
#[derive(Debug)]
pub(crate) struct SumMapWithOverflow {
    value_types: Vec<DataType>,
    return_type: DataType,
}

impl SumMapWithOverflow {
    pub(crate) fn try_new(arguments: &[DataType]) -> Result<Self, AggregateError> {
        if arguments.len() < 2 {
            return Err(illegal(format!(
                "expected a key array and at least one value array, got {} arguments",
                arguments.len()
            )));
        }
        let key_type = element_type(&arguments[0])
            .ok_or_else(|| illegal(format!("keys must be an array, got {:?}", arguments[0])))?;
        if !is_supported_type(key_type) {
            return Err(illegal(format!("unsupported key type {key_type:?}")));
        }
        let value_types = arguments[1..]
            .iter()
            .map(|argument| match element_type(argument) {
                Some(value)
                    if is_summable(value) && !matches!(value, DataType::Dictionary(..)) =>
                {
                    Ok(value.clone())
                }
                _ => Err(illegal(format!(
                    "values must be a numeric array, got {argument:?}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            value_types,
            return_type: map_tuple_type(arguments),
        })
    }

    fn empty_state(&self) -> SumMapState {
        SumMapState {
            value_types: self.value_types.clone(),
            entries: BTreeMap::new(),
        }
    }
}

impl AggregateFunction for SumMapWithOverflow {
    fn name(&self) -> &str {
        SUM_MAP_WITH_OVERFLOW
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn create_state(&self) -> Box<dyn AggregateState> {
        Box::new(self.empty_state())
    }

    fn merge_state(
        &self,
        target: &mut Value,
        other: &Value,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        let mut state = self.empty_state();
        for tuple in [&*target, other] {
            match tuple {
                Value::Null => {}
                Value::Tuple(arrays) => {
                    let arrays = arrays
                        .iter()
                        .map(|array| {
                            array
                                .as_list()
                                .ok_or_else(|| malformed(format!("state element {array:?}")))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    state.fold(&arrays)?;
                }
                other => return Err(malformed(format!("state {other:?}"))),
            }
        }
        *target = state.take_result();
        Ok(())
    }
}

#[derive(Debug)]
struct SumMapState {
    value_types: Vec<DataType>,
    entries: BTreeMap<Value, Vec<Value>>,
}

impl SumMapState {
    fn fold(&mut self, arrays: &[&[Value]]) -> Result<(), AggregateError> {
        if arrays.len() != self.value_types.len() + 1 {
            return Err(malformed(format!(
                "argument list ({} arrays, expected {})",
                arrays.len(),
                self.value_types.len() + 1
            )));
        }
        let keys = arrays[0];
        if let Some(values) = arrays[1..].iter().find(|values| values.len() != keys.len()) {
            return Err(malformed(format!(
                "value array of length {} for {} keys",
                values.len(),
                keys.len()
            )));
        }
        let value_types = &self.value_types;
        for (idx, key) in keys.iter().enumerate() {
            let sums = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| value_types.iter().map(Value::default_for).collect());
            for (sum, values) in sums.iter_mut().zip(&arrays[1..]) {
                sum.accumulate(&values[idx])?;
            }
        }
        Ok(())
    }

    fn take_result(&mut self) -> Value {
        let mut keys = Vec::with_capacity(self.entries.len());
        let mut columns = vec![Vec::with_capacity(self.entries.len()); self.value_types.len()];
        for (key, sums) in std::mem::take(&mut self.entries) {
            if sums.iter().all(Value::is_default) {
                continue;
            }
            keys.push(key);
            for (column, sum) in columns.iter_mut().zip(sums) {
                column.push(sum);
            }
        }
        let mut tuple = Vec::with_capacity(columns.len() + 1);
        tuple.push(Value::List(keys));
        tuple.extend(columns.into_iter().map(Value::List));
        Value::Tuple(tuple)
    }
}

impl AggregateState for SumMapState {
    fn add(
        &mut self,
        columns: &[&ArrayRef],
        row: usize,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        let cells = (0..=self.value_types.len())
            .map(|idx| {
                let column = argument(SUM_MAP_WITH_OVERFLOW, columns, idx)?;
                Ok(Value::from_array(column.as_ref(), row)?)
            })
            .collect::<Result<Vec<_>, AggregateError>>()?;
        let arrays = cells
            .iter()
            .map(|cell| {
                cell.as_list()
                    .ok_or_else(|| malformed(format!("array cell {cell:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.fold(&arrays)
    }

    fn insert_result_into(
        &mut self,
        out: &mut ColumnBuffer,
        _arena: &Arena,
    ) -> Result<(), AggregateError> {
        out.push(self.take_result())?;
        Ok(())
    }
}
