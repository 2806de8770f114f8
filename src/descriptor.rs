//! Per-column aggregate slot whose state lives for exactly one group.

use std::sync::Arc;

use arrow::{array::ArrayRef, datatypes::DataType};

use crate::{
    aggregate::{AggregateError, AggregateFunction, AggregateState, Arena},
    column::ColumnBuffer,
    error::MergeError,
    value::Value,
};

/// How a descriptor folds its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Bound to the configured sum function (scalar or map group).
    Default,
    /// Values combined by the function named in the column metadata.
    SimpleAggregate,
    /// Values are partial states merged with [`AggregateFunction::merge_state`].
    AggregateState,
}

/// One aggregated column, or one fast-path map group, with its bound function.
#[derive(Debug)]
pub struct AggregateDescriptor {
    function: Arc<dyn AggregateFunction>,
    kind: DescriptorKind,
    column_numbers: Vec<usize>,
    column_names: Vec<String>,
    /// Schema type; the tuple of group types for map groups.
    real_type: DataType,
    /// `real_type` without dictionary encoding, when the two differ.
    nested_type: Option<DataType>,
    remove_default_values: bool,
    state: Option<Box<dyn AggregateState>>,
    created: bool,
}

impl AggregateDescriptor {
    pub(crate) fn new(
        function: Arc<dyn AggregateFunction>,
        kind: DescriptorKind,
        columns: Vec<(usize, String)>,
        real_type: DataType,
        nested_type: Option<DataType>,
        remove_default_values: bool,
    ) -> Self {
        let (column_numbers, column_names) = columns.into_iter().unzip();
        Self {
            function,
            kind,
            column_numbers,
            column_names,
            real_type,
            nested_type,
            remove_default_values,
            state: None,
            created: false,
        }
    }

    pub fn function(&self) -> &Arc<dyn AggregateFunction> {
        &self.function
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Schema positions read by the function, in argument order.
    pub fn column_numbers(&self) -> &[usize] {
        &self.column_numbers
    }

    pub fn real_type(&self) -> &DataType {
        &self.real_type
    }

    pub fn nested_type(&self) -> Option<&DataType> {
        self.nested_type.as_ref()
    }

    /// Type of the accumulator column this descriptor writes into.
    pub fn output_type(&self) -> &DataType {
        self.nested_type.as_ref().unwrap_or(&self.real_type)
    }

    /// Whether the result is a tuple holding one array per group column.
    pub fn unpacks_tuple(&self) -> bool {
        self.kind == DescriptorKind::Default && self.column_numbers.len() > 1
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    fn first_name(&self) -> String {
        self.column_names.first().cloned().unwrap_or_default()
    }

    fn not_created(&self) -> MergeError {
        MergeError::StateNotCreated {
            column: self.first_name(),
        }
    }

    /// Opens the state for a new group. Calling it twice is a no-op.
    pub fn create_state(&mut self, out: &mut ColumnBuffer) -> Result<(), MergeError> {
        if self.created {
            return Ok(());
        }
        match self.kind {
            DescriptorKind::AggregateState => out.push(self.function.default_state())?,
            _ => self.state = Some(self.function.create_state()),
        }
        self.created = true;
        Ok(())
    }

    /// Releases the state without writing a result.
    pub fn destroy_state(&mut self) {
        self.state = None;
        self.created = false;
    }

    /// Folds row `row` of `columns` (a full pre-processed chunk) into the open state.
    pub fn add_row(
        &mut self,
        columns: &[ArrayRef],
        row: usize,
        out: &mut ColumnBuffer,
        arena: &Arena,
    ) -> Result<(), MergeError> {
        if !self.created {
            return Err(self.not_created());
        }
        let arguments = self
            .column_numbers
            .iter()
            .zip(&self.column_names)
            .map(|(idx, name)| {
                columns
                    .get(*idx)
                    .ok_or_else(|| MergeError::NoSuchColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match self.kind {
            DescriptorKind::AggregateState => {
                let other = Value::from_array(arguments[0].as_ref(), row).map_err(|err| {
                    MergeError::corrupted(row, self.column_numbers[0], &self.column_names[0], err)
                })?;
                let target = out.last_mut().ok_or_else(|| self.not_created())?;
                self.function.merge_state(target, &other, arena)?;
            }
            _ => {
                let Some(state) = self.state.as_mut() else {
                    return Err(MergeError::StateNotCreated {
                        column: self.column_names.first().cloned().unwrap_or_default(),
                    });
                };
                state.add(&arguments, row, arena).map_err(|err| match err {
                    AggregateError::Value(source) => MergeError::corrupted(
                        row,
                        self.column_numbers[0],
                        &self.column_names[0],
                        source,
                    ),
                    other => other.into(),
                })?;
            }
        }
        Ok(())
    }

    /// Writes the group result into `out` and closes the state.
    ///
    /// Returns true when this descriptor allows the row to be elided.
    pub fn insert_result(
        &mut self,
        out: &mut ColumnBuffer,
        arena: &Arena,
    ) -> Result<bool, MergeError> {
        if !self.created {
            return Err(self.not_created());
        }
        let state = self.state.take();
        self.destroy_state();
        if self.kind == DescriptorKind::AggregateState {
            return Ok(false);
        }
        let Some(mut state) = state else {
            return Err(self.not_created());
        };
        state.insert_result_into(out, arena)?;

        if !self.remove_default_values || self.kind != DescriptorKind::Default {
            return Ok(false);
        }
        let last = out.len().saturating_sub(1);
        if self.unpacks_tuple() {
            // Map group: zero once no key survived.
            let keys_empty = match out.value_at(last)? {
                Value::Tuple(arrays) => arrays
                    .first()
                    .and_then(Value::as_list)
                    .map_or(false, |keys| keys.is_empty()),
                _ => false,
            };
            return Ok(keys_empty);
        }
        Ok(out.is_default_at(last))
    }
}
