use arrow::array::{ArrayRef, RecordBatch};

use crate::{
    aggregate::Arena,
    chunk::postprocess,
    column::{ColumnBuffer, RowSlot},
    definition::ColumnsDefinition,
    error::MergeError,
    logging::merge_log,
    map_merge::merge_map,
};

const ARENA_INITIAL_BYTES: usize = 4096;

/// Output accumulator of the summing merge and owner of the open group.
///
/// Columns are laid out as one per aggregate descriptor, in descriptor order,
/// followed by one per pass-through column.
#[derive(Debug)]
pub(crate) struct SummingMergedData {
    def: ColumnsDefinition,
    columns: Vec<ColumnBuffer>,
    /// Representative row of the open group.
    row: Vec<RowSlot>,
    row_is_zero: bool,
    group_started: bool,
    merged_rows: usize,
    total_merged_rows: usize,
    max_block_size_rows: usize,
    max_block_size_bytes: Option<usize>,
    arena: Arena,
    arena_size: usize,
    arena_recycles: usize,
}

impl SummingMergedData {
    pub(crate) fn new(
        def: ColumnsDefinition,
        max_block_size_rows: usize,
        max_block_size_bytes: Option<usize>,
    ) -> Self {
        let fields = def.schema.fields();
        let columns = def
            .columns_to_aggregate
            .iter()
            .map(|desc| ColumnBuffer::new(desc.output_type().clone()))
            .chain(
                def.column_numbers_not_to_aggregate
                    .iter()
                    .map(|idx| ColumnBuffer::new(fields[*idx].data_type().clone())),
            )
            .collect();
        let row = vec![RowSlot::Empty; fields.len()];
        let arena = if def.allocates_memory_in_arena {
            Arena::with_capacity(ARENA_INITIAL_BYTES)
        } else {
            Arena::new()
        };
        let arena_size = arena.allocated_bytes();
        Self {
            def,
            columns,
            row,
            row_is_zero: false,
            group_started: false,
            merged_rows: 0,
            total_merged_rows: 0,
            max_block_size_rows: max_block_size_rows.max(1),
            max_block_size_bytes,
            arena,
            arena_size,
            arena_recycles: 0,
        }
    }

    pub(crate) fn definition(&self) -> &ColumnsDefinition {
        &self.def
    }

    pub(crate) fn is_group_started(&self) -> bool {
        self.group_started
    }

    pub(crate) fn total_merged_rows(&self) -> usize {
        self.total_merged_rows
    }

    fn set_row(&mut self, columns: &[ArrayRef], row: usize) -> Result<(), MergeError> {
        for (idx, array) in columns.iter().enumerate() {
            self.row[idx] = RowSlot::read(array, row, self.def.columnar[idx]).map_err(|err| {
                MergeError::corrupted(row, idx, &self.def.column_names[idx], err)
            })?;
        }
        Ok(())
    }

    /// Opens a group whose representative row is `row` of `columns`.
    pub(crate) fn start_group(&mut self, columns: &[ArrayRef], row: usize) -> Result<(), MergeError> {
        self.group_started = true;
        self.set_row(columns, row)?;

        for (desc, out) in self
            .def
            .columns_to_aggregate
            .iter_mut()
            .zip(self.columns.iter_mut())
        {
            desc.create_state(out)?;
        }

        if self.def.allocates_memory_in_arena && self.arena.allocated_bytes() > self.arena_size {
            self.arena = Arena::with_capacity(ARENA_INITIAL_BYTES);
            self.arena_size = self.arena.allocated_bytes();
            self.arena_recycles += 1;
            merge_log!(
                log::Level::Trace,
                "arena_recycled",
                "recycles={}",
                self.arena_recycles
            );
        }

        // With map groups a lone row counts as non-zero until a merge proves otherwise.
        self.row_is_zero = self.def.maps_to_sum.is_empty();
        self.add_row_impl(columns, row)
    }

    /// Folds `row` of `columns` into the open group.
    pub(crate) fn add_row(&mut self, columns: &[ArrayRef], row: usize) -> Result<(), MergeError> {
        for idx in &self.def.column_numbers_not_to_aggregate {
            if self.def.is_map_column(*idx) {
                continue;
            }
            self.row[*idx] =
                RowSlot::read(&columns[*idx], row, self.def.columnar[*idx]).map_err(|err| {
                    MergeError::corrupted(row, *idx, &self.def.column_names[*idx], err)
                })?;
        }

        if !self.def.maps_to_sum.is_empty() {
            let mut any_survived = false;
            for desc in &self.def.maps_to_sum {
                any_survived |=
                    merge_map(desc, &mut self.row, columns, row, &self.def.column_names)?;
            }
            if self.def.remove_default_values() {
                self.row_is_zero = !any_survived;
            }
        }

        self.add_row_impl(columns, row)
    }

    fn add_row_impl(&mut self, columns: &[ArrayRef], row: usize) -> Result<(), MergeError> {
        for (desc, out) in self
            .def
            .columns_to_aggregate
            .iter_mut()
            .zip(self.columns.iter_mut())
        {
            desc.add_row(columns, row, out, &self.arena)?;
        }
        Ok(())
    }

    /// Closes the open group, writing one output row unless the group is zero.
    pub(crate) fn finish_group(&mut self) -> Result<(), MergeError> {
        self.group_started = false;

        if self.def.columns_to_aggregate.is_empty() && self.def.maps_to_sum.is_empty() {
            self.row_is_zero = false;
        }
        for (desc, out) in self
            .def
            .columns_to_aggregate
            .iter_mut()
            .zip(self.columns.iter_mut())
        {
            let is_zero = desc.insert_result(out, &self.arena)?;
            self.row_is_zero &= is_zero;
        }

        let aggregated = self.def.columns_to_aggregate.len();
        if self.row_is_zero {
            for out in &mut self.columns[..aggregated] {
                out.pop_back(1);
            }
            return Ok(());
        }

        for (idx, out) in self
            .def
            .column_numbers_not_to_aggregate
            .iter()
            .zip(self.columns[aggregated..].iter_mut())
        {
            out.push_slot(&self.row[*idx])?;
        }
        self.merged_rows += 1;
        self.total_merged_rows += 1;
        Ok(())
    }

    /// Whether the accumulated chunk reached its row or byte cap.
    pub(crate) fn has_enough_rows(&self) -> bool {
        if self.merged_rows >= self.max_block_size_rows {
            return true;
        }
        self.max_block_size_bytes.map_or(false, |limit| {
            self.merged_rows > 0
                && self.columns.iter().map(ColumnBuffer::byte_size).sum::<usize>() >= limit
        })
    }

    /// Drains the accumulated rows into a batch of the merge schema.
    pub(crate) fn pull(&mut self) -> Result<RecordBatch, MergeError> {
        let num_rows = self.merged_rows;
        let arrays = self
            .columns
            .iter_mut()
            .map(ColumnBuffer::finish)
            .collect::<Result<Vec<_>, _>>()?;
        self.merged_rows = 0;
        let batch = postprocess(&self.def, arrays, num_rows)?;
        merge_log!(
            log::Level::Debug,
            "chunk_emitted",
            "rows={} total_rows={}",
            num_rows,
            self.total_merged_rows
        );
        Ok(batch)
    }
}
