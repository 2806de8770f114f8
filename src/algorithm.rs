//! Heap-driven k-way merge that folds rows with equal keys into one.
//!
//! The driver never blocks: whenever a cursor runs dry it returns
//! [`MergeStatus::NeedInput`] and waits for the caller to hand over the next
//! chunk of that input through [`SummingSortedAlgorithm::consume`].

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
};

use arrow::{
    array::{ArrayRef, RecordBatch},
    datatypes::SchemaRef,
    row::{OwnedRow, RowConverter, Rows, SortField},
};

use crate::{
    chunk::preprocess,
    definition::{define_columns, ColumnsDefinition},
    error::MergeError,
    logging::merge_log,
    merged::SummingMergedData,
    option::{SortColumn, SummingMergeOptions},
};

/// One chunk handed to the driver for a single input.
#[derive(Debug, Clone, Default)]
pub struct MergeInput {
    /// `None` marks the input as exhausted.
    pub batch: Option<RecordBatch>,
    /// The last row is withheld from the merge.
    pub skip_last_row: bool,
}

impl MergeInput {
    pub fn new(batch: RecordBatch) -> Self {
        MergeInput {
            batch: Some(batch),
            skip_last_row: false,
        }
    }

    /// An input with no more chunks.
    pub fn exhausted() -> Self {
        MergeInput::default()
    }

    pub fn with_skip_last_row(self, skip_last_row: bool) -> Self {
        MergeInput {
            skip_last_row,
            ..self
        }
    }
}

/// Outcome of one [`SummingSortedAlgorithm::merge`] step.
#[derive(Debug)]
pub enum MergeStatus {
    /// Input `i` must be fed through `consume` before merging resumes.
    NeedInput(usize),
    /// An output chunk reached its size cap.
    Chunk(RecordBatch),
    /// Every input is exhausted; the batch holds the remaining rows.
    Finished(RecordBatch),
}

struct HeapEntry {
    key: OwnedRow,
    source_idx: usize,
    row_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source_idx == other.source_idx
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on the key, lower input first on ties.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source_idx.cmp(&self.source_idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct SourceCursor {
    columns: Vec<ArrayRef>,
    keys: Rows,
    /// Rows past this index are not merged.
    end: usize,
}

/// Summing merge of N key-sorted inputs.
pub struct SummingSortedAlgorithm {
    merged: SummingMergedData,
    converter: RowConverter,
    sources: Vec<Option<SourceCursor>>,
    heap: BinaryHeap<HeapEntry>,
    /// Sources to ask for before the heap may be popped.
    requests: VecDeque<usize>,
    /// Source asked for by the last `NeedInput`.
    pending: Option<usize>,
    last_key: Option<OwnedRow>,
    initialized: bool,
}

impl std::fmt::Debug for SummingSortedAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummingSortedAlgorithm")
            .field("num_inputs", &self.sources.len())
            .field("heap_len", &self.heap.len())
            .field("pending", &self.pending)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl SummingSortedAlgorithm {
    pub fn new(
        schema: SchemaRef,
        num_inputs: usize,
        sort_description: &[SortColumn],
        options: SummingMergeOptions,
    ) -> Result<Self, MergeError> {
        let def = define_columns(&schema, sort_description, &options)?;
        let converter = RowConverter::new(
            def.sort_columns
                .iter()
                .map(|(idx, sort)| {
                    SortField::new_with_options(schema.field(*idx).data_type().clone(), *sort)
                })
                .collect(),
        )?;
        let merged = SummingMergedData::new(
            def,
            options.max_block_size_rows,
            options.max_block_size_bytes,
        );
        Ok(Self {
            merged,
            converter,
            sources: (0..num_inputs).map(|_| None).collect(),
            heap: BinaryHeap::with_capacity(num_inputs),
            requests: VecDeque::new(),
            pending: None,
            last_key: None,
            initialized: false,
        })
    }

    pub fn definition(&self) -> &ColumnsDefinition {
        self.merged.definition()
    }

    pub fn num_inputs(&self) -> usize {
        self.sources.len()
    }

    /// Rows emitted so far, across all chunks.
    pub fn total_merged_rows(&self) -> usize {
        self.merged.total_merged_rows()
    }

    /// Hands over the first chunk of each input, by position.
    ///
    /// Inputs without an entry are requested through `NeedInput`.
    pub fn initialize(&mut self, inputs: Vec<MergeInput>) -> Result<(), MergeError> {
        if inputs.len() > self.sources.len() {
            return Err(MergeError::UnknownSource(self.sources.len()));
        }
        let provided = inputs.len();
        for (source_idx, input) in inputs.into_iter().enumerate() {
            self.set_input(source_idx, input)?;
        }
        self.requests.extend(provided..self.sources.len());
        self.initialized = true;
        Ok(())
    }

    /// Answers the last `NeedInput(source_idx)`.
    pub fn consume(&mut self, source_idx: usize, input: MergeInput) -> Result<(), MergeError> {
        if !self.initialized {
            return Err(MergeError::NotInitialized);
        }
        if source_idx >= self.sources.len() {
            return Err(MergeError::UnknownSource(source_idx));
        }
        if self.pending != Some(source_idx) {
            return Err(MergeError::UnexpectedInput(source_idx));
        }
        self.pending = None;
        self.set_input(source_idx, input)
    }

    fn set_input(&mut self, source_idx: usize, input: MergeInput) -> Result<(), MergeError> {
        let Some(batch) = input.batch else {
            merge_log!(
                log::Level::Trace,
                "source_exhausted",
                "source={}",
                source_idx
            );
            self.sources[source_idx] = None;
            return Ok(());
        };

        let end = batch
            .num_rows()
            .saturating_sub(usize::from(input.skip_last_row));
        if end == 0 {
            self.requests.push_back(source_idx);
            return Ok(());
        }

        let def = self.merged.definition();
        let columns = preprocess(def, source_idx, &batch)?;
        let sort_arrays = def
            .sort_columns
            .iter()
            .map(|(idx, _)| columns[*idx].clone())
            .collect::<Vec<_>>();
        let keys = self.converter.convert_columns(&sort_arrays)?;
        self.heap.push(HeapEntry {
            key: keys.row(0).owned(),
            source_idx,
            row_idx: 0,
        });
        self.sources[source_idx] = Some(SourceCursor { columns, keys, end });
        Ok(())
    }

    /// Runs the merge until it needs input, fills a chunk, or finishes.
    pub fn merge(&mut self) -> Result<MergeStatus, MergeError> {
        if !self.initialized {
            return Err(MergeError::NotInitialized);
        }
        if let Some(source_idx) = self.pending {
            return Err(MergeError::InputNotConsumed(source_idx));
        }
        if let Some(source_idx) = self.requests.pop_front() {
            self.pending = Some(source_idx);
            return Ok(MergeStatus::NeedInput(source_idx));
        }

        while let Some(top) = self.heap.peek() {
            let (source_idx, row_idx) = (top.source_idx, top.row_idx);
            let Some(cursor) = self.sources[source_idx].as_ref() else {
                return Err(MergeError::UnknownSource(source_idx));
            };

            if self.last_key.as_ref() != Some(&top.key) {
                if self.merged.is_group_started() {
                    self.merged.finish_group()?;
                }
                if self.merged.has_enough_rows() {
                    // The row stays on the heap and opens the next group.
                    self.last_key = None;
                    return Ok(MergeStatus::Chunk(self.merged.pull()?));
                }
                self.last_key = Some(top.key.clone());
                self.merged.start_group(&cursor.columns, row_idx)?;
            } else {
                self.merged.add_row(&cursor.columns, row_idx)?;
            }

            self.heap.pop();
            let next = row_idx + 1;
            if next < cursor.end {
                let key = cursor.keys.row(next).owned();
                self.heap.push(HeapEntry {
                    key,
                    source_idx,
                    row_idx: next,
                });
            } else {
                self.sources[source_idx] = None;
                self.pending = Some(source_idx);
                return Ok(MergeStatus::NeedInput(source_idx));
            }
        }

        if self.merged.is_group_started() {
            self.merged.finish_group()?;
        }
        self.last_key = None;
        Ok(MergeStatus::Finished(self.merged.pull()?))
    }
}
