//! Drivers that pump inputs into [`SummingSortedAlgorithm`].

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use futures_core::Stream;
use futures_util::{
    stream::{self, BoxStream},
    StreamExt,
};

use crate::{
    algorithm::{MergeInput, MergeStatus, SummingSortedAlgorithm},
    error::MergeError,
    option::{SortColumn, SummingMergeOptions},
};

/// Key-sorted input run fed to [`SummingMerge`].
pub type BatchStream = BoxStream<'static, Result<RecordBatch, MergeError>>;

/// Async summing merge over one stream per input.
///
/// Only the input named by the driver's `NeedInput` is polled, so an input
/// is never read ahead of the merge.
pub struct SummingMerge {
    algorithm: SummingSortedAlgorithm,
    sources: Vec<BatchStream>,
    started: bool,
    finished: bool,
}

impl std::fmt::Debug for SummingMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummingMerge")
            .field("algorithm", &self.algorithm)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .finish()
    }
}

async fn next_input(source: &mut BatchStream) -> Result<MergeInput, MergeError> {
    match source.next().await {
        Some(batch) => Ok(MergeInput::new(batch?)),
        None => Ok(MergeInput::exhausted()),
    }
}

impl SummingMerge {
    pub fn new(
        schema: SchemaRef,
        sort_description: &[SortColumn],
        options: SummingMergeOptions,
        sources: Vec<BatchStream>,
    ) -> Result<Self, MergeError> {
        let algorithm =
            SummingSortedAlgorithm::new(schema, sources.len(), sort_description, options)?;
        Ok(Self {
            algorithm,
            sources,
            started: false,
            finished: false,
        })
    }

    pub fn algorithm(&self) -> &SummingSortedAlgorithm {
        &self.algorithm
    }

    /// Next non-empty output chunk, `None` once every input is drained.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>, MergeError> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            let mut inputs = Vec::with_capacity(self.sources.len());
            for source in &mut self.sources {
                inputs.push(next_input(source).await?);
            }
            self.algorithm.initialize(inputs)?;
            self.started = true;
        }

        loop {
            match self.algorithm.merge()? {
                MergeStatus::NeedInput(source_idx) => {
                    let source = self
                        .sources
                        .get_mut(source_idx)
                        .ok_or(MergeError::UnknownSource(source_idx))?;
                    let input = next_input(source).await?;
                    self.algorithm.consume(source_idx, input)?;
                }
                MergeStatus::Chunk(batch) => return Ok(Some(batch)),
                MergeStatus::Finished(batch) => {
                    self.finished = true;
                    return Ok((batch.num_rows() > 0).then_some(batch));
                }
            }
        }
    }

    /// Output chunks as a stream; it ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<RecordBatch, MergeError>> + Send {
        stream::try_unfold(self, |mut merge| async move {
            let batch = merge.next_batch().await?;
            Ok::<_, MergeError>(batch.map(|batch| (batch, merge)))
        })
    }
}

/// Merges in-memory runs to completion, returning the non-empty output chunks.
pub fn merge_sorted_runs<I>(
    schema: SchemaRef,
    sort_description: &[SortColumn],
    options: SummingMergeOptions,
    inputs: Vec<I>,
) -> Result<Vec<RecordBatch>, MergeError>
where
    I: IntoIterator<Item = MergeInput>,
{
    let mut inputs = inputs
        .into_iter()
        .map(IntoIterator::into_iter)
        .collect::<Vec<_>>();
    let mut algorithm =
        SummingSortedAlgorithm::new(schema, inputs.len(), sort_description, options)?;
    algorithm.initialize(
        inputs
            .iter_mut()
            .map(|input| input.next().unwrap_or_default())
            .collect(),
    )?;

    let mut output = Vec::new();
    loop {
        match algorithm.merge()? {
            MergeStatus::NeedInput(source_idx) => {
                let input = inputs
                    .get_mut(source_idx)
                    .ok_or(MergeError::UnknownSource(source_idx))?
                    .next()
                    .unwrap_or_default();
                algorithm.consume(source_idx, input)?;
            }
            MergeStatus::Chunk(batch) => output.push(batch),
            MergeStatus::Finished(batch) => {
                if batch.num_rows() > 0 {
                    output.push(batch);
                }
                return Ok(output);
            }
        }
    }
}
