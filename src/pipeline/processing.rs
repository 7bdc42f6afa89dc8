//! The chunk loop: read, classify, record, release, repeat; then finalize once.

use crate::data::ClassAssignment;
use crate::error::StageError;
use crate::io::{InputSource, OutputHandle};
use crate::model::Model;
use crate::pipeline::{Chunk, Metrics, OutputAccumulator};
use anyhow::Result;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

/// A per-chunk classification algorithm over payloads of type `D`.
///
/// Implementations must override [`process_chunk`](Self::process_chunk); the
/// provided body fails with [`StageError::NotImplemented`].
pub trait ChunkClassifier<D> {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "ChunkClassifier"
    }

    /// Receive the stage's model before the first chunk. Only called when a model is attached.
    fn attach_model(&mut self, _model: &Model) -> Result<()> {
        Ok(())
    }

    /// Assign a class to every row of `chunk`, in row order.
    fn process_chunk(&mut self, _chunk: &Chunk<D>, _is_first: bool) -> Result<ClassAssignment> {
        Err(StageError::NotImplemented {
            stage: self.name().to_string(),
            hook: "process_chunk",
        }
        .into())
    }

    /// Called once after the last chunk, before the output is sealed.
    fn finalize_run(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Progress of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Finalizing,
    Done,
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: usize,
    pub rows: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rows in {} chunks", self.rows, self.chunks)
    }
}

/// Drives one pass over an input source. Single use.
pub struct ProcessingLoop {
    chunk_size: NonZeroUsize,
    state: RunState,
    metrics: Arc<Metrics>,
}

impl ProcessingLoop {
    pub fn new(chunk_size: NonZeroUsize, metrics: Arc<Metrics>) -> Self {
        Self {
            chunk_size,
            state: RunState::NotStarted,
            metrics,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Classify every chunk of `source` and write the results through `output`.
    ///
    /// Errors from the source, the classifier or the output propagate as-is. A
    /// failed run stays in `Running` and its output is left unfinalized.
    pub async fn run<S, C, H>(
        &mut self,
        source: &mut S,
        classifier: &mut C,
        output: &mut OutputAccumulator<H>,
    ) -> Result<RunSummary>
    where
        S: InputSource,
        C: ChunkClassifier<S::Data> + ?Sized,
        H: OutputHandle,
    {
        if self.state != RunState::NotStarted {
            return Err(StageError::AlreadyRun {
                stage: classifier.name().to_string(),
            }
            .into());
        }
        self.state = RunState::Running;

        let total_len = source.total_len();
        output.set_total_len(total_len);
        tracing::info!(
            "{}: classifying {} rows in chunks of {}",
            classifier.name(),
            total_len,
            self.chunk_size
        );

        let mut chunks = source.iter_chunks(self.chunk_size);
        let mut summary = RunSummary::default();
        let mut is_first = true;

        loop {
            let read_start = Instant::now();
            let Some(chunk) = chunks.next_chunk().await? else {
                break;
            };
            self.metrics.add_read_time(read_start.elapsed());
            self.metrics.add_rows_read(chunk.len() as u64);

            let classify_start = Instant::now();
            let assignment = classifier
                .process_chunk(&chunk, is_first)
                .map_err(|e| {
                    self.metrics.add_failure();
                    e
                })?;
            self.metrics.add_classify_time(classify_start.elapsed());

            output
                .record(assignment, chunk.start, chunk.end, is_first)
                .await
                .map_err(|e| {
                    self.metrics.add_failure();
                    e
                })?;
            is_first = false;

            summary.chunks += 1;
            summary.rows += chunk.len();
            self.metrics.add_chunk_processed();
            tracing::debug!(
                "{}: chunk [{}, {}) done",
                classifier.name(),
                chunk.start,
                chunk.end
            );

            // Chunk payload is released before the next read.
            drop(chunk);
        }

        if summary.chunks == 0 {
            tracing::warn!("{}: input is empty", classifier.name());
        }

        self.state = RunState::Finalizing;
        classifier.finalize_run()?;
        output.finalize().await?;
        self.state = RunState::Done;

        tracing::info!("{}: {}", classifier.name(), summary);
        Ok(summary)
    }
}
