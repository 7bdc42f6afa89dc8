//! Two-phase output lifecycle: allocate on the first chunk, write per chunk, seal once.

use crate::data::ClassAssignment;
use crate::error::StageError;
use crate::io::{Communicator, OutputHandle};
use crate::pipeline::Metrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

/// Where the output handle is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Nothing allocated yet.
    Unallocated,
    /// Allocated and accepting chunk writes.
    Writing,
    /// Sealed. No further writes.
    Finalized,
}

/// Owns the output handle for one run and drives it through its lifecycle.
pub struct OutputAccumulator<H> {
    handle: H,
    state: OutputState,
    total_len: usize,
    comm: Option<Arc<dyn Communicator>>,
    metrics: Arc<Metrics>,
    chunks_written: usize,
}

impl<H: OutputHandle> OutputAccumulator<H> {
    pub fn new(handle: H, metrics: Arc<Metrics>) -> Self {
        Self {
            handle,
            state: OutputState::Unallocated,
            total_len: 0,
            comm: None,
            metrics,
            chunks_written: 0,
        }
    }

    /// Attach the communicator handed to the output on allocation.
    pub fn set_communicator(&mut self, comm: Option<Arc<dyn Communicator>>) {
        self.comm = comm;
    }

    /// Length the output is allocated with on the first chunk.
    pub fn set_total_len(&mut self, total_len: usize) {
        self.total_len = total_len;
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn into_handle(self) -> H {
        self.handle
    }

    /// Write one chunk's assignments to rows `[start, end)`.
    pub async fn record(
        &mut self,
        assignment: ClassAssignment,
        start: usize,
        end: usize,
        is_first: bool,
    ) -> Result<()> {
        if start > end {
            return Err(StageError::OutputLifecycle(format!(
                "invalid chunk range [{}, {})",
                start, end
            ))
            .into());
        }
        if assignment.len() != end - start {
            return Err(StageError::ChunkLength {
                start,
                end,
                got: assignment.len(),
            }
            .into());
        }

        match (self.state, is_first) {
            (OutputState::Unallocated, true) => {
                self.handle
                    .initialize_write(self.total_len, self.comm.as_ref())
                    .await?;
                self.state = OutputState::Writing;
                tracing::info!("Output allocated for {} rows", self.total_len);
            }
            (OutputState::Writing, false) => {}
            (OutputState::Unallocated, false) => {
                return Err(StageError::OutputLifecycle(format!(
                    "chunk [{}, {}) recorded before the output was allocated",
                    start, end
                ))
                .into());
            }
            (OutputState::Writing, true) => {
                return Err(StageError::OutputLifecycle(
                    "output allocated more than once".to_string(),
                )
                .into());
            }
            (OutputState::Finalized, _) => {
                return Err(StageError::OutputLifecycle(format!(
                    "chunk [{}, {}) recorded after finalize",
                    start, end
                ))
                .into());
            }
        }

        let write_start = Instant::now();
        self.handle.set_data(assignment, true)?;
        self.handle.write_chunk(start, end).await?;
        self.metrics.add_write_time(write_start.elapsed());
        self.metrics.add_rows_written((end - start) as u64);
        self.chunks_written += 1;
        Ok(())
    }

    /// Seal the output.
    ///
    /// When no chunk was ever recorded the handle was never allocated, so it is
    /// not finalized either; the accumulator still moves to `Finalized`.
    pub async fn finalize(&mut self) -> Result<()> {
        match self.state {
            OutputState::Unallocated => {
                tracing::warn!("No chunks were written; output was never allocated");
            }
            OutputState::Writing => {
                self.handle.finalize_write().await?;
                tracing::info!("Output finalized after {} chunks", self.chunks_written);
            }
            OutputState::Finalized => {
                return Err(
                    StageError::OutputLifecycle("output finalized twice".to_string()).into(),
                );
            }
        }
        self.state = OutputState::Finalized;
        Ok(())
    }
}
