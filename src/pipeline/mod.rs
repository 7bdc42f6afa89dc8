//! Chunked processing: chunk iteration, the processing loop and output lifecycle.

mod accumulator;
mod chunks;
mod metrics;
mod processing;

pub use accumulator::{OutputAccumulator, OutputState};
pub use chunks::{Chunk, ChunkIterator, ChunkRange, ChunkRanges};
pub use metrics::{Metrics, MetricsSnapshot};
pub use processing::{ChunkClassifier, ProcessingLoop, RunState, RunSummary};
