//! Tomographic bin classification
//!
//! Streams a catalogue through a pluggable classification algorithm in
//! fixed-size chunks and writes one integer class id per object.
//!
//! # Architecture
//!
//! - **Data**: tabular catalogues, p(z) ensembles and class assignments
//! - **Model**: lazy resolution of pre-trained models from paths or objects
//! - **I/O**: input sources, output handles and the class-id file format
//! - **Pipeline**: chunk iteration, the processing loop and output lifecycle
//! - **Classifier**: the catalogue and p(z) stages built on the pipeline
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use tomo_classify::{
//!     CatClassifier, Chunk, ChunkClassifier, ClassAssignment, ClassFileWriter, Config, Table,
//! };
//!
//! struct BrightFaint;
//!
//! impl ChunkClassifier<Table> for BrightFaint {
//!     fn process_chunk(
//!         &mut self,
//!         chunk: &Chunk<Table>,
//!         _is_first: bool,
//!     ) -> anyhow::Result<ClassAssignment> {
//!         let mags = chunk
//!             .data
//!             .column("mag_i")
//!             .ok_or_else(|| anyhow::anyhow!("no mag_i column"))?;
//!         Ok(mags.iter().map(|&m| i32::from(m >= 22.0)).collect::<Vec<_>>().into())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(Path::new("config.yaml"))?;
//!     let path = config.output.resolve_path(&config.stage.name);
//!     let output = ClassFileWriter::new(path, config.stage.name.clone());
//!     let mut stage = CatClassifier::from_config(&config, BrightFaint, output)?;
//!     stage.classify_file("catalogue.jsonl").await?;
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipeline;

pub use classifier::{CatClassifier, InputBinding, PzClassifier, Stage};
pub use config::{Config, OutputConfig, ProcessingConfig, StageConfig};
pub use data::{ClassAssignment, PdfEnsemble, RowSlice, Table, UNASSIGNED};
pub use error::StageError;
pub use io::{
    read_class_file, ClassFileWriter, Communicator, InputSource, JsonLinesSource,
    LocalCommunicator, MemoryOutput, MemorySource, OutputHandle,
};
pub use model::{resolve_model, JsonModelReader, Model, ModelHandle, ModelReader, ModelRef};
pub use pipeline::{
    Chunk, ChunkClassifier, ChunkIterator, ChunkRange, ChunkRanges, Metrics, MetricsSnapshot,
    OutputAccumulator, OutputState, ProcessingLoop, RunState, RunSummary,
};

use anyhow::Result;

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
