//! The stage shared by both classifier front-ends.

use crate::config::{Config, ProcessingConfig, StageConfig};
use crate::error::StageError;
use crate::io::{Communicator, InputSource, OutputHandle};
use crate::model::{resolve_model, Model, ModelRef};
use crate::pipeline::{
    ChunkClassifier, Metrics, MetricsSnapshot, OutputAccumulator, OutputState, ProcessingLoop,
    RunState, RunSummary,
};
use anyhow::Result;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// What was bound as the stage's input, kept for provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub description: String,
    pub total_len: usize,
}

/// A configured classification unit: one classifier, one output, one run.
pub struct Stage<C, H> {
    config: StageConfig,
    processing_config: ProcessingConfig,
    chunk_size: NonZeroUsize,
    model: Option<Model>,
    classifier: C,
    output: OutputAccumulator<H>,
    processing: ProcessingLoop,
    metrics: Arc<Metrics>,
    input: Option<InputBinding>,
    summary: Option<RunSummary>,
}

impl<C, H: OutputHandle> Stage<C, H> {
    /// Build a stage. Fails on an invalid configuration.
    pub fn new(config: StageConfig, classifier: C, output: H) -> Result<Self> {
        config.validate()?;
        let chunk_size = config.chunk_size()?;
        let metrics = Metrics::new();

        Ok(Self {
            processing: ProcessingLoop::new(chunk_size, metrics.clone()),
            output: OutputAccumulator::new(output, metrics.clone()),
            config,
            processing_config: ProcessingConfig::default(),
            chunk_size,
            model: None,
            classifier,
            metrics,
            input: None,
            summary: None,
        })
    }

    /// Build a stage from a full configuration, including the model named in it.
    pub fn from_config(config: &Config, classifier: C, output: H) -> Result<Self> {
        let model_ref = ModelRef::from(config.stage.model.clone());
        Ok(Self::new(config.stage.clone(), classifier, output)?
            .with_processing(config.processing.clone())
            .with_model(model_ref))
    }

    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing_config = processing;
        self
    }

    /// Pass a communicator through to the output handle.
    pub fn with_communicator(mut self, comm: Arc<dyn Communicator>) -> Self {
        self.output.set_communicator(Some(comm));
        self
    }

    /// Attach a model, replacing any previous one.
    ///
    /// Path references are recorded in the configuration for provenance, as are
    /// handles that know their path.
    pub fn with_model(mut self, model_ref: ModelRef) -> Self {
        let resolved = resolve_model(model_ref);
        match &resolved.model {
            Some(model) => tracing::debug!("{}: attached model {:?}", self.config.name, model),
            None => tracing::debug!("{}: running without a model", self.config.name),
        }
        if resolved.provenance.is_some() {
            self.config.model = resolved.provenance;
        }
        self.model = resolved.model;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// The input bound by `classify`, if it has been called.
    pub fn input(&self) -> Option<&InputBinding> {
        self.input.as_ref()
    }

    pub fn run_state(&self) -> RunState {
        self.processing.state()
    }

    pub fn output_state(&self) -> OutputState {
        self.output.state()
    }

    pub fn output(&self) -> &H {
        self.output.handle()
    }

    pub fn into_output(self) -> H {
        self.output.into_handle()
    }

    /// Summary of the completed run.
    pub fn summary(&self) -> Option<RunSummary> {
        self.summary
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Bind `input`, run the chunk loop over it, and return the output handle.
    pub async fn classify<S>(&mut self, mut input: S) -> Result<&H>
    where
        S: InputSource,
        C: ChunkClassifier<S::Data>,
    {
        if self.processing.state() != RunState::NotStarted {
            return Err(StageError::AlreadyRun {
                stage: self.config.name.clone(),
            }
            .into());
        }

        self.input = Some(InputBinding {
            description: input.describe(),
            total_len: input.total_len(),
        });
        tracing::info!("{}: input bound to {}", self.config.name, input.describe());

        if let Some(model) = &self.model {
            self.classifier.attach_model(model)?;
        }

        let summary = self
            .processing
            .run(&mut input, &mut self.classifier, &mut self.output)
            .await?;
        self.summary = Some(summary);

        if self.processing_config.enable_metrics {
            let snapshot = self.metrics.snapshot();
            tracing::info!("{}: {}", self.config.name, snapshot);
            if let Some(ref path) = self.processing_config.metrics_output_path {
                if let Err(e) = snapshot.save_to_file(path) {
                    tracing::warn!("Failed to save metrics to {}: {}", path, e);
                }
            }
        }

        Ok(self.output.handle())
    }
}
