//! p(z) classifier: assigns tomographic bins from per-object redshift densities.
//!
//! Unlike the catalogue classifier this stage takes no model; everything it
//! needs is in the densities themselves.

use super::Stage;
use crate::config::{Config, ProcessingConfig, StageConfig};
use crate::data::PdfEnsemble;
use crate::io::{Communicator, InputSource, OutputHandle};
use crate::pipeline::ChunkClassifier;
use anyhow::Result;
use std::ops::Deref;
use std::sync::Arc;

/// A stage over [`PdfEnsemble`] input.
pub struct PzClassifier<C, H> {
    stage: Stage<C, H>,
}

impl<C, H> PzClassifier<C, H>
where
    C: ChunkClassifier<PdfEnsemble>,
    H: OutputHandle,
{
    pub fn new(config: StageConfig, classifier: C, output: H) -> Result<Self> {
        Ok(Self {
            stage: Stage::new(config, classifier, output)?,
        })
    }

    /// Build from a full configuration. Any `stage.model` entry is ignored.
    pub fn from_config(config: &Config, classifier: C, output: H) -> Result<Self> {
        if config.stage.model.is_some() {
            tracing::warn!(
                "{}: p(z) classifiers take no model, ignoring {:?}",
                config.stage.name,
                config.stage.model
            );
        }
        let mut stage_config = config.stage.clone();
        stage_config.model = None;
        Ok(Self {
            stage: Stage::new(stage_config, classifier, output)?
                .with_processing(config.processing.clone()),
        })
    }

    pub fn with_processing(self, processing: ProcessingConfig) -> Self {
        Self {
            stage: self.stage.with_processing(processing),
        }
    }

    pub fn with_communicator(self, comm: Arc<dyn Communicator>) -> Self {
        Self {
            stage: self.stage.with_communicator(comm),
        }
    }

    pub async fn classify<S>(&mut self, input: S) -> Result<&H>
    where
        S: InputSource<Data = PdfEnsemble>,
    {
        self.stage.classify(input).await
    }

    pub fn into_output(self) -> H {
        self.stage.into_output()
    }
}

impl<C, H> Deref for PzClassifier<C, H> {
    type Target = Stage<C, H>;

    fn deref(&self) -> &Stage<C, H> {
        &self.stage
    }
}
