//! Catalogue classifier: assigns tomographic bins from tabular photometry.

use super::Stage;
use crate::config::{Config, ProcessingConfig, StageConfig};
use crate::data::Table;
use crate::io::{Communicator, InputSource, JsonLinesSource, OutputHandle};
use crate::model::{Model, ModelRef};
use crate::pipeline::ChunkClassifier;
use anyhow::Result;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

/// A stage over [`Table`] input with an optional pre-trained model.
pub struct CatClassifier<C, H> {
    stage: Stage<C, H>,
}

impl<C, H> CatClassifier<C, H>
where
    C: ChunkClassifier<Table>,
    H: OutputHandle,
{
    pub fn new(config: StageConfig, classifier: C, output: H) -> Result<Self> {
        Ok(Self {
            stage: Stage::new(config, classifier, output)?,
        })
    }

    /// Build from a full configuration; `stage.model` is resolved here.
    pub fn from_config(config: &Config, classifier: C, output: H) -> Result<Self> {
        Ok(Self {
            stage: Stage::from_config(config, classifier, output)?,
        })
    }

    pub fn with_model(self, model_ref: impl Into<ModelRef>) -> Self {
        Self {
            stage: self.stage.with_model(model_ref.into()),
        }
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

    pub fn model(&self) -> Option<&Model> {
        self.stage.model()
    }

    /// Classify every row of `input` and return the output handle.
    pub async fn classify<S>(&mut self, input: S) -> Result<&H>
    where
        S: InputSource<Data = Table>,
    {
        self.stage.classify(input).await
    }

    /// Classify a JSON-lines catalogue, reading rows from the configured group.
    pub async fn classify_file(&mut self, path: impl AsRef<Path>) -> Result<&H> {
        let source = JsonLinesSource::open(path, self.stage.config().groupname.clone()).await?;
        self.stage.classify(source).await
    }

    pub fn into_output(self) -> H {
        self.stage.into_output()
    }
}

impl<C, H> Deref for CatClassifier<C, H> {
    type Target = Stage<C, H>;

    fn deref(&self) -> &Stage<C, H> {
        &self.stage
    }
}
