//! Configuration for classification stages.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Main configuration for a classification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Stage configuration
    #[serde(default)]
    pub stage: StageConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Settings owned by a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, used in logs and default output naming
    #[serde(default = "default_stage_name")]
    pub name: String,

    /// Maximum rows per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Key of the nested group holding the input columns (structured input only)
    #[serde(default)]
    pub groupname: Option<String>,

    /// Model reference; a path, or "None". Set to the model's path when a
    /// path-backed model is attached.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: default_stage_name(),
            chunk_size: default_chunk_size(),
            groupname: None,
            model: None,
        }
    }
}

impl StageConfig {
    /// A default configuration with the given stage name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Chunk size as a non-zero count.
    pub fn chunk_size(&self) -> anyhow::Result<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size)
            .ok_or_else(|| anyhow::anyhow!("chunk_size must be > 0"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Stage name must not be empty");
        }
        self.chunk_size()?;
        Ok(())
    }
}

/// Where output files go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for output files named after the stage
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Explicit output path, overriding `output_dir`
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            path: None,
        }
    }
}

impl OutputConfig {
    /// Output file for a stage: the explicit path, or `<output_dir>/output_<stage>.bin`.
    pub fn resolve_path(&self, stage_name: &str) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.output_dir).join(format!("output_{}.bin", stage_name)),
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Log a metrics summary at the end of each run
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.stage.validate()?;
        if self.output.path.is_none() && self.output.output_dir.trim().is_empty() {
            anyhow::bail!("Must specify output_dir or path");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_stage_name() -> String { "classifier".to_string() }
fn default_chunk_size() -> usize { 10_000 }
fn default_output_dir() -> String { ".".to_string() }
fn default_true() -> bool { true }
