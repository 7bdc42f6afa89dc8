//! Model references and their resolution into a stage's model slot.
//!
//! A model may arrive as an in-memory object, a path to be read later, or a
//! handle that already wraps loaded data (and may remember where it came from).
//! Resolution never inspects model content; that is the classifier's job.

use crate::error::StageError;
use anyhow::Result;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Type-erased trained model.
pub type ModelObject = Arc<dyn Any + Send + Sync>;

/// Literal marker accepted in configuration to mean "no model".
pub const NO_MODEL: &str = "None";

/// Loads a model object from a path.
pub trait ModelReader {
    fn read_model(&self, path: &Path) -> Result<ModelObject>;
}

/// Reads a model file as a `serde_json::Value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelReader;

impl ModelReader for JsonModelReader {
    fn read_model(&self, path: &Path) -> Result<ModelObject> {
        let contents = std::fs::read_to_string(path).map_err(|e| StageError::ModelResolution {
            reference: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        Ok(Arc::new(value))
    }
}

/// Already-loaded model data, optionally tagged with the path it was read from.
#[derive(Clone)]
pub struct ModelHandle {
    path: Option<PathBuf>,
    data: ModelObject,
}

impl ModelHandle {
    pub fn new(data: ModelObject) -> Self {
        Self { path: None, data }
    }

    pub fn with_path(data: ModelObject, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            data,
        }
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").field("path", &self.path).finish_non_exhaustive()
    }
}

/// What a caller may pass as a model.
#[derive(Clone, Default)]
pub enum ModelRef {
    #[default]
    None,
    Path(String),
    Handle(ModelHandle),
    Object(ModelObject),
}

impl ModelRef {
    /// Wrap any value as an in-memory model.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }
}

impl From<&str> for ModelRef {
    fn from(s: &str) -> Self {
        if s == NO_MODEL {
            Self::None
        } else {
            Self::Path(s.to_string())
        }
    }
}

impl From<Option<String>> for ModelRef {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::None, |s| Self::from(s.as_str()))
    }
}

impl From<ModelHandle> for ModelRef {
    fn from(handle: ModelHandle) -> Self {
        Self::Handle(handle)
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
            Self::Object(_) => write!(f, "Object(..)"),
        }
    }
}

/// A model read lazily from disk on first use.
pub struct PathModel {
    path: PathBuf,
    loaded: OnceCell<ModelObject>,
}

impl PathModel {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }
}

/// The canonical model attached to a stage.
pub enum Model {
    InMemory(ModelObject),
    PathBacked(PathModel),
}

impl Model {
    /// Path the model was (or will be) read from, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::InMemory(_) => None,
            Self::PathBacked(m) => Some(m.path()),
        }
    }

    pub fn is_path_backed(&self) -> bool {
        matches!(self, Self::PathBacked(_))
    }

    /// The model object, reading it through `reader` on first access when path-backed.
    pub fn load<R: ModelReader + ?Sized>(&self, reader: &R) -> Result<ModelObject> {
        match self {
            Self::InMemory(obj) => Ok(obj.clone()),
            Self::PathBacked(m) => {
                let obj = m.loaded.get_or_try_init(|| {
                    tracing::info!("Loading model from {}", m.path.display());
                    reader.read_model(&m.path)
                })?;
                Ok(obj.clone())
            }
        }
    }

    /// Borrow an in-memory model as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::InMemory(obj) => obj.downcast_ref::<T>(),
            Self::PathBacked(m) => m.loaded.get().and_then(|obj| obj.downcast_ref::<T>()),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory(_) => write!(f, "Model::InMemory(..)"),
            Self::PathBacked(m) => f
                .debug_struct("Model::PathBacked")
                .field("path", &m.path)
                .field("loaded", &m.is_loaded())
                .finish(),
        }
    }
}

/// Result of resolving a [`ModelRef`].
#[derive(Debug, Default)]
pub struct ResolvedModel {
    pub model: Option<Model>,
    /// Path to record in the stage configuration for provenance.
    pub provenance: Option<String>,
}

/// Turn a model reference into the stage's model.
pub fn resolve_model(model_ref: ModelRef) -> ResolvedModel {
    match model_ref {
        ModelRef::None => ResolvedModel::default(),
        ModelRef::Path(path) => ResolvedModel {
            model: Some(Model::PathBacked(PathModel {
                path: PathBuf::from(&path),
                loaded: OnceCell::new(),
            })),
            provenance: Some(path),
        },
        ModelRef::Handle(handle) => ResolvedModel {
            provenance: handle.path.as_ref().map(|p| p.display().to_string()),
            model: Some(Model::InMemory(handle.data)),
        },
        ModelRef::Object(obj) => ResolvedModel {
            model: Some(Model::InMemory(obj)),
            provenance: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_none_and_marker() {
        assert!(resolve_model(ModelRef::None).model.is_none());
        let resolved = resolve_model(ModelRef::from("None"));
        assert!(resolved.model.is_none());
        assert!(resolved.provenance.is_none());
    }

    #[test]
    fn test_path_is_lazy() {
        let resolved = resolve_model(ModelRef::from("/models/bins.json"));
        let model = resolved.model.unwrap();
        assert!(model.is_path_backed());
        assert_eq!(model.path(), Some(Path::new("/models/bins.json")));
        assert_eq!(resolved.provenance.as_deref(), Some("/models/bins.json"));
        match &model {
            Model::PathBacked(m) => assert!(!m.is_loaded()),
            Model::InMemory(_) => panic!("expected path-backed model"),
        }
    }

    #[test]
    fn test_handle_with_path_records_provenance() {
        let handle = ModelHandle::with_path(Arc::new(vec![0.3_f64, 0.6]), "/models/edges.json");
        let resolved = resolve_model(handle.into());
        assert_eq!(resolved.provenance.as_deref(), Some("/models/edges.json"));
        let model = resolved.model.unwrap();
        assert_eq!(model.downcast_ref::<Vec<f64>>(), Some(&vec![0.3, 0.6]));
    }

    #[test]
    fn test_handle_without_path() {
        let resolved = resolve_model(ModelHandle::new(Arc::new(7_u32)).into());
        assert!(resolved.provenance.is_none());
        assert_eq!(resolved.model.unwrap().downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_object() {
        let resolved = resolve_model(ModelRef::object(String::from("trained")));
        let model = resolved.model.unwrap();
        assert!(!model.is_path_backed());
        assert_eq!(model.downcast_ref::<String>().map(String::as_str), Some("trained"));
    }

    #[test]
    fn test_json_reader_loads_once() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"edges": [0.0, 0.5, 1.0]}}"#).unwrap();
        let path = file.path().display().to_string();

        let model = resolve_model(ModelRef::Path(path)).model.unwrap();
        let obj = model.load(&JsonModelReader).unwrap();
        let value = obj.downcast_ref::<serde_json::Value>().unwrap();
        assert_eq!(value["edges"][1], 0.5);

        // Second load comes from the cell even if the file is gone.
        drop(file);
        assert!(model.load(&JsonModelReader).is_ok());
        assert!(model.downcast_ref::<serde_json::Value>().is_some());
    }

    #[test]
    fn test_missing_file_is_resolution_error() {
        let model = resolve_model(ModelRef::from("/nonexistent/model.json")).model.unwrap();
        let err = model.load(&JsonModelReader).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::ModelResolution { .. })
        ));
    }
}
