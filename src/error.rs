//! Errors raised by the classification core itself.
//!
//! Everything else (I/O, collaborator failures, algorithm failures) travels as
//! `anyhow::Error` with the failing value intact, so callers can still
//! `downcast_ref` to whatever the failing component produced.

use thiserror::Error;

/// Failures originating inside the stage protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// A required hook was not supplied by the concrete classifier.
    #[error("{stage}.{hook} is not implemented")]
    NotImplemented { stage: String, hook: &'static str },

    /// A model reference could not be dereferenced.
    #[error("failed to resolve model '{reference}': {reason}")]
    ModelResolution { reference: String, reason: String },

    /// The output handle was driven out of order.
    #[error("output lifecycle violation: {0}")]
    OutputLifecycle(String),

    /// A classifier returned the wrong number of assignments for a chunk.
    #[error("chunk [{start}, {end}) expects {} assignments, got {got}", .end - .start)]
    ChunkLength { start: usize, end: usize, got: usize },

    /// A stage instance is single-use.
    #[error("stage '{stage}' has already run")]
    AlreadyRun { stage: String },

    /// A sequential source was asked for a range that is not next in line.
    #[error("non-sequential read: expected start {expected}, got {got}")]
    NonSequentialRead { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_message() {
        let err = StageError::NotImplemented {
            stage: "PzClassifier".to_string(),
            hook: "process_chunk",
        };
        assert_eq!(err.to_string(), "PzClassifier.process_chunk is not implemented");
    }

    #[test]
    fn test_chunk_length_message() {
        let err = StageError::ChunkLength { start: 10, end: 20, got: 3 };
        assert_eq!(err.to_string(), "chunk [10, 20) expects 10 assignments, got 3");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = StageError::AlreadyRun { stage: "bins".to_string() }.into();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::AlreadyRun { .. })
        ));
    }
}
