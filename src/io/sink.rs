//! Output side of a stage.

use crate::data::{ClassAssignment, UNASSIGNED};
use crate::error::StageError;
use crate::io::Communicator;
use anyhow::Result;
use std::sync::Arc;

/// A write target sized once, filled in row ranges, then sealed.
///
/// Call order is `initialize_write`, then any number of
/// `set_data` + `write_chunk` pairs, then `finalize_write`.
#[allow(async_fn_in_trait)]
pub trait OutputHandle {
    /// Allocate storage for `total_len` rows.
    async fn initialize_write(
        &mut self,
        total_len: usize,
        comm: Option<&Arc<dyn Communicator>>,
    ) -> Result<()>;

    /// Stage the buffer the next `write_chunk` persists. With `partial = false`
    /// the buffer covers the whole output.
    fn set_data(&mut self, data: ClassAssignment, partial: bool) -> Result<()>;

    /// Persist the staged buffer to rows `[start, end)`.
    async fn write_chunk(&mut self, start: usize, end: usize) -> Result<()>;

    /// Flush and close so downstream readers see complete output.
    async fn finalize_write(&mut self) -> Result<()>;
}

/// Output kept in a `Vec`, mostly for tests and small in-process runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryOutput {
    class_id: Option<Vec<i32>>,
    /// Staged buffer and whether it covers only the next range.
    pending: Option<(ClassAssignment, bool)>,
    finalized: bool,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full output, `None` until `initialize_write`.
    pub fn class_ids(&self) -> Option<&[i32]> {
        self.class_id.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.class_id.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl OutputHandle for MemoryOutput {
    async fn initialize_write(
        &mut self,
        total_len: usize,
        _comm: Option<&Arc<dyn Communicator>>,
    ) -> Result<()> {
        if self.class_id.is_some() {
            return Err(StageError::OutputLifecycle("output already initialized".to_string()).into());
        }
        self.class_id = Some(vec![UNASSIGNED; total_len]);
        Ok(())
    }

    fn set_data(&mut self, data: ClassAssignment, partial: bool) -> Result<()> {
        if !partial {
            let buf = self.class_id.as_ref().ok_or_else(|| {
                StageError::OutputLifecycle("set_data before initialize_write".to_string())
            })?;
            if buf.len() != data.len() {
                anyhow::bail!("Full buffer has {} rows, output has {}", data.len(), buf.len());
            }
        }
        self.pending = Some((data, partial));
        Ok(())
    }

    async fn write_chunk(&mut self, start: usize, end: usize) -> Result<()> {
        if self.finalized {
            return Err(StageError::OutputLifecycle("write after finalize".to_string()).into());
        }
        let buf = self.class_id.as_mut().ok_or_else(|| {
            StageError::OutputLifecycle("write_chunk before initialize_write".to_string())
        })?;
        let (pending, partial) = self
            .pending
            .take()
            .ok_or_else(|| StageError::OutputLifecycle("write_chunk with no staged data".to_string()))?;
        if end > buf.len() || start > end {
            anyhow::bail!("Range [{}, {}) outside output of {} rows", start, end, buf.len());
        }

        // A full-length buffer is written at its own offsets.
        let src = if partial {
            &pending.class_id[..]
        } else {
            &pending.class_id[start..end]
        };
        if src.len() != end - start {
            return Err(StageError::ChunkLength { start, end, got: src.len() }.into());
        }
        buf[start..end].copy_from_slice(src);
        Ok(())
    }

    async fn finalize_write(&mut self) -> Result<()> {
        if self.finalized {
            return Err(StageError::OutputLifecycle("output already finalized".to_string()).into());
        }
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_output_writes_ranges() {
        let mut out = MemoryOutput::new();
        out.initialize_write(5, None).await.unwrap();
        assert_eq!(out.class_ids(), Some(&[UNASSIGNED; 5][..]));

        out.set_data(ClassAssignment::new(vec![1, 2]), true).unwrap();
        out.write_chunk(0, 2).await.unwrap();
        out.set_data(ClassAssignment::new(vec![3, 3, 0]), true).unwrap();
        out.write_chunk(2, 5).await.unwrap();
        out.finalize_write().await.unwrap();

        assert_eq!(out.class_ids(), Some(&[1, 2, 3, 3, 0][..]));
        assert!(out.is_finalized());
    }

    #[tokio::test]
    async fn test_full_buffer_written_at_offsets() {
        let mut out = MemoryOutput::new();
        out.initialize_write(4, None).await.unwrap();
        out.set_data(ClassAssignment::new(vec![9, 8, 7, 6]), false).unwrap();
        out.write_chunk(1, 3).await.unwrap();
        assert_eq!(out.class_ids(), Some(&[UNASSIGNED, 8, 7, UNASSIGNED][..]));
    }

    #[tokio::test]
    async fn test_write_before_initialize() {
        let mut out = MemoryOutput::new();
        out.set_data(ClassAssignment::new(vec![1]), true).unwrap();
        let err = out.write_chunk(0, 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::OutputLifecycle(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_length_rejected() {
        let mut out = MemoryOutput::new();
        out.initialize_write(10, None).await.unwrap();
        out.set_data(ClassAssignment::new(vec![1, 2]), true).unwrap();
        let err = out.write_chunk(0, 3).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<StageError>(),
            Some(&StageError::ChunkLength { start: 0, end: 3, got: 2 })
        );
    }

    #[tokio::test]
    async fn test_double_initialize_rejected() {
        let mut out = MemoryOutput::new();
        out.initialize_write(1, None).await.unwrap();
        assert!(out.initialize_write(1, None).await.is_err());
    }
}
