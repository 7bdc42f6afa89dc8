//! Fixed-width binary class-id files.
//!
//! The data file holds one little-endian `i32` per input row, so row `i` lives at
//! byte offset `4 * i` and any range can be written independently. A JSON
//! sidecar (`<path>.json`) carries the metadata downstream readers need and is
//! only written by `finalize_write`; a data file without a sidecar is an
//! unfinished run.
//!
//! With cooperating writers every rank but 0 leaves a report of the ranges it
//! wrote (`<path>.writer<rank>.json`) when it finalizes. Rank 0 waits for all
//! reports, fills rows nobody wrote with [`UNASSIGNED`], and only then writes
//! the sidecar.

use crate::data::{ClassAssignment, UNASSIGNED};
use crate::error::StageError;
use crate::io::{Communicator, OutputHandle};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::time::Instant;

const BYTES_PER_ROW: u64 = 4;

/// Rows per write when filling unwritten ranges.
const FILL_BLOCK_ROWS: usize = 16 * 1024;

const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEFAULT_FINALIZE_TIMEOUT: Duration = Duration::from_secs(600);

/// Data type tag stored in the sidecar.
pub const CLASS_FILE_DTYPE: &str = "int32-le";

/// Sidecar metadata for a class-id file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFileMetadata {
    /// Element type of the data file
    pub dtype: String,

    /// Number of rows in the data file
    pub total_len: usize,

    /// Value of rows nobody wrote
    pub fill_value: i32,

    /// Name of the stage that produced the file
    pub stage: String,

    /// Number of processes that cooperated on the file
    pub num_writers: usize,
}

/// Ranges a non-zero rank wrote, left for rank 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WriterReport {
    rank: usize,
    ranges: Vec<(usize, usize)>,
}

/// Output handle writing class ids to a binary file.
#[derive(Debug)]
pub struct ClassFileWriter {
    path: PathBuf,
    stage: String,
    file: Option<File>,
    total_len: usize,
    rank: usize,
    num_writers: usize,
    pending: Option<(ClassAssignment, bool)>,
    /// Ranges this process wrote, in write order.
    written: Vec<(usize, usize)>,
    rows_written: usize,
    finalize_timeout: Duration,
    finalized: bool,
}

impl ClassFileWriter {
    /// A writer targeting `path`. Nothing touches the filesystem until `initialize_write`.
    pub fn new(path: impl Into<PathBuf>, stage: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage: stage.into(),
            file: None,
            total_len: 0,
            rank: 0,
            num_writers: 1,
            pending: None,
            written: Vec::new(),
            rows_written: 0,
            finalize_timeout: DEFAULT_FINALIZE_TIMEOUT,
            finalized: false,
        }
    }

    /// How long rank 0 waits in `finalize_write` for the other writers.
    pub fn with_finalize_timeout(mut self, timeout: Duration) -> Self {
        self.finalize_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the metadata sidecar.
    pub fn metadata_path(&self) -> PathBuf {
        metadata_path(&self.path)
    }

    /// Rows written by this process so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Wait until `rank` has finalized and return what it wrote.
    async fn wait_for_writer(&self, rank: usize) -> Result<WriterReport> {
        let report_path = writer_report_path(&self.path, rank);
        let deadline = Instant::now() + self.finalize_timeout;
        loop {
            match tokio::fs::read_to_string(&report_path).await {
                Ok(json) => {
                    return serde_json::from_str(&json)
                        .with_context(|| format!("Malformed writer report {}", report_path.display()));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "Writer {} of {} did not finalize {} within {:?}",
                    rank,
                    self.num_writers,
                    self.path.display(),
                    self.finalize_timeout
                );
            }
            tokio::time::sleep(WRITER_POLL_INTERVAL).await;
        }
    }
}

impl OutputHandle for ClassFileWriter {
    async fn initialize_write(
        &mut self,
        total_len: usize,
        comm: Option<&Arc<dyn Communicator>>,
    ) -> Result<()> {
        if self.file.is_some() || self.finalized {
            return Err(StageError::OutputLifecycle(format!(
                "{} already initialized",
                self.path.display()
            ))
            .into());
        }

        if let Some(comm) = comm {
            self.rank = comm.rank();
            self.num_writers = comm.size();
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Cooperating writers share the file, so only a lone writer may truncate.
        let shared = self.num_writers > 1;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(!shared)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        file.set_len(total_len as u64 * BYTES_PER_ROW).await?;
        if self.rank == 0 {
            remove_if_exists(&self.metadata_path()).await?;
        }

        tracing::info!(
            "Allocated {} for {} rows (writer {} of {})",
            self.path.display(),
            total_len,
            self.rank,
            self.num_writers
        );

        self.file = Some(file);
        self.total_len = total_len;
        Ok(())
    }

    fn set_data(&mut self, data: ClassAssignment, partial: bool) -> Result<()> {
        if !partial && data.len() != self.total_len {
            anyhow::bail!(
                "Full buffer has {} rows, output has {}",
                data.len(),
                self.total_len
            );
        }
        self.pending = Some((data, partial));
        Ok(())
    }

    async fn write_chunk(&mut self, start: usize, end: usize) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            StageError::OutputLifecycle("write_chunk before initialize_write".to_string())
        })?;
        let (pending, partial) = self.pending.take().ok_or_else(|| {
            StageError::OutputLifecycle("write_chunk with no staged data".to_string())
        })?;
        if start > end || end > self.total_len {
            anyhow::bail!(
                "Range [{}, {}) outside output of {} rows",
                start,
                end,
                self.total_len
            );
        }

        let rows = if partial {
            &pending.class_id[..]
        } else {
            &pending.class_id[start..end]
        };
        if rows.len() != end - start {
            return Err(StageError::ChunkLength { start, end, got: rows.len() }.into());
        }

        let mut bytes = Vec::with_capacity(rows.len() * BYTES_PER_ROW as usize);
        for id in rows {
            bytes.extend_from_slice(&id.to_le_bytes());
        }

        file.seek(SeekFrom::Start(start as u64 * BYTES_PER_ROW)).await?;
        file.write_all(&bytes).await.map_err(|e| {
            tracing::error!("Write of rows [{}, {}) failed: {}", start, end, e);
            anyhow::anyhow!("Failed to write rows [{}, {}) to {}: {}", start, end, self.path.display(), e)
        })?;

        self.written.push((start, end));
        self.rows_written += end - start;
        tracing::debug!("Wrote rows [{}, {}) to {}", start, end, self.path.display());
        Ok(())
    }

    async fn finalize_write(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Err(StageError::OutputLifecycle(
                "finalize_write without an open file".to_string(),
            )
            .into());
        }

        let mut ranges = self.written.clone();
        if self.rank == 0 {
            for rank in 1..self.num_writers {
                ranges.extend(self.wait_for_writer(rank).await?.ranges);
            }
        }

        let mut file = self.file.take().ok_or_else(|| {
            StageError::OutputLifecycle("finalize_write without an open file".to_string())
        })?;
        if self.rank == 0 {
            let filled = fill_unwritten(&mut file, &ranges, self.total_len).await?;
            if filled > 0 {
                tracing::warn!("{}: {} rows were never written", self.path.display(), filled);
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if self.rank == 0 {
            for rank in 1..self.num_writers {
                remove_if_exists(&writer_report_path(&self.path, rank)).await?;
            }
            let metadata = ClassFileMetadata {
                dtype: CLASS_FILE_DTYPE.to_string(),
                total_len: self.total_len,
                fill_value: UNASSIGNED,
                stage: self.stage.clone(),
                num_writers: self.num_writers,
            };
            let json = serde_json::to_string_pretty(&metadata)?;
            tokio::fs::write(self.metadata_path(), json).await?;
        } else {
            let report = WriterReport {
                rank: self.rank,
                ranges,
            };
            // Written under a temporary name so rank 0 never reads a partial report.
            let report_path = writer_report_path(&self.path, self.rank);
            let mut tmp = report_path.clone().into_os_string();
            tmp.push(".tmp");
            tokio::fs::write(&tmp, serde_json::to_string(&report)?).await?;
            tokio::fs::rename(&tmp, &report_path).await?;
        }

        self.finalized = true;
        tracing::info!(
            "Finalized {} ({} rows written by writer {})",
            self.path.display(),
            self.rows_written,
            self.rank
        );
        Ok(())
    }
}

/// The parts of `[0, total_len)` not covered by `ranges`.
fn unwritten_ranges(ranges: &[(usize, usize)], total_len: usize) -> Vec<(usize, usize)> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();

    let mut gaps = Vec::new();
    let mut cursor = 0;
    for (start, end) in sorted {
        if start > cursor {
            gaps.push((cursor, start.min(total_len)));
        }
        cursor = cursor.max(end);
    }
    if cursor < total_len {
        gaps.push((cursor, total_len));
    }
    gaps.retain(|(start, end)| start < end);
    gaps
}

/// Write [`UNASSIGNED`] to every row outside `ranges`. Returns the number of rows filled.
async fn fill_unwritten(file: &mut File, ranges: &[(usize, usize)], total_len: usize) -> Result<usize> {
    let block = UNASSIGNED.to_le_bytes().repeat(FILL_BLOCK_ROWS);
    let mut filled = 0;
    for (start, end) in unwritten_ranges(ranges, total_len) {
        file.seek(SeekFrom::Start(start as u64 * BYTES_PER_ROW)).await?;
        let mut row = start;
        while row < end {
            let n = (end - row).min(FILL_BLOCK_ROWS);
            file.write_all(&block[..n * BYTES_PER_ROW as usize]).await?;
            row += n;
        }
        filled += end - start;
    }
    Ok(filled)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn writer_report_path(path: &Path, rank: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".writer{}.json", rank));
    PathBuf::from(name)
}

fn metadata_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Read a finalized class-id file and its metadata.
pub async fn read_class_file(path: impl AsRef<Path>) -> Result<(ClassFileMetadata, Vec<i32>)> {
    let path = path.as_ref();
    let sidecar = metadata_path(path);
    let json = tokio::fs::read_to_string(&sidecar).await.with_context(|| {
        format!(
            "No metadata at {}; the run that produced {} did not finalize",
            sidecar.display(),
            path.display()
        )
    })?;
    let metadata: ClassFileMetadata = serde_json::from_str(&json)?;
    if metadata.dtype != CLASS_FILE_DTYPE {
        anyhow::bail!("Unsupported dtype '{}' in {}", metadata.dtype, sidecar.display());
    }

    let bytes = tokio::fs::read(path).await?;
    let expected = metadata.total_len * BYTES_PER_ROW as usize;
    if bytes.len() != expected {
        anyhow::bail!(
            "{} has {} bytes, metadata says {} rows ({} bytes)",
            path.display(),
            bytes.len(),
            metadata.total_len,
            expected
        );
    }

    let class_id = bytes
        .chunks_exact(BYTES_PER_ROW as usize)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((metadata, class_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LocalCommunicator;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("output_bins.bin");

        let mut writer = ClassFileWriter::new(&path, "bins");
        writer.initialize_write(5, None).await.unwrap();
        writer.set_data(ClassAssignment::new(vec![3, 1, 4]), true).unwrap();
        writer.write_chunk(0, 3).await.unwrap();
        writer.set_data(ClassAssignment::new(vec![-1, 5]), true).unwrap();
        writer.write_chunk(3, 5).await.unwrap();

        assert!(!writer.metadata_path().exists());
        writer.finalize_write().await.unwrap();
        assert!(writer.metadata_path().exists());
        assert_eq!(writer.rows_written(), 5);

        let (metadata, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(ids, vec![3, 1, 4, -1, 5]);
        assert_eq!(metadata.total_len, 5);
        assert_eq!(metadata.stage, "bins");
        assert_eq!(metadata.num_writers, 1);
    }

    #[tokio::test]
    async fn test_unfinalized_file_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");

        let mut writer = ClassFileWriter::new(&path, "bins");
        writer.initialize_write(2, None).await.unwrap();
        writer.set_data(ClassAssignment::new(vec![1, 2]), true).unwrap();
        writer.write_chunk(0, 2).await.unwrap();

        assert!(read_class_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_cooperating_writers_share_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.bin");

        let comm0: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(0, 2).unwrap());
        let comm1: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(1, 2).unwrap());

        let mut w0 = ClassFileWriter::new(&path, "bins");
        let mut w1 = ClassFileWriter::new(&path, "bins");
        w0.initialize_write(4, Some(&comm0)).await.unwrap();
        w0.set_data(ClassAssignment::new(vec![7, 7]), true).unwrap();
        w0.write_chunk(0, 2).await.unwrap();

        // Opening the second writer must not wipe the first writer's rows.
        w1.initialize_write(4, Some(&comm1)).await.unwrap();
        w1.set_data(ClassAssignment::new(vec![8, 8]), true).unwrap();
        w1.write_chunk(2, 4).await.unwrap();

        w1.finalize_write().await.unwrap();
        assert!(!metadata_path(&path).exists());
        w0.finalize_write().await.unwrap();

        let (metadata, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(ids, vec![7, 7, 8, 8]);
        assert_eq!(metadata.num_writers, 2);
        assert!(!writer_report_path(&path, 1).exists());
    }

    #[tokio::test]
    async fn test_rank_zero_waits_for_other_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.bin");

        let comm0: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(0, 2).unwrap());
        let comm1: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(1, 2).unwrap());
        let mut w0 = ClassFileWriter::new(&path, "bins");
        let mut w1 = ClassFileWriter::new(&path, "bins");
        w0.initialize_write(4, Some(&comm0)).await.unwrap();
        w1.initialize_write(4, Some(&comm1)).await.unwrap();
        w0.set_data(ClassAssignment::new(vec![3, 3]), true).unwrap();
        w0.write_chunk(0, 2).await.unwrap();

        // Rank 0 finalizes first; the sidecar must not appear before rank 1 is done.
        let sidecar = metadata_path(&path);
        let (r0, r1) = tokio::join!(w0.finalize_write(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(!sidecar.exists());
            w1.set_data(ClassAssignment::new(vec![4, 4]), true).unwrap();
            w1.write_chunk(2, 4).await.unwrap();
            w1.finalize_write().await
        });
        r0.unwrap();
        r1.unwrap();

        let (_, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(ids, vec![3, 3, 4, 4]);
    }

    #[tokio::test]
    async fn test_rows_nobody_wrote_read_as_unassigned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.bin");

        let comm0: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(0, 2).unwrap());
        let comm1: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(1, 2).unwrap());
        let mut w0 = ClassFileWriter::new(&path, "bins");
        let mut w1 = ClassFileWriter::new(&path, "bins");
        w0.initialize_write(4, Some(&comm0)).await.unwrap();
        w1.initialize_write(4, Some(&comm1)).await.unwrap();
        w0.set_data(ClassAssignment::new(vec![3, 3]), true).unwrap();
        w0.write_chunk(0, 2).await.unwrap();

        // Rank 1 finishes without writing anything.
        w1.finalize_write().await.unwrap();
        w0.finalize_write().await.unwrap();

        let (metadata, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(metadata.fill_value, UNASSIGNED);
        assert_eq!(ids, vec![3, 3, UNASSIGNED, UNASSIGNED]);
    }

    #[tokio::test]
    async fn test_single_writer_unwritten_range_filled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gappy.bin");

        let mut writer = ClassFileWriter::new(&path, "bins");
        writer.initialize_write(5, None).await.unwrap();
        writer.set_data(ClassAssignment::new(vec![0, 1]), true).unwrap();
        writer.write_chunk(0, 2).await.unwrap();
        writer.finalize_write().await.unwrap();

        let (_, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(ids, vec![0, 1, UNASSIGNED, UNASSIGNED, UNASSIGNED]);
    }

    #[tokio::test]
    async fn test_missing_writer_times_out_without_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.bin");

        let comm0: Arc<dyn Communicator> = Arc::new(LocalCommunicator::new(0, 2).unwrap());
        let mut w0 = ClassFileWriter::new(&path, "bins")
            .with_finalize_timeout(Duration::from_millis(50));
        w0.initialize_write(2, Some(&comm0)).await.unwrap();
        w0.set_data(ClassAssignment::new(vec![1, 1]), true).unwrap();
        w0.write_chunk(0, 2).await.unwrap();

        assert!(w0.finalize_write().await.is_err());
        assert!(!metadata_path(&path).exists());
        assert!(read_class_file(&path).await.is_err());
    }

    #[test]
    fn test_unwritten_ranges() {
        assert_eq!(unwritten_ranges(&[(4, 6), (0, 2)], 8), vec![(2, 4), (6, 8)]);
        assert_eq!(unwritten_ranges(&[(0, 8)], 8), vec![]);
        assert_eq!(unwritten_ranges(&[], 3), vec![(0, 3)]);
        assert_eq!(unwritten_ranges(&[(0, 3), (1, 5)], 5), vec![]);
    }

    #[tokio::test]
    async fn test_reinitialize_truncates_single_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rerun.bin");

        for len in [6, 3] {
            let mut writer = ClassFileWriter::new(&path, "bins");
            writer.initialize_write(len, None).await.unwrap();
            writer.set_data(ClassAssignment::new(vec![2; len]), true).unwrap();
            writer.write_chunk(0, len).await.unwrap();
            writer.finalize_write().await.unwrap();
        }

        let (_, ids) = read_class_file(&path).await.unwrap();
        assert_eq!(ids, vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn test_finalize_without_initialize() {
        let dir = TempDir::new().unwrap();
        let mut writer = ClassFileWriter::new(dir.path().join("never.bin"), "bins");
        let err = writer.finalize_write().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::OutputLifecycle(_))
        ));
    }
}
