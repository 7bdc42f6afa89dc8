//! Run metrics: chunk and row counters plus per-phase timing.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for one stage run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Number of chunks classified and written
    pub chunks_processed: AtomicU64,

    /// Rows read from the input source
    pub rows_read: AtomicU64,

    /// Rows written to the output
    pub rows_written: AtomicU64,

    /// Number of failed chunks
    pub failures: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    // Per-phase timing (in microseconds for precision)
    /// Time spent reading chunks (microseconds)
    pub read_us: AtomicU64,

    /// Time spent in the classifier (microseconds)
    pub classify_us: AtomicU64,

    /// Time spent writing output (microseconds)
    pub write_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a processed chunk.
    pub fn add_chunk_processed(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record rows read.
    pub fn add_rows_read(&self, rows: u64) {
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record rows written.
    pub fn add_rows_written(&self, rows: u64) {
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record a failure.
    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_read_time(&self, duration: Duration) {
        self.read_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_classify_time(&self, duration: Duration) {
        self.classify_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_write_time(&self, duration: Duration) {
        self.write_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get rows per second.
    pub fn rows_per_second(&self) -> f64 {
        let rows = self.rows_written.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            rows as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            rows_per_second: self.rows_per_second(),
            read_secs: self.read_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            classify_secs: self.classify_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            write_secs: self.write_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub chunks_processed: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub rows_per_second: f64,
    /// Time spent reading input (seconds)
    pub read_secs: f64,
    /// Time spent classifying (seconds)
    pub classify_secs: f64,
    /// Time spent writing output (seconds)
    pub write_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.read_secs + self.classify_secs + self.write_secs;
        let (read_pct, classify_pct, write_pct) = if total > 0.0 {
            (
                self.read_secs / total * 100.0,
                self.classify_secs / total * 100.0,
                self.write_secs / total * 100.0,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        write!(
            f,
            "Chunks: {} | Rows: {} read, {} written @ {:.0} rows/s | Failures: {} | \
             Elapsed: {:.1}s | Time: read {:.0}% classify {:.0}% write {:.0}%",
            self.chunks_processed,
            self.rows_read,
            self.rows_written,
            self.rows_per_second,
            self.failures,
            self.elapsed.as_secs_f64(),
            read_pct,
            classify_pct,
            write_pct,
        )
    }
}
