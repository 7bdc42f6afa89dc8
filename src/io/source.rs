//! Input side of a stage: anything that can report its length and hand out row ranges.

use crate::data::RowSlice;
use crate::pipeline::ChunkIterator;
use anyhow::Result;
use std::num::NonZeroUsize;

/// A dataset readable in ascending row ranges.
///
/// The chunk iterator only ever requests `[0, C), [C, 2C), ...` in order, so
/// implementations may be strictly sequential.
#[allow(async_fn_in_trait)]
pub trait InputSource {
    /// Payload type of one range.
    type Data;

    /// Total number of rows.
    fn total_len(&self) -> usize;

    /// Read rows `[start, end)`.
    async fn read_range(&mut self, start: usize, end: usize) -> Result<Self::Data>;

    /// Short human-readable description for provenance.
    fn describe(&self) -> String {
        format!("{} rows", self.total_len())
    }

    /// Iterate the whole source in chunks of at most `chunk_size` rows.
    fn iter_chunks(&mut self, chunk_size: NonZeroUsize) -> ChunkIterator<'_, Self>
    where
        Self: Sized,
    {
        ChunkIterator::new(self, chunk_size)
    }
}

/// A source backed by a payload already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource<D> {
    name: String,
    data: D,
}

impl<D: RowSlice> MemorySource<D> {
    pub fn new(name: impl Into<String>, data: D) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn data(&self) -> &D {
        &self.data
    }
}

impl<D: RowSlice> InputSource for MemorySource<D> {
    type Data = D;

    fn total_len(&self) -> usize {
        self.data.row_count()
    }

    async fn read_range(&mut self, start: usize, end: usize) -> Result<D> {
        if start > end || end > self.data.row_count() {
            anyhow::bail!(
                "Range [{}, {}) out of bounds for '{}' with {} rows",
                start,
                end,
                self.name,
                self.data.row_count()
            );
        }
        Ok(self.data.slice_rows(start, end))
    }

    fn describe(&self) -> String {
        format!("memory:{} ({} rows)", self.name, self.total_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Table;

    fn table(n: usize) -> Table {
        Table::from_columns(vec![("z".to_string(), (0..n).map(|i| i as f64).collect())]).unwrap()
    }

    #[tokio::test]
    async fn test_memory_source_range() {
        let mut source = MemorySource::new("cat", table(10));
        assert_eq!(source.total_len(), 10);
        let rows = source.read_range(3, 6).await.unwrap();
        assert_eq!(rows.column("z").unwrap().to_vec(), vec![3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_memory_source_out_of_bounds() {
        let mut source = MemorySource::new("cat", table(4));
        assert!(source.read_range(2, 5).await.is_err());
    }

    #[test]
    fn test_describe() {
        let source = MemorySource::new("cat", table(4));
        assert_eq!(source.describe(), "memory:cat (4 rows)");
    }
}
