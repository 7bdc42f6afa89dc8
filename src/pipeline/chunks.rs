//! Chunk planning and lazy chunk iteration.

use crate::io::InputSource;
use anyhow::Result;
use std::num::NonZeroUsize;

/// Half-open row range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub start: usize,
    pub end: usize,
}

impl ChunkRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The ranges `[0, C), [C, 2C), ..., [kC, L)` for a dataset of length `L`.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    next_start: usize,
    total_len: usize,
    chunk_size: usize,
}

impl ChunkRanges {
    pub fn new(total_len: usize, chunk_size: NonZeroUsize) -> Self {
        Self {
            next_start: 0,
            total_len,
            chunk_size: chunk_size.get(),
        }
    }

    /// Number of chunks a dataset of `total_len` rows splits into.
    pub fn num_chunks(total_len: usize, chunk_size: NonZeroUsize) -> usize {
        total_len.div_ceil(chunk_size.get())
    }
}

impl Iterator for ChunkRanges {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        if self.next_start >= self.total_len {
            return None;
        }
        let start = self.next_start;
        let end = start.saturating_add(self.chunk_size).min(self.total_len);
        self.next_start = end;
        Some(ChunkRange { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total_len - self.next_start.min(self.total_len)).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkRanges {}

/// One unit of work: a row range and the rows in it.
#[derive(Debug, Clone)]
pub struct Chunk<D> {
    pub start: usize,
    pub end: usize,
    pub data: D,
}

impl<D> Chunk<D> {
    pub fn range(&self) -> ChunkRange {
        ChunkRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Reads a source one chunk at a time, in order, never ahead of demand.
///
/// Once exhausted it stays exhausted; iterate again by building a new one.
pub struct ChunkIterator<'a, S: InputSource> {
    source: &'a mut S,
    ranges: ChunkRanges,
}

impl<'a, S: InputSource> ChunkIterator<'a, S> {
    pub fn new(source: &'a mut S, chunk_size: NonZeroUsize) -> Self {
        let ranges = ChunkRanges::new(source.total_len(), chunk_size);
        Self { source, ranges }
    }

    /// Chunks not yet read.
    pub fn remaining(&self) -> usize {
        self.ranges.len()
    }

    /// Read the next chunk, or `None` once the source is covered.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk<S::Data>>> {
        let Some(range) = self.ranges.next() else {
            return Ok(None);
        };
        let data = self.source.read_range(range.start, range.end).await?;
        Ok(Some(Chunk {
            start: range.start,
            end: range.end,
            data,
        }))
    }
}
