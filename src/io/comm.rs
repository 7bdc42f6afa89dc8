//! Multi-process coordination token.
//!
//! The classification core only carries a communicator to the output handle.
//! Sinks that support cooperative writing may query it; nothing else does.

use std::fmt;

/// An opaque view of a group of cooperating processes.
pub trait Communicator: Send + Sync + fmt::Debug {
    /// Index of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;
}

/// A fixed rank/size pair, e.g. taken from launcher environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
}

impl LocalCommunicator {
    pub fn new(rank: usize, size: usize) -> anyhow::Result<Self> {
        if size == 0 || rank >= size {
            anyhow::bail!("Invalid communicator: rank {} of size {}", rank, size);
        }
        Ok(Self { rank, size })
    }

    /// A group containing only this process.
    pub fn single() -> Self {
        Self { rank: 0, size: 1 }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_bounds() {
        assert!(LocalCommunicator::new(0, 1).is_ok());
        assert!(LocalCommunicator::new(3, 4).is_ok());
        assert!(LocalCommunicator::new(4, 4).is_err());
        assert!(LocalCommunicator::new(0, 0).is_err());
        assert_eq!(LocalCommunicator::single().size(), 1);
    }
}
