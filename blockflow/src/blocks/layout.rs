//! Partition and block shape of a store, known without executing it.

use crate::errors::{AlignmentError, BlockflowError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Row counts per block, grouped by partition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Layout {
    partitions: Vec<Vec<usize>>,
}

impl Layout {
    /// Creates a layout, dropping empty partitions.
    #[must_use]
    pub fn new(partitions: Vec<Vec<usize>>) -> Self {
        Self {
            partitions: partitions.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Row counts per block, per partition.
    #[must_use]
    pub fn partitions(&self) -> &[Vec<usize>] {
        &self.partitions
    }

    /// Number of partitions.
    #[must_use]
    pub fn n_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of blocks across partitions.
    #[must_use]
    pub fn n_blocks(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Total number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.partitions.iter().flatten().sum()
    }

    /// Row counts of every block in partition-then-block order.
    #[must_use]
    pub fn block_rows(&self) -> Vec<usize> {
        self.partitions.iter().flatten().copied().collect()
    }

    /// Keeps the blocks whose global index falls in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the block count.
    pub fn take(&self, range: &Range<usize>) -> Result<Self, BlockflowError> {
        let total = self.n_blocks();
        if range.start > range.end || range.end > total {
            return Err(BlockflowError::invalid_input(format!(
                "block range {range:?} out of bounds for {total} blocks"
            )));
        }
        let mut index = 0;
        let mut kept = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            let mut part = Vec::new();
            for &rows in partition {
                if range.contains(&index) {
                    part.push(rows);
                }
                index += 1;
            }
            kept.push(part);
        }
        Ok(Self::new(kept))
    }

    /// Fails unless `other` has the same block count and per-block row counts.
    ///
    /// # Errors
    ///
    /// Returns an [`AlignmentError`] describing the first difference.
    pub fn check_aligned(&self, other: &Self, context: &str) -> Result<(), AlignmentError> {
        let ours = self.block_rows();
        let theirs = other.block_rows();
        if ours.len() != theirs.len() {
            return Err(AlignmentError::block_count(context, ours.len(), theirs.len()));
        }
        if let Some((i, (a, b))) = ours
            .iter()
            .zip(&theirs)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(AlignmentError::block_rows(context, i, *a, *b));
        }
        Ok(())
    }
}
