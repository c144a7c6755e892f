//! Inputs accepted by stages and compositions.

use super::{Block, BlockFrame, BlockStore, Layout};
use crate::errors::BlockflowError;
use std::sync::Arc;

/// Name of the feature column in a [`BlockFrame`] dataset.
pub const FEATURES: &str = "X";

/// Name of the target column in a [`BlockFrame`] dataset.
pub const TARGET: &str = "y";

/// One block of features, with the aligned target block if there is one.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Feature block.
    pub x: &'a Block,
    /// Target block, aligned row for row with `x`.
    pub y: Option<&'a Block>,
}

/// Owned form of [`Batch`], as produced by executing a dataset.
#[derive(Debug, Clone)]
pub struct OwnedBatch {
    /// Feature block.
    pub x: Arc<Block>,
    /// Target block.
    pub y: Option<Arc<Block>>,
}

impl OwnedBatch {
    /// Borrows the batch.
    #[must_use]
    pub fn as_batch(&self) -> Batch<'_> {
        Batch {
            x: &self.x,
            y: self.y.as_deref(),
        }
    }
}

/// Either a single-column store of features, or a frame with a feature
/// column and optional target column.
#[derive(Debug, Clone)]
pub enum Dataset {
    /// Features only.
    Array(BlockStore),
    /// Named columns; features live in [`FEATURES`], targets in [`TARGET`].
    Frame(BlockFrame),
}

impl Dataset {
    /// Builds a frame dataset from aligned features and targets.
    ///
    /// # Errors
    ///
    /// Returns an alignment error if the layouts differ.
    pub fn supervised(x: BlockStore, y: BlockStore) -> Result<Self, BlockflowError> {
        Ok(Self::Frame(BlockFrame::zip(vec![(FEATURES, x), (TARGET, y)])?))
    }

    /// The feature store.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a frame has no feature column.
    pub fn features(&self) -> Result<&BlockStore, BlockflowError> {
        match self {
            Self::Array(store) => Ok(store),
            Self::Frame(frame) => Ok(frame.column(FEATURES)?),
        }
    }

    /// The target store, if present.
    #[must_use]
    pub fn target(&self) -> Option<&BlockStore> {
        match self {
            Self::Array(_) => None,
            Self::Frame(frame) => frame.column(TARGET).ok(),
        }
    }

    /// Returns a dataset whose features are replaced by `store`; every other
    /// column is carried unchanged.
    ///
    /// # Errors
    ///
    /// Returns an alignment error if `store` does not match the layout.
    pub fn with_features(&self, store: BlockStore) -> Result<Self, BlockflowError> {
        match self {
            Self::Array(_) => Ok(Self::Array(store)),
            Self::Frame(frame) => Ok(Self::Frame(frame.with_column(FEATURES, store)?)),
        }
    }

    /// Block layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        match self {
            Self::Array(store) => store.layout(),
            Self::Frame(frame) => frame.layout(),
        }
    }

    /// Number of blocks.
    #[must_use]
    pub fn n_blocks(&self) -> usize {
        self.layout().n_blocks()
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.layout().n_rows()
    }

    /// Keeps the blocks whose global index falls in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the block count.
    pub fn take_blocks(&self, range: std::ops::Range<usize>) -> Result<Self, BlockflowError> {
        match self {
            Self::Array(store) => Ok(Self::Array(store.take_blocks(range)?)),
            Self::Frame(frame) => Ok(Self::Frame(frame.take_blocks(range)?)),
        }
    }

    /// Executes the feature column once so later consumers reuse its blocks.
    ///
    /// # Errors
    ///
    /// Propagates execution failures.
    pub fn cache(&self) -> Result<Self, BlockflowError> {
        let cached = self.features()?.cache()?;
        self.with_features(cached)
    }

    /// Executes features and targets and pairs them block by block.
    ///
    /// # Errors
    ///
    /// Propagates execution failures.
    pub fn batches(&self) -> Result<Vec<OwnedBatch>, BlockflowError> {
        let xs = self.features()?.blocks()?;
        let ys = self.target().map(BlockStore::blocks).transpose()?;
        Ok(match ys {
            Some(ys) => xs
                .into_iter()
                .zip(ys)
                .map(|(x, y)| OwnedBatch { x, y: Some(y) })
                .collect(),
            None => xs.into_iter().map(|x| OwnedBatch { x, y: None }).collect(),
        })
    }

    /// Executes and stacks the feature column.
    ///
    /// # Errors
    ///
    /// Propagates execution failures.
    pub fn collect_features(&self) -> Result<Block, BlockflowError> {
        self.features()?.collect()
    }
}

impl From<BlockStore> for Dataset {
    fn from(store: BlockStore) -> Self {
        Self::Array(store)
    }
}

impl From<BlockFrame> for Dataset {
    fn from(frame: BlockFrame) -> Self {
        Self::Frame(frame)
    }
}
