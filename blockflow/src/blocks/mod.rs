//! Block store: partitioned, lazily evaluated record collections.
//!
//! A [`BlockStore`] holds an ordered list of partitions, each an ordered list
//! of [`Block`]s. A [`BlockFrame`] zips several aligned stores into named
//! columns, and a [`Dataset`] is whichever of the two a stage receives.

mod block;
mod csr;
mod dataset;
mod frame;
mod layout;
mod plan;
mod store;

pub use block::{Block, BlockKind};
pub use csr::CsrMatrix;
pub use dataset::{Batch, Dataset, OwnedBatch, FEATURES, TARGET};
pub use frame::BlockFrame;
pub use layout::Layout;
pub use plan::{BlockFn, CombineFn};
pub use store::BlockStore;
