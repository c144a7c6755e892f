//! Partitioned, lazily evaluated collections of blocks.

use super::plan::{BlockFn, CombineFn, Plan, PlanNode};
use super::{Block, Layout};
use crate::config::ExecutionConfig;
use crate::errors::BlockflowError;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A partitioned collection of [`Block`]s.
///
/// Operations such as [`map_blocks`](Self::map_blocks) only extend a plan;
/// [`collect`](Self::collect), [`blocks`](Self::blocks) and
/// [`cache`](Self::cache) execute it. Partition order and block order are
/// preserved by every operation. Cloning is cheap and shares the plan.
#[derive(Clone)]
pub struct BlockStore {
    plan: Arc<Plan>,
}

impl BlockStore {
    /// Creates a store from explicit partitions. Empty partitions are dropped.
    #[must_use]
    pub fn from_partitions(partitions: Vec<Vec<Block>>) -> Self {
        Self {
            plan: Arc::new(Plan::source(partitions)),
        }
    }

    /// Splits one block into `n_partitions` partitions of near-equal size,
    /// then chunks each partition into blocks of at most `block_size` rows.
    ///
    /// Partition `i` of `p` receives rows `[i*n/p, (i+1)*n/p)`. Without a
    /// block size, each partition holds a single block.
    ///
    /// # Errors
    ///
    /// Returns an error if `n_partitions` or `block_size` is zero.
    pub fn from_block(
        block: &Block,
        n_partitions: usize,
        block_size: Option<usize>,
    ) -> Result<Self, BlockflowError> {
        if n_partitions == 0 {
            return Err(BlockflowError::invalid_input("n_partitions must be at least 1"));
        }
        if block_size == Some(0) {
            return Err(BlockflowError::invalid_input("block_size must be at least 1"));
        }
        let n = block.n_rows();
        let mut partitions = Vec::with_capacity(n_partitions);
        for i in 0..n_partitions {
            let lo = i * n / n_partitions;
            let hi = (i + 1) * n / n_partitions;
            let step = block_size.unwrap_or_else(|| (hi - lo).max(1));
            let mut blocks = Vec::new();
            let mut start = lo;
            while start < hi {
                let end = (start + step).min(hi);
                blocks.push(block.slice_rows(start..end)?);
                start = end;
            }
            partitions.push(blocks);
        }
        Ok(Self::from_partitions(partitions))
    }

    /// Partitions a block as described by `config`.
    ///
    /// # Errors
    ///
    /// See [`from_block`](Self::from_block).
    pub fn from_block_with(block: &Block, config: &ExecutionConfig) -> Result<Self, BlockflowError> {
        Self::from_block(block, config.n_partitions, config.block_size)
    }

    /// Convenience constructor for text records.
    ///
    /// # Errors
    ///
    /// See [`from_block`](Self::from_block).
    pub fn from_texts<I, S>(
        texts: I,
        n_partitions: usize,
        block_size: Option<usize>,
    ) -> Result<Self, BlockflowError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let block = Block::Text(texts.into_iter().map(Into::into).collect());
        Self::from_block(&block, n_partitions, block_size)
    }

    /// Block layout of the store. Never executes the plan.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.plan.layout
    }

    /// Number of partitions.
    #[must_use]
    pub fn n_partitions(&self) -> usize {
        self.layout().n_partitions()
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

    /// Applies `f` to every block independently.
    ///
    /// `f` must return a block with the same row count as its input; a
    /// mismatch surfaces as an alignment error when the store executes.
    #[must_use]
    pub fn map_blocks<F>(&self, op: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Block) -> Result<Block, BlockflowError> + Send + Sync + 'static,
    {
        let f: BlockFn = Arc::new(f);
        Self {
            plan: Arc::new(Plan {
                layout: self.plan.layout.clone(),
                node: PlanNode::Map {
                    parent: Arc::clone(&self.plan),
                    op: op.into(),
                    f,
                },
            }),
        }
    }

    /// Combines this store with `others` block by block.
    ///
    /// `f` receives the aligned blocks of every input, this store first.
    ///
    /// # Errors
    ///
    /// Returns an alignment error if any input's layout differs from this one.
    pub fn zip_with<F>(&self, others: &[&Self], op: impl Into<String>, f: F) -> Result<Self, BlockflowError>
    where
        F: Fn(&[&Block]) -> Result<Block, BlockflowError> + Send + Sync + 'static,
    {
        let op = op.into();
        for other in others {
            self.layout().check_aligned(other.layout(), &op)?;
        }
        let mut parents = Vec::with_capacity(others.len() + 1);
        parents.push(Arc::clone(&self.plan));
        parents.extend(others.iter().map(|o| Arc::clone(&o.plan)));
        let f: CombineFn = Arc::new(f);
        Ok(Self {
            plan: Arc::new(Plan {
                layout: self.plan.layout.clone(),
                node: PlanNode::Combine { parents, op, f },
            }),
        })
    }

    /// Keeps the blocks whose global index falls in `range`.
    ///
    /// This is how row ranges are expressed: slicing is block-aligned.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the block count.
    pub fn take_blocks(&self, range: Range<usize>) -> Result<Self, BlockflowError> {
        let layout = self.layout().take(&range)?;
        Ok(Self {
            plan: Arc::new(Plan {
                layout,
                node: PlanNode::Select {
                    parent: Arc::clone(&self.plan),
                    range,
                },
            }),
        })
    }

    /// Executes the plan and returns every block in order.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any block function.
    pub fn blocks(&self) -> Result<Vec<Arc<Block>>, BlockflowError> {
        self.plan.execute()
    }

    /// Executes the plan and groups the blocks by partition.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any block function.
    pub fn partitions(&self) -> Result<Vec<Vec<Arc<Block>>>, BlockflowError> {
        let mut blocks = self.blocks()?.into_iter();
        Ok(self
            .layout()
            .partitions()
            .iter()
            .map(|p| blocks.by_ref().take(p.len()).collect())
            .collect())
    }

    /// Executes the plan and stacks every block into one, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no blocks (for instance after
    /// `take_blocks` with an empty range), blocks cannot be stacked, or any
    /// block function fails.
    pub fn collect(&self) -> Result<Block, BlockflowError> {
        if self.n_blocks() == 0 {
            return Err(BlockflowError::invalid_input(
                "cannot collect a store with no blocks; its layout is empty",
            ));
        }
        let blocks = self.blocks()?;
        let refs: Vec<&Block> = blocks.iter().map(AsRef::as_ref).collect();
        Block::vstack(&refs)
    }

    /// Runs [`collect`](Self::collect) inside the given rayon pool.
    ///
    /// # Errors
    ///
    /// See [`collect`](Self::collect).
    pub fn collect_in(&self, pool: &rayon::ThreadPool) -> Result<Block, BlockflowError> {
        pool.install(|| self.collect())
    }

    /// Executes the plan once and returns a store backed by the results.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any block function.
    pub fn cache(&self) -> Result<Self, BlockflowError> {
        if self.plan.is_source() {
            return Ok(self.clone());
        }
        let blocks = self.blocks()?;
        Ok(Self {
            plan: Arc::new(Plan::from_shared(blocks, self.layout().clone())),
        })
    }

    /// Returns true if the store holds executed blocks.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.plan.is_source()
    }

    /// Operation names from the source to this store.
    #[must_use]
    pub fn lineage(&self) -> Vec<String> {
        self.plan.lineage()
    }
}

impl fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockStore")
            .field("partitions", &self.n_partitions())
            .field("blocks", &self.n_blocks())
            .field("rows", &self.n_rows())
            .field("lineage", &self.lineage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(n: usize) -> Block {
        Block::Vector(Array1::from_iter((0..n).map(|i| i as f64)))
    }

    #[test]
    fn test_from_block_partitions_evenly() {
        let store = BlockStore::from_block(&numbers(10), 3, None).unwrap();
        assert_eq!(store.layout().partitions(), &[vec![3], vec![3], vec![4]]);
        assert_eq!(store.n_rows(), 10);
    }

    #[test]
    fn test_from_block_chunks_by_block_size() {
        let store = BlockStore::from_block(&numbers(10), 2, Some(2)).unwrap();
        assert_eq!(store.layout().partitions(), &[vec![2, 2, 1], vec![2, 2, 1]]);
        assert_eq!(store.collect().unwrap(), numbers(10));
    }

    #[test]
    fn test_from_block_drops_empty_partitions() {
        let store = BlockStore::from_block(&numbers(2), 4, None).unwrap();
        assert_eq!(store.n_partitions(), 2);
        assert_eq!(store.n_blocks(), 2);
        assert!(BlockStore::from_block(&numbers(2), 0, None).is_err());
        assert!(BlockStore::from_block(&numbers(2), 1, Some(0)).is_err());
    }

    #[test]
    fn test_map_blocks_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let store = BlockStore::from_block(&numbers(6), 3, None).unwrap();
        let doubled = store.map_blocks("double", move |b| {
            counter.fetch_add(1, Ordering::SeqCst);
            b.scale(2.0)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.layout(), store.layout());

        let out = doubled.collect().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out, Block::Vector(array![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]));
    }

    #[test]
    fn test_map_blocks_row_change_is_alignment_error() {
        let store = BlockStore::from_block(&numbers(4), 2, None).unwrap();
        let shrunk = store.map_blocks("drop_first", |b| b.slice_rows(1..b.n_rows()));
        let err = shrunk.collect().unwrap_err();
        assert!(err.is_alignment());
    }

    #[test]
    fn test_zip_with_combines_aligned_blocks() {
        let a = BlockStore::from_block(&Block::Dense(array![[1.0], [2.0], [3.0]]), 2, None).unwrap();
        let b = a.map_blocks("triple", |blk| blk.scale(3.0));
        let joined = a.zip_with(&[&b], "hstack", Block::hstack).unwrap();
        assert_eq!(
            joined.collect().unwrap(),
            Block::Dense(array![[1.0, 3.0], [2.0, 6.0], [3.0, 9.0]])
        );
    }

    #[test]
    fn test_zip_with_rejects_misaligned() {
        let a = BlockStore::from_block(&numbers(4), 2, None).unwrap();
        let b = BlockStore::from_block(&numbers(4), 1, None).unwrap();
        let err = a.zip_with(&[&b], "hstack", Block::hstack).unwrap_err();
        assert!(err.is_alignment());
    }

    #[test]
    fn test_take_blocks_and_partitions() {
        let store = BlockStore::from_block(&numbers(6), 2, Some(1)).unwrap();
        let taken = store.take_blocks(2..5).unwrap();
        assert_eq!(taken.collect().unwrap(), Block::Vector(array![2.0, 3.0, 4.0]));

        let parts = taken.partitions().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 1);
        assert_eq!(parts[1].len(), 2);
        assert!(store.take_blocks(4..7).is_err());
    }

    #[test]
    fn test_collect_empty_selection_is_invalid_input() {
        let store = BlockStore::from_block(&numbers(6), 2, Some(1)).unwrap();
        let empty = store.take_blocks(0..0).unwrap();
        assert_eq!(empty.n_blocks(), 0);
        match empty.collect().unwrap_err() {
            BlockflowError::InvalidInput(message) => assert!(message.contains("no blocks"), "{message}"),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_and_lineage() {
        let store = BlockStore::from_block(&numbers(4), 2, None).unwrap();
        let mapped = store.map_blocks("negate", |b| b.scale(-1.0));
        assert!(!mapped.is_materialized());
        assert_eq!(mapped.lineage(), vec!["source".to_string(), "negate".to_string()]);

        let cached = mapped.cache().unwrap();
        assert!(cached.is_materialized());
        assert_eq!(cached.collect().unwrap(), mapped.collect().unwrap());
    }

    #[test]
    fn test_from_block_with_config() {
        let config = ExecutionConfig::default().with_n_partitions(2).with_block_size(Some(2));
        let store = BlockStore::from_block_with(&numbers(5), &config).unwrap();
        assert_eq!(store.layout().partitions(), &[vec![2], vec![2, 1]]);
    }
}
