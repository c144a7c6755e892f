//! Deferred execution plans for block stores.
//!
//! Building a store only records a plan node. Nodes run when a terminal
//! operation asks for blocks; each block of a node is computed independently
//! on the rayon pool, so per-block functions must not share mutable state.

use super::{Block, Layout};
use crate::errors::{AlignmentError, BlockflowError};
use rayon::prelude::*;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A per-block function.
pub type BlockFn = Arc<dyn Fn(&Block) -> Result<Block, BlockflowError> + Send + Sync>;

/// A function over the aligned blocks of several inputs.
pub type CombineFn = Arc<dyn Fn(&[&Block]) -> Result<Block, BlockflowError> + Send + Sync>;

pub(crate) enum PlanNode {
    Source {
        blocks: Vec<Arc<Block>>,
    },
    Map {
        parent: Arc<Plan>,
        op: String,
        f: BlockFn,
    },
    Combine {
        parents: Vec<Arc<Plan>>,
        op: String,
        f: CombineFn,
    },
    Select {
        parent: Arc<Plan>,
        range: Range<usize>,
    },
}

/// A plan node together with the layout it promises to produce.
pub(crate) struct Plan {
    pub(crate) node: PlanNode,
    pub(crate) layout: Layout,
}

impl Plan {
    pub(crate) fn source(partitions: Vec<Vec<Block>>) -> Self {
        let layout = Layout::new(
            partitions
                .iter()
                .map(|p| p.iter().map(Block::n_rows).collect())
                .collect(),
        );
        let blocks = partitions.into_iter().flatten().map(Arc::new).collect();
        Self {
            node: PlanNode::Source { blocks },
            layout,
        }
    }

    pub(crate) fn from_shared(blocks: Vec<Arc<Block>>, layout: Layout) -> Self {
        Self {
            node: PlanNode::Source { blocks },
            layout,
        }
    }

    pub(crate) const fn is_source(&self) -> bool {
        matches!(self.node, PlanNode::Source { .. })
    }

    /// Runs the plan and returns its blocks in partition-then-block order.
    pub(crate) fn execute(&self) -> Result<Vec<Arc<Block>>, BlockflowError> {
        let expected = self.layout.block_rows();
        match &self.node {
            PlanNode::Source { blocks } => Ok(blocks.clone()),
            PlanNode::Map { parent, op, f } => {
                let input = parent.execute()?;
                tracing::trace!(op = %op, blocks = input.len(), "Executing map");
                input
                    .par_iter()
                    .enumerate()
                    .map(|(i, block)| {
                        let out = f(block)?;
                        check_rows(op, i, expected[i], &out)?;
                        Ok(Arc::new(out))
                    })
                    .collect()
            }
            PlanNode::Combine { parents, op, f } => {
                let inputs: Vec<Vec<Arc<Block>>> = parents
                    .par_iter()
                    .map(|p| p.execute())
                    .collect::<Result<_, _>>()?;
                for input in &inputs {
                    if input.len() != expected.len() {
                        return Err(
                            AlignmentError::block_count(op.as_str(), expected.len(), input.len())
                                .into(),
                        );
                    }
                }
                tracing::trace!(op = %op, inputs = inputs.len(), blocks = expected.len(), "Executing combine");
                (0..expected.len())
                    .into_par_iter()
                    .map(|i| {
                        let row: Vec<&Block> = inputs.iter().map(|input| input[i].as_ref()).collect();
                        let out = f(&row)?;
                        check_rows(op, i, expected[i], &out)?;
                        Ok(Arc::new(out))
                    })
                    .collect()
            }
            PlanNode::Select { parent, range } => {
                let input = parent.execute()?;
                Ok(input[range.clone()].to_vec())
            }
        }
    }

    /// Operation names from the source to this node.
    pub(crate) fn lineage(&self) -> Vec<String> {
        match &self.node {
            PlanNode::Source { .. } => vec!["source".to_string()],
            PlanNode::Map { parent, op, .. } => {
                let mut lineage = parent.lineage();
                lineage.push(op.clone());
                lineage
            }
            PlanNode::Combine { parents, op, .. } => {
                let mut lineage = parents.first().map(|p| p.lineage()).unwrap_or_default();
                lineage.push(format!("{op}[{}]", parents.len()));
                lineage
            }
            PlanNode::Select { parent, range } => {
                let mut lineage = parent.lineage();
                lineage.push(format!("take_blocks[{}..{}]", range.start, range.end));
                lineage
            }
        }
    }
}

fn check_rows(op: &str, index: usize, expected: usize, out: &Block) -> Result<(), AlignmentError> {
    if out.n_rows() == expected {
        Ok(())
    } else {
        Err(AlignmentError::block_rows(op, index, expected, out.n_rows()))
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("lineage", &self.lineage())
            .field("layout", &self.layout)
            .finish()
    }
}
