//! Deterministic datasets for tests and benches.

use crate::blocks::{Block, BlockStore, Dataset};
use crate::errors::BlockflowError;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const JUNKFOOD: [&str; 6] = [
    "the pizza pizza beer copyright",
    "the pizza burger beer copyright",
    "the the pizza beer beer copyright",
    "the burger beer beer copyright",
    "the coke burger coke copyright",
    "the coke burger burger",
];

/// Six short documents about junk food.
#[must_use]
pub fn junkfood_texts() -> Vec<String> {
    JUNKFOOD.iter().map(ToString::to_string).collect()
}

/// The junk food documents with labels `[0, 0, 0, 1, 1, 1]`, split into
/// `n_partitions` blocks.
///
/// # Errors
///
/// Fails if `n_partitions` is zero.
pub fn junkfood(n_partitions: usize) -> Result<Dataset, BlockflowError> {
    let x = BlockStore::from_texts(JUNKFOOD, n_partitions, None)?;
    let y = BlockStore::from_block(
        &Block::Vector(Array1::from(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])),
        n_partitions,
        None,
    )?;
    Dataset::supervised(x, y)
}

/// Two well-separated classes; rows alternate between labels 0 and 1.
///
/// The first half of the features (at least one) is shifted by ±2 per class,
/// the rest is noise.
#[must_use]
pub fn make_classification(n_samples: usize, n_features: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let informative = (n_features / 2).max(1);
    let labels: Array1<f64> = (0..n_samples).map(|i| if i % 2 == 0 { 0.0 } else { 1.0 }).collect();
    let x = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
        let shift = if j < informative {
            if labels[i] > 0.5 {
                2.0
            } else {
                -2.0
            }
        } else {
            0.0
        };
        let noise: f64 = (0..3).map(|_| rng.gen_range(-1.0_f64..1.0)).sum();
        shift + noise
    });
    (x, labels)
}

/// [`make_classification`] with seed 42, as a supervised dataset split into
/// `n_partitions` blocks.
///
/// # Errors
///
/// Fails if `n_partitions` is zero.
pub fn classification_frame(
    n_samples: usize,
    n_features: usize,
    n_partitions: usize,
) -> Result<Dataset, BlockflowError> {
    let (x, y) = make_classification(n_samples, n_features, 42);
    Dataset::supervised(
        BlockStore::from_block(&Block::Dense(x), n_partitions, None)?,
        BlockStore::from_block(&Block::Vector(y), n_partitions, None)?,
    )
}
