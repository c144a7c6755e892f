//! Assertions over blocks.

use crate::blocks::Block;
use ndarray::Array2;

/// Asserts two matrices have the same shape and agree within `tol`.
pub fn assert_dense_close(actual: &Array2<f64>, expected: &Array2<f64>, tol: f64) {
    assert_eq!(
        actual.dim(),
        expected.dim(),
        "Expected shape {:?}, got {:?}",
        expected.dim(),
        actual.dim()
    );
    for ((idx, a), e) in actual.indexed_iter().zip(expected.iter()) {
        assert!(
            (a - e).abs() <= tol,
            "Mismatch at {idx:?}: expected {e}, got {a} (tolerance {tol})"
        );
    }
}

/// Asserts two blocks hold the same records. Numeric blocks compare by
/// value, so a sparse block equals its dense counterpart.
pub fn assert_blocks_equal(actual: &Block, expected: &Block) {
    match (actual.as_text(), expected.as_text()) {
        (Some(a), Some(e)) => assert_eq!(a, e, "Text blocks differ"),
        (None, None) => {
            let a = actual.to_dense().unwrap_or_else(|e| panic!("Cannot densify actual block: {e}"));
            let e = expected.to_dense().unwrap_or_else(|e| panic!("Cannot densify expected block: {e}"));
            assert_dense_close(&a, &e, 0.0);
        }
        _ => panic!("Expected a {} block, got a {} block", expected.kind(), actual.kind()),
    }
}
