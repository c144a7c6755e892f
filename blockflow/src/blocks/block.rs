//! A single block of records.

use super::CsrMatrix;
use crate::errors::BlockflowError;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis, Slice};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// The variant of a block, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Raw text records.
    Text,
    /// Dense 2-D feature matrix.
    Dense,
    /// Sparse 2-D feature matrix.
    Sparse,
    /// 1-D values (labels, predictions).
    Vector,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Dense => write!(f, "dense"),
            Self::Sparse => write!(f, "sparse"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// A contiguous, homogeneous chunk of records.
///
/// Every variant has a row count; the rows of a block never reorder.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// One string per record.
    Text(Vec<String>),
    /// One row per record.
    Dense(Array2<f64>),
    /// One sparse row per record.
    Sparse(CsrMatrix),
    /// One value per record.
    Vector(Array1<f64>),
}

impl Block {
    /// Returns the block variant.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        match self {
            Self::Text(_) => BlockKind::Text,
            Self::Dense(_) => BlockKind::Dense,
            Self::Sparse(_) => BlockKind::Sparse,
            Self::Vector(_) => BlockKind::Vector,
        }
    }

    /// Number of records in the block.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Dense(m) => m.nrows(),
            Self::Sparse(m) => m.rows,
            Self::Vector(v) => v.len(),
        }
    }

    /// Number of feature columns, if the block is a matrix.
    #[must_use]
    pub fn n_cols(&self) -> Option<usize> {
        match self {
            Self::Text(_) => None,
            Self::Dense(m) => Some(m.ncols()),
            Self::Sparse(m) => Some(m.cols),
            Self::Vector(_) => Some(1),
        }
    }

    /// Returns the text records, if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the values, if this is a vector block.
    #[must_use]
    pub const fn as_vector(&self) -> Option<&Array1<f64>> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a copy of the rows in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the row count.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self, BlockflowError> {
        let n = self.n_rows();
        if range.start > range.end || range.end > n {
            return Err(BlockflowError::invalid_input(format!(
                "row range {range:?} out of bounds for {n} rows"
            )));
        }
        Ok(match self {
            Self::Text(v) => Self::Text(v[range].to_vec()),
            Self::Dense(m) => Self::Dense(m.slice_axis(Axis(0), Slice::from(range)).to_owned()),
            Self::Sparse(m) => Self::Sparse(m.slice_rows(range)?),
            Self::Vector(v) => Self::Vector(v.slice_axis(Axis(0), Slice::from(range)).to_owned()),
        })
    }

    /// Densifies a matrix or vector block; vectors become one column.
    ///
    /// # Errors
    ///
    /// Returns an error for text blocks.
    pub fn to_dense(&self) -> Result<Array2<f64>, BlockflowError> {
        match self {
            Self::Dense(m) => Ok(m.clone()),
            Self::Sparse(m) => Ok(m.to_dense()),
            Self::Vector(v) => Ok(v.clone().insert_axis(Axis(1))),
            Self::Text(_) => Err(BlockflowError::invalid_input("text blocks cannot be densified")),
        }
    }

    fn to_sparse(&self) -> Result<CsrMatrix, BlockflowError> {
        match self {
            Self::Sparse(m) => Ok(m.clone()),
            other => Ok(CsrMatrix::from_dense(&other.to_dense()?)),
        }
    }

    /// Multiplies every value by `factor`. A factor of exactly 1 is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when scaling a text block by anything other than 1.
    #[allow(clippy::float_cmp)]
    pub fn scale(&self, factor: f64) -> Result<Self, BlockflowError> {
        if factor == 1.0 {
            return Ok(self.clone());
        }
        match self {
            Self::Dense(m) => Ok(Self::Dense(m * factor)),
            Self::Sparse(m) => Ok(Self::Sparse(m.scale(factor))),
            Self::Vector(v) => Ok(Self::Vector(v * factor)),
            Self::Text(_) => Err(BlockflowError::invalid_input("text blocks cannot be scaled")),
        }
    }

    /// Stacks blocks vertically in the given order.
    ///
    /// Mixing dense and sparse blocks yields a sparse block.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty slice, mixed text/numeric blocks, or
    /// matrices of different widths.
    pub fn vstack(parts: &[&Self]) -> Result<Self, BlockflowError> {
        let first = parts
            .first()
            .ok_or_else(|| BlockflowError::invalid_input("cannot stack zero blocks"))?;
        let kinds_match = parts.iter().all(|p| p.kind() == first.kind());

        match first {
            Self::Text(_) if kinds_match => Ok(Self::Text(
                parts
                    .iter()
                    .filter_map(|p| p.as_text())
                    .flat_map(|t| t.iter().cloned())
                    .collect(),
            )),
            Self::Vector(_) if kinds_match => {
                let views: Vec<_> = parts
                    .iter()
                    .filter_map(|p| p.as_vector())
                    .map(|v| v.view())
                    .collect();
                concatenate(Axis(0), &views)
                    .map(Self::Vector)
                    .map_err(|e| BlockflowError::invalid_input(e.to_string()))
            }
            Self::Dense(_) if kinds_match => {
                let dense: Vec<Array2<f64>> =
                    parts.iter().map(|p| p.to_dense()).collect::<Result<_, _>>()?;
                let views: Vec<ArrayView2<'_, f64>> = dense.iter().map(|m| m.view()).collect();
                concatenate(Axis(0), &views)
                    .map(Self::Dense)
                    .map_err(|e| BlockflowError::invalid_input(e.to_string()))
            }
            _ if parts.iter().any(|p| p.kind() == BlockKind::Text) => Err(
                BlockflowError::invalid_input("cannot stack text blocks with numeric blocks"),
            ),
            _ => {
                let sparse: Vec<CsrMatrix> =
                    parts.iter().map(|p| p.to_sparse()).collect::<Result<_, _>>()?;
                let refs: Vec<&CsrMatrix> = sparse.iter().collect();
                CsrMatrix::vstack(&refs).map(Self::Sparse)
            }
        }
    }

    /// Concatenates blocks column-wise in the given order.
    ///
    /// Any sparse input makes the result sparse; vectors count as one column.
    ///
    /// # Errors
    ///
    /// Returns an error for text blocks or differing row counts.
    pub fn hstack(parts: &[&Self]) -> Result<Self, BlockflowError> {
        if parts.is_empty() {
            return Err(BlockflowError::invalid_input("cannot concatenate zero blocks"));
        }
        if parts.iter().any(|p| p.kind() == BlockKind::Text) {
            return Err(BlockflowError::invalid_input(
                "text blocks cannot be concatenated column-wise",
            ));
        }
        if parts.iter().any(|p| p.kind() == BlockKind::Sparse) {
            let sparse: Vec<CsrMatrix> =
                parts.iter().map(|p| p.to_sparse()).collect::<Result<_, _>>()?;
            let refs: Vec<&CsrMatrix> = sparse.iter().collect();
            return CsrMatrix::hstack(&refs).map(Self::Sparse);
        }
        let dense: Vec<Array2<f64>> = parts.iter().map(|p| p.to_dense()).collect::<Result<_, _>>()?;
        let views: Vec<ArrayView2<'_, f64>> = dense.iter().map(|m| m.view()).collect();
        concatenate(Axis(1), &views)
            .map(Self::Dense)
            .map_err(|e| BlockflowError::invalid_input(e.to_string()))
    }
}

impl From<Array2<f64>> for Block {
    fn from(m: Array2<f64>) -> Self {
        Self::Dense(m)
    }
}

impl From<Array1<f64>> for Block {
    fn from(v: Array1<f64>) -> Self {
        Self::Vector(v)
    }
}

impl From<CsrMatrix> for Block {
    fn from(m: CsrMatrix) -> Self {
        Self::Sparse(m)
    }
}

impl From<Vec<String>> for Block {
    fn from(v: Vec<String>) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_row_counts() {
        assert_eq!(Block::Text(vec!["a".into(), "b".into()]).n_rows(), 2);
        assert_eq!(Block::Dense(Array2::zeros((3, 4))).n_rows(), 3);
        assert_eq!(Block::Vector(array![1.0]).n_rows(), 1);
        assert_eq!(Block::Dense(Array2::zeros((3, 4))).n_cols(), Some(4));
    }

    #[test]
    fn test_vstack_dense_keeps_order() {
        let a = Block::Dense(array![[1.0, 2.0]]);
        let b = Block::Dense(array![[3.0, 4.0], [5.0, 6.0]]);
        let stacked = Block::vstack(&[&a, &b]).unwrap();
        assert_eq!(stacked, Block::Dense(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]));
    }

    #[test]
    fn test_vstack_mixed_becomes_sparse() {
        let a = Block::Dense(array![[1.0, 0.0]]);
        let b = Block::Sparse(CsrMatrix::from_dense(&array![[0.0, 2.0]]));
        let stacked = Block::vstack(&[&a, &b]).unwrap();
        assert_eq!(stacked.kind(), BlockKind::Sparse);
        assert_eq!(stacked.to_dense().unwrap(), array![[1.0, 0.0], [0.0, 2.0]]);
    }

    #[test]
    fn test_vstack_rejects_text_with_numbers() {
        let a = Block::Text(vec!["x".into()]);
        let b = Block::Vector(array![1.0]);
        assert!(Block::vstack(&[&a, &b]).is_err());
        assert!(Block::vstack(&[]).is_err());
    }

    #[test]
    fn test_hstack_dense_and_vector() {
        let a = Block::Dense(array![[1.0], [2.0]]);
        let b = Block::Vector(array![3.0, 4.0]);
        let joined = Block::hstack(&[&a, &b]).unwrap();
        assert_eq!(joined, Block::Dense(array![[1.0, 3.0], [2.0, 4.0]]));
    }

    #[test]
    fn test_hstack_row_mismatch() {
        let a = Block::Dense(array![[1.0], [2.0]]);
        let b = Block::Dense(array![[1.0]]);
        assert!(Block::hstack(&[&a, &b]).is_err());
    }

    #[test]
    fn test_scale() {
        let a = Block::Sparse(CsrMatrix::from_dense(&array![[1.0, 0.0]]));
        let scaled = a.scale(10.0).unwrap();
        assert_eq!(scaled.to_dense().unwrap(), array![[10.0, 0.0]]);

        let text = Block::Text(vec!["x".into()]);
        assert_eq!(text.scale(1.0).unwrap(), text);
        assert!(text.scale(2.0).is_err());
    }

    #[test]
    fn test_slice_rows() {
        let v = Block::Vector(array![1.0, 2.0, 3.0]);
        assert_eq!(v.slice_rows(1..3).unwrap(), Block::Vector(array![2.0, 3.0]));
        assert!(v.slice_rows(2..5).is_err());
    }

    #[test]
    fn test_slice_rows_dense_keeps_all_columns() {
        let m = Block::Dense(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(m.slice_rows(1..3).unwrap(), Block::Dense(array![[3.0, 4.0], [5.0, 6.0]]));
        assert_eq!(m.slice_rows(2..2).unwrap().n_rows(), 0);
        assert_eq!(m.slice_rows(2..2).unwrap().n_cols(), Some(2));
    }
}
