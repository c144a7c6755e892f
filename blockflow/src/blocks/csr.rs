//! Compressed sparse row matrix used for sparse blocks.

use crate::errors::BlockflowError;
use ndarray::Array2;
use std::ops::Range;

/// Sparse matrix in CSR format (f64 values).
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Row pointers: `row_ptr[i]..row_ptr[i + 1]` indexes the entries of row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices for each stored entry.
    pub col_indices: Vec<usize>,
    /// Values for each stored entry.
    pub values: Vec<f64>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl CsrMatrix {
    /// Creates an empty matrix with the given number of columns.
    #[must_use]
    pub fn empty(cols: usize) -> Self {
        Self {
            row_ptr: vec![0],
            col_indices: Vec::new(),
            values: Vec::new(),
            rows: 0,
            cols,
        }
    }

    /// Builds a matrix from per-row `(column, value)` entries.
    ///
    /// Entries within a row are sorted by column; zero values are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if any column index is out of range.
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>, cols: usize) -> Result<Self, BlockflowError> {
        let mut out = Self::empty(cols);
        for mut row in rows {
            row.sort_by_key(|(c, _)| *c);
            for (c, v) in row {
                if c >= cols {
                    return Err(BlockflowError::invalid_input(format!(
                        "column index {c} out of range for {cols} columns"
                    )));
                }
                if v != 0.0 {
                    out.col_indices.push(c);
                    out.values.push(v);
                }
            }
            out.row_ptr.push(out.values.len());
            out.rows += 1;
        }
        Ok(out)
    }

    /// Converts a dense matrix, keeping only non-zero entries.
    #[must_use]
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (rows, cols) = dense.dim();
        let mut out = Self::empty(cols);
        for row in dense.rows() {
            for (c, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    out.col_indices.push(c);
                    out.values.push(v);
                }
            }
            out.row_ptr.push(out.values.len());
        }
        out.rows = rows;
        out
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Returns `(rows, cols)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Iterates the stored entries of one row.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_indices[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    /// Densifies the matrix.
    #[must_use]
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.rows, self.cols));
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                dense[[i, c]] = v;
            }
        }
        dense
    }

    /// Returns the rows in `range` as a new matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the row count.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self, BlockflowError> {
        if range.start > range.end || range.end > self.rows {
            return Err(BlockflowError::invalid_input(format!(
                "row range {range:?} out of bounds for {} rows",
                self.rows
            )));
        }
        let lo = self.row_ptr[range.start];
        let hi = self.row_ptr[range.end];
        Ok(Self {
            row_ptr: self.row_ptr[range.start..=range.end]
                .iter()
                .map(|p| p - lo)
                .collect(),
            col_indices: self.col_indices[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
            rows: range.end - range.start,
            cols: self.cols,
        })
    }

    /// Keeps only the listed columns, renumbered in the given order.
    #[must_use]
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        let mut remap = vec![None; self.cols];
        for (new, &old) in keep.iter().enumerate() {
            if old < self.cols {
                remap[old] = Some(new);
            }
        }
        let mut out = Self::empty(keep.len());
        for i in 0..self.rows {
            let mut entries: Vec<(usize, f64)> = self
                .row(i)
                .filter_map(|(c, v)| remap[c].map(|n| (n, v)))
                .collect();
            entries.sort_by_key(|(c, _)| *c);
            for (c, v) in entries {
                out.col_indices.push(c);
                out.values.push(v);
            }
            out.row_ptr.push(out.values.len());
        }
        out.rows = self.rows;
        out
    }

    /// Multiplies every entry by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for v in &mut out.values {
            *v *= factor;
        }
        out
    }

    /// Stacks matrices vertically, preserving row order.
    ///
    /// # Errors
    ///
    /// Returns an error if the column counts differ or `parts` is empty.
    pub fn vstack(parts: &[&Self]) -> Result<Self, BlockflowError> {
        let first = parts
            .first()
            .ok_or_else(|| BlockflowError::invalid_input("cannot vstack zero sparse blocks"))?;
        let mut out = Self::empty(first.cols);
        for part in parts {
            if part.cols != first.cols {
                return Err(BlockflowError::invalid_input(format!(
                    "cannot vstack sparse blocks with {} and {} columns",
                    first.cols, part.cols
                )));
            }
            let offset = out.values.len();
            out.col_indices.extend_from_slice(&part.col_indices);
            out.values.extend_from_slice(&part.values);
            out.row_ptr
                .extend(part.row_ptr.iter().skip(1).map(|p| p + offset));
            out.rows += part.rows;
        }
        Ok(out)
    }

    /// Concatenates matrices column-wise, preserving column order.
    ///
    /// # Errors
    ///
    /// Returns an error if the row counts differ or `parts` is empty.
    pub fn hstack(parts: &[&Self]) -> Result<Self, BlockflowError> {
        let first = parts
            .first()
            .ok_or_else(|| BlockflowError::invalid_input("cannot hstack zero sparse blocks"))?;
        let rows = first.rows;
        if let Some(bad) = parts.iter().find(|p| p.rows != rows) {
            return Err(BlockflowError::invalid_input(format!(
                "cannot hstack sparse blocks with {rows} and {} rows",
                bad.rows
            )));
        }
        let mut out = Self::empty(parts.iter().map(|p| p.cols).sum());
        for i in 0..rows {
            let mut offset = 0;
            for part in parts {
                for (c, v) in part.row(i) {
                    out.col_indices.push(c + offset);
                    out.values.push(v);
                }
                offset += part.cols;
            }
            out.row_ptr.push(out.values.len());
        }
        out.rows = rows;
        Ok(out)
    }
}
