//! Multi-column block stores.

use super::{Block, BlockStore, Layout};
use crate::errors::{BlockflowError, SchemaError};
use std::ops::Range;
use std::sync::Arc;

/// Named, block-aligned columns.
///
/// Every column shares the same layout, so block `i` of each column
/// describes the same records.
#[derive(Debug, Clone)]
pub struct BlockFrame {
    columns: Vec<(String, BlockStore)>,
}

impl BlockFrame {
    /// Zips named stores into a frame, preserving the given column order.
    ///
    /// # Errors
    ///
    /// Returns a schema error for no columns or duplicate names, and an
    /// alignment error if any column's layout differs from the first.
    pub fn zip<S: Into<String>>(columns: Vec<(S, BlockStore)>) -> Result<Self, BlockflowError> {
        let columns: Vec<(String, BlockStore)> =
            columns.into_iter().map(|(n, s)| (n.into(), s)).collect();
        let (_, first) = columns.first().ok_or(SchemaError::Empty)?;
        for (i, (name, store)) in columns.iter().enumerate() {
            if columns[..i].iter().any(|(n, _)| n == name) {
                return Err(SchemaError::DuplicateColumn(name.clone()).into());
            }
            first
                .layout()
                .check_aligned(store.layout(), &format!("column '{name}'"))?;
        }
        Ok(Self { columns })
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Returns true if the frame has a column named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Returns one column.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the column does not exist.
    pub fn column(&self, name: &str) -> Result<&BlockStore, SchemaError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| self.missing(name))
    }

    /// Returns a frame holding only `names`, in the requested order.
    ///
    /// # Errors
    ///
    /// Returns a schema error if any column is absent or repeated.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self, BlockflowError> {
        let columns = names
            .iter()
            .map(|&name| Ok((name.to_string(), self.column(name)?.clone())))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Self::zip(columns)
    }

    /// Returns a frame with `name` replaced, or appended if absent.
    ///
    /// # Errors
    ///
    /// Returns an alignment error if `store` does not match the frame layout.
    pub fn with_column(&self, name: impl Into<String>, store: BlockStore) -> Result<Self, BlockflowError> {
        let name = name.into();
        self.layout()
            .check_aligned(store.layout(), &format!("column '{name}'"))?;
        let mut columns = self.columns.clone();
        match columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = store,
            None => columns.push((name, store)),
        }
        Ok(Self { columns })
    }

    /// Keeps the blocks whose global index falls in `range`, in every column.
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the block count.
    pub fn take_blocks(&self, range: Range<usize>) -> Result<Self, BlockflowError> {
        let columns = self
            .columns
            .iter()
            .map(|(n, s)| Ok((n.clone(), s.take_blocks(range.clone())?)))
            .collect::<Result<Vec<_>, BlockflowError>>()?;
        Ok(Self { columns })
    }

    /// Shared layout of every column.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        // zip guarantees at least one column
        self.columns[0].1.layout()
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

    /// Executes every column and returns, per block, one block per column.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any column.
    pub fn zip_columns(&self) -> Result<Vec<Vec<Arc<Block>>>, BlockflowError> {
        let executed = self
            .columns
            .iter()
            .map(|(_, s)| s.blocks())
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.n_blocks())
            .map(|i| executed.iter().map(|col| Arc::clone(&col[i])).collect())
            .collect())
    }

    /// Executes one column and stacks its blocks.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the column does not exist, or any
    /// execution failure.
    pub fn collect_column(&self, name: &str) -> Result<Block, BlockflowError> {
        self.column(name)?.collect()
    }

    fn missing(&self, name: &str) -> SchemaError {
        SchemaError::MissingColumn {
            column: name.to_string(),
            available: self.columns.iter().map(|(n, _)| n.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frame() -> BlockFrame {
        let x = BlockStore::from_block(&Block::Dense(array![[1.0], [2.0], [3.0], [4.0]]), 2, None)
            .unwrap();
        let y = BlockStore::from_block(&Block::Vector(array![0.0, 1.0, 0.0, 1.0]), 2, None).unwrap();
        BlockFrame::zip(vec![("X", x), ("y", y)]).unwrap()
    }

    #[test]
    fn test_zip_and_column_access() {
        let frame = frame();
        assert_eq!(frame.column_names(), vec!["X", "y"]);
        assert_eq!(
            frame.collect_column("y").unwrap(),
            Block::Vector(array![0.0, 1.0, 0.0, 1.0])
        );
        let err = frame.column("z").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { .. }));
    }

    #[test]
    fn test_zip_rejects_duplicates_and_misalignment() {
        let a = BlockStore::from_block(&Block::Vector(array![1.0, 2.0]), 2, None).unwrap();
        let b = BlockStore::from_block(&Block::Vector(array![1.0, 2.0]), 1, None).unwrap();

        let err = BlockFrame::zip(vec![("a", a.clone()), ("a", a.clone())]).unwrap_err();
        assert!(matches!(err, BlockflowError::Schema(SchemaError::DuplicateColumn(_))));

        let err = BlockFrame::zip(vec![("a", a), ("b", b)]).unwrap_err();
        assert!(err.is_alignment());

        let err = BlockFrame::zip(Vec::<(String, BlockStore)>::new()).unwrap_err();
        assert!(matches!(err, BlockflowError::Schema(SchemaError::Empty)));
    }

    #[test]
    fn test_select_and_with_column() {
        let frame = frame();
        let only_y = frame.select_columns(&["y"]).unwrap();
        assert_eq!(only_y.column_names(), vec!["y"]);
        assert!(frame.select_columns(&["y", "w"]).is_err());

        let doubled = frame.column("X").unwrap().map_blocks("double", |b| b.scale(2.0));
        let replaced = frame.with_column("X", doubled).unwrap();
        assert_eq!(replaced.column_names(), vec!["X", "y"]);
        assert_eq!(
            replaced.collect_column("X").unwrap(),
            Block::Dense(array![[2.0], [4.0], [6.0], [8.0]])
        );
    }

    #[test]
    fn test_zip_columns_and_take_blocks() {
        let frame = frame();
        let tuples = frame.zip_columns().unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[1][1].as_ref(), &Block::Vector(array![0.0, 1.0]));

        let tail = frame.take_blocks(1..2).unwrap();
        assert_eq!(tail.n_rows(), 2);
        assert_eq!(tail.collect_column("X").unwrap(), Block::Dense(array![[3.0], [4.0]]));
    }
}
