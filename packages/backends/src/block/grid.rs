//! In-memory grid store: the reference [`Cell`] implementation used by
//! tests and demos.

use std::sync::Arc;

use dashmap::DashMap;
use datapipe_core::{PipeError, Value};

use super::cell::{Cell, CellAddress};

/// A sparse in-memory sheet. Cloning yields another handle to the same
/// cells.
#[derive(Clone, Default)]
pub struct GridSheet {
    cells: Arc<DashMap<(i64, i64), Value>>,
}

impl GridSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cell handle at the given position.
    #[must_use]
    pub fn cell(&self, row: i64, col: i64) -> GridCell {
        GridCell {
            cells: Arc::clone(&self.cells),
            row,
            col,
        }
    }

    /// Direct read, [`Value::Null`] for an empty position.
    #[must_use]
    pub fn value(&self, row: i64, col: i64) -> Value {
        self.cells
            .get(&(row, col))
            .map_or(Value::Null, |v| v.value().clone())
    }
}

/// A position in a [`GridSheet`].
pub struct GridCell {
    cells: Arc<DashMap<(i64, i64), Value>>,
    row: i64,
    col: i64,
}

impl Cell for GridCell {
    fn get(&self) -> Result<Value, PipeError> {
        Ok(self
            .cells
            .get(&(self.row, self.col))
            .map_or(Value::Null, |v| v.value().clone()))
    }

    fn set(&self, value: &Value) -> Result<(), PipeError> {
        if matches!(value, Value::Null) {
            self.cells.remove(&(self.row, self.col));
        } else {
            self.cells.insert((self.row, self.col), value.clone());
        }
        Ok(())
    }

    fn offset(&self, rows: i64, cols: i64) -> Box<dyn Cell> {
        Box::new(GridCell {
            cells: Arc::clone(&self.cells),
            row: self.row + rows,
            col: self.col + cols,
        })
    }

    // The in-memory grid has no rendered extent, which also makes it the
    // test fixture for the swallow-autofit path.
    fn autofit(&self) -> Result<(), PipeError> {
        Err(PipeError::unsupported("autofit on an in-memory grid"))
    }

    fn address(&self) -> CellAddress {
        CellAddress {
            row: self.row,
            col: self.col,
        }
    }
}
