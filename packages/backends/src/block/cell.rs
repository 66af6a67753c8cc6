//! The cell primitive a block store must provide.

use datapipe_core::{PipeError, Value};

/// Absolute grid position of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Zero-based row.
    pub row: i64,
    /// Zero-based column.
    pub col: i64,
}

/// An addressable cell in a rectangular store.
///
/// This is the narrow contract the block pipe consumes; a spreadsheet
/// adapter or the in-memory [`GridSheet`](crate::block::GridSheet) both
/// satisfy it. `autofit` may legitimately be unimplemented — callers treat
/// its failure as cosmetic.
pub trait Cell: Send + Sync {
    /// Reads the cell value; an empty cell reads as [`Value::Null`].
    fn get(&self) -> Result<Value, PipeError>;

    /// Writes the cell value.
    fn set(&self, value: &Value) -> Result<(), PipeError>;

    /// A new cell handle displaced by the given rows and columns.
    /// `offset(0, 0)` duplicates the handle.
    fn offset(&self, rows: i64, cols: i64) -> Box<dyn Cell>;

    /// Auto-sizes the row/column this cell sweeps. Backends without the
    /// operation return [`PipeError::Unsupported`].
    fn autofit(&self) -> Result<(), PipeError>;

    /// The cell's absolute position.
    fn address(&self) -> CellAddress;
}
