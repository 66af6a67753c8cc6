//! Rectangular block-store backend: cell primitive, block layout, in-memory
//! grid, and the block pipe.

pub mod cell;
pub mod grid;
pub mod map;
pub mod pipe;

pub use cell::{Cell, CellAddress};
pub use grid::{GridCell, GridSheet};
pub use map::{BlockMap, FieldBlock, Orientation};
pub use pipe::{BlockExtractor, BlockPipe, ScanExtractor};
