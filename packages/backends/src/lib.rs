//! Datapipe backends — the concrete pipes: relational table with the
//! SQL predicate compiler, rectangular block store, and delimited file,
//! plus blocking wrappers over the async pipe operations.
//!
//! The shared model (records, schemas, bindings, expressions, pipe traits)
//! lives in `datapipe-core`.

pub mod block;
pub mod blocking;
pub mod connection;
pub mod file;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;

pub use block::{BlockExtractor, BlockMap, BlockPipe, Cell, GridSheet, Orientation, ScanExtractor};
pub use blocking::{add_blocking, delete_blocking, query_blocking};
pub use connection::{Connection, ConnectionFactory, Row};
pub use file::FilePipe;
pub use sql::{sql_literal, Database, SqlCompiler, Table};
