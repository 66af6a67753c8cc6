//! Relational backend: predicate-to-SQL compilation, transactional statement
//! execution, and the table pipe.

pub mod compiler;
pub mod database;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use compiler::{sql_literal, SqlCompiler};
pub use database::Database;
pub use table::Table;
