//! Narrow relational connection contract consumed by the relational pipe.
//!
//! The core never caches or pools connections: a [`ConnectionFactory`]
//! produces a ready-to-use, side-effect-free connection per call, and
//! [`Database`](crate::sql::Database) bounds every connection's lifetime to
//! one call. A `sqlx`-backed Postgres implementation lives in
//! [`postgres`](crate::postgres) behind the `postgres` feature.

use async_trait::async_trait;
use datapipe_core::Value;

/// One materialized result row: `(column, value)` in select order.
pub type Row = Vec<(String, Value)>;

/// A single open relational connection with explicit transaction control.
///
/// Used as `Box<dyn Connection>`; dropped at the end of every
/// [`Database`](crate::sql::Database) call.
#[async_trait]
pub trait Connection: Send {
    /// Begins a transaction.
    async fn begin(&mut self) -> anyhow::Result<()>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> anyhow::Result<()>;

    /// Rolls the current transaction back.
    async fn rollback(&mut self) -> anyhow::Result<()>;

    /// Runs a statement that returns rows, materializing all of them.
    async fn query(&mut self, sql: &str) -> anyhow::Result<Vec<Row>>;

    /// Runs a statement that returns no rows; yields the affected count.
    async fn execute(&mut self, sql: &str) -> anyhow::Result<u64>;
}

/// No-argument factory producing ready-to-use connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a fresh connection.
    async fn connect(&self) -> anyhow::Result<Box<dyn Connection>>;
}
