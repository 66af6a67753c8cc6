//! Shared relational handle with one-transaction-per-call semantics.

use std::sync::Arc;

use datapipe_core::{PipeError, Record};
use tracing::{debug, warn};

use crate::connection::{ConnectionFactory, Row};

/// Shared handle to one relational backend.
///
/// Stateless: every call opens a fresh connection from the factory, begins a
/// transaction, executes, and on any failure rolls back and rethrows — on
/// success it commits and materializes every result row before the
/// connection closes, so no cursor outlives the call. Cloneable and safely
/// shared by many [`Table`](super::Table) pipes; concurrent calls against
/// the same logical row are only as safe as the backend's isolation level.
#[derive(Clone)]
pub struct Database {
    factory: Arc<dyn ConnectionFactory>,
}

impl Database {
    /// Wraps a connection factory.
    #[must_use]
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Runs a row-returning statement in its own transaction and
    /// materializes every row into a [`Record`].
    ///
    /// # Errors
    ///
    /// [`PipeError::Transaction`] after rollback on any execution failure;
    /// [`PipeError::Internal`] if the connection cannot be opened.
    pub async fn query(&self, sql: &str) -> Result<Vec<Record>, PipeError> {
        debug!(sql, "relational query");
        let mut conn = self.factory.connect().await?;
        conn.begin().await.map_err(transaction_failure)?;
        let rows = match conn.query(sql).await {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(rb) = conn.rollback().await {
                    warn!(error = %rb, "rollback failed after query error");
                }
                return Err(transaction_failure(e));
            }
        };
        conn.commit().await.map_err(transaction_failure)?;
        Ok(rows.into_iter().map(materialize).collect())
    }

    /// Runs one or more row-less statements in a single transaction,
    /// returning the total affected count.
    ///
    /// # Errors
    ///
    /// [`PipeError::Transaction`] after rollback on any statement failure;
    /// earlier statements in the batch are rolled back with it — never a
    /// partial commit.
    pub async fn execute(&self, statements: &[String]) -> Result<u64, PipeError> {
        let mut conn = self.factory.connect().await?;
        conn.begin().await.map_err(transaction_failure)?;
        let mut affected = 0;
        for sql in statements {
            debug!(sql, "relational execute");
            match conn.execute(sql).await {
                Ok(count) => affected += count,
                Err(e) => {
                    if let Err(rb) = conn.rollback().await {
                        warn!(error = %rb, "rollback failed after execute error");
                    }
                    return Err(transaction_failure(e));
                }
            }
        }
        conn.commit().await.map_err(transaction_failure)?;
        Ok(affected)
    }
}

fn transaction_failure(source: anyhow::Error) -> PipeError {
    PipeError::Transaction { source }
}

fn materialize(row: Row) -> Record {
    Record::from_fields(row)
}
