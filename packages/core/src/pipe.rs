//! Pipe capability traits: the read/write contract every backing store
//! implements.
//!
//! Deliberately small so a backend implements only what it can support:
//! [`QueryPipe`] (read), [`AddPipe`] (write), and [`Pipe`] (read + write +
//! server-side delete). All operations are async; blocking callers wrap
//! them, never the reverse. Used as `Arc<dyn QueryPipe>` / `Arc<dyn AddPipe>`.

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::PipeError;
use crate::expr::{eval, Expr};
use crate::record::Record;
use crate::value::Value;

/// Lazily-produced query results.
///
/// Every pipe streams except the relational one, which fully materializes
/// inside its transaction scope and then streams the materialized rows.
pub type RecordStream = BoxStream<'static, Result<Record, PipeError>>;

/// Read capability.
#[async_trait]
pub trait QueryPipe: Send + Sync {
    /// Whether this backend supports two-way binding on returned records.
    fn can_binding(&self) -> bool {
        false
    }

    /// Queries the store.
    ///
    /// `predicate` of `None` means "don't filter" (or filtering is
    /// meaningless for this source). `want_binding` requests that every
    /// returned record be wired to a live [`Binding`](crate::binding::Binding);
    /// pipes whose [`can_binding`](QueryPipe::can_binding) is `false` fail
    /// fast with [`PipeError::Unsupported`].
    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError>;
}

/// Write capability.
///
/// Appends exactly what it is given — no filtering and no transformation.
/// Callers who need filtering compose a decorator.
#[async_trait]
pub trait AddPipe: Send + Sync {
    /// Whether this backend supports two-way binding on added records.
    fn can_binding(&self) -> bool {
        false
    }

    /// Appends records to the store.
    async fn add(&self, records: Vec<Record>, want_binding: bool) -> Result<(), PipeError>;
}

/// Combined read + write + delete contract.
///
/// `delete` is separate from [`AddPipe`] because it logically requires a
/// query step the write-only capability does not have.
#[async_trait]
pub trait Pipe: QueryPipe + AddPipe {
    /// Deletes matching records server-side, without materializing a result
    /// set. `None` deletes everything.
    async fn delete(&self, predicate: Option<&Expr>) -> Result<(), PipeError>;
}

/// Guard shared by binding-incapable paths: errors when a binding was
/// requested from a pipe that cannot provide one.
pub(crate) fn reject_binding(want_binding: bool, pipe: &str) -> Result<(), PipeError> {
    if want_binding {
        Err(PipeError::unsupported(format!(
            "{pipe} does not support binding"
        )))
    } else {
        Ok(())
    }
}

/// Lazily streams `records`, applying `predicate` with the in-memory
/// evaluator; each element's ordinal is its [`Expr::Index`] value.
///
/// Shared by the collection, file, and block pipes.
#[must_use]
pub fn stream_filtered(records: Vec<Record>, predicate: Option<Expr>) -> RecordStream {
    stream::iter(records.into_iter().enumerate())
        .filter_map(move |(ordinal, record)| {
            let verdict = match &predicate {
                None => Ok(true),
                Some(expr) => match eval(expr, Some(&record), Some(ordinal)) {
                    Ok(Value::Bool(keep)) => Ok(keep),
                    Ok(other) => Err(PipeError::unsupported(format!(
                        "predicate evaluated to {}, expected bool",
                        other.kind()
                    ))),
                    Err(e) => Err(e),
                },
            };
            future::ready(match verdict {
                Ok(true) => Some(Ok(record)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;
    use crate::expr::{field, index, lit};

    fn records() -> Vec<Record> {
        (0..5)
            .map(|i| Record::from_fields([("n", Value::Int(i))]))
            .collect()
    }

    #[tokio::test]
    async fn unfiltered_stream_yields_everything() {
        let out: Vec<Record> = stream_filtered(records(), None).try_collect().await.unwrap();
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn predicate_filters_by_field() {
        let out: Vec<Record> = stream_filtered(records(), Some(field("n").ge(lit(3))))
            .try_collect()
            .await
            .unwrap();
        let values: Vec<Value> = out.iter().map(|r| r.get("n").unwrap()).collect();
        assert_eq!(values, vec![Value::Int(3), Value::Int(4)]);
    }

    #[tokio::test]
    async fn predicate_sees_the_ordinal_index() {
        let out: Vec<Record> = stream_filtered(records(), Some(index().lt(lit(2))))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn non_boolean_predicate_is_an_error() {
        let result: Result<Vec<Record>, PipeError> =
            stream_filtered(records(), Some(field("n").add(lit(1))))
                .try_collect()
                .await;
        assert!(matches!(result, Err(PipeError::Unsupported { .. })));
    }
}
