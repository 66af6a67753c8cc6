//! Blocking wrappers over the async pipe operations.
//!
//! Thin by construction: each wrapper spins a current-thread runtime and
//! drives the async call to completion. The async operations are never
//! implemented in terms of these. Must not be called from inside an async
//! context.

use datapipe_core::{AddPipe, Expr, Pipe, PipeError, QueryPipe, Record};
use futures_util::TryStreamExt;
use tokio::runtime::{Builder, Runtime};

fn runtime() -> Result<Runtime, PipeError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PipeError::Internal(e.into()))
}

/// Queries `pipe` and collects the whole result.
pub fn query_blocking(
    pipe: &dyn QueryPipe,
    predicate: Option<&Expr>,
    want_binding: bool,
) -> Result<Vec<Record>, PipeError> {
    runtime()?.block_on(async {
        pipe.query(predicate, want_binding)
            .await?
            .try_collect()
            .await
    })
}

/// Appends `records` through `pipe`.
pub fn add_blocking(
    pipe: &dyn AddPipe,
    records: Vec<Record>,
    want_binding: bool,
) -> Result<(), PipeError> {
    runtime()?.block_on(pipe.add(records, want_binding))
}

/// Deletes matching records through `pipe`.
pub fn delete_blocking(pipe: &dyn Pipe, predicate: Option<&Expr>) -> Result<(), PipeError> {
    runtime()?.block_on(pipe.delete(predicate))
}

#[cfg(test)]
mod tests {
    use datapipe_core::expr::{field, lit};
    use datapipe_core::{CollectionPipe, Record, Value};

    use super::*;

    #[test]
    fn query_blocking_collects_the_stream() {
        let records: Vec<Record> = (0..3)
            .map(|i| Record::from_fields([("n", Value::Int(i))]))
            .collect();
        let pipe = CollectionPipe::new(records);

        let out = query_blocking(&pipe, Some(&field("n").gt(lit(0))), false).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn add_blocking_reaches_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = crate::file::FilePipe::new(dir.path().join("rows.csv"));

        add_blocking(
            &pipe,
            vec![Record::from_fields([("n", Value::Text("x".into()))])],
            false,
        )
        .unwrap();

        let out = query_blocking(&pipe, None, false).unwrap();
        assert_eq!(out.len(), 1);
    }
}
