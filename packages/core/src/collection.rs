//! In-memory collection pipe: wraps any sequence of records as a read-only
//! query source.
//!
//! Used for synthetic/test data and binding demos — returned records are
//! handles into the wrapped collection, so edits through one handle are
//! visible through the others.

use async_trait::async_trait;

use crate::error::PipeError;
use crate::expr::Expr;
use crate::pipe::{reject_binding, stream_filtered, QueryPipe, RecordStream};
use crate::record::Record;

/// Read-only query source over an in-memory record sequence.
pub struct CollectionPipe {
    records: Vec<Record>,
}

impl CollectionPipe {
    /// Wraps the given records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl QueryPipe for CollectionPipe {
    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError> {
        reject_binding(want_binding, "collection pipe")?;
        Ok(stream_filtered(self.records.clone(), predicate.cloned()))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;
    use crate::expr::{field, lit};
    use crate::value::Value;

    fn pipe() -> CollectionPipe {
        CollectionPipe::new(
            ["A", "B", "C"]
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    Record::from_fields([
                        ("name", Value::Text((*name).into())),
                        ("age", Value::Int(i64::try_from(i).unwrap() + 1)),
                    ])
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn query_without_predicate_returns_all() {
        let out: Vec<Record> = pipe().query(None, false).await.unwrap().try_collect().await.unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn query_with_predicate_filters() {
        let predicate = field("age").gt(lit(1));
        let out: Vec<Record> = pipe()
            .query(Some(&predicate), false)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("name").unwrap(), Value::Text("B".into()));
    }

    #[tokio::test]
    async fn binding_request_fails_fast() {
        assert!(matches!(
            pipe().query(None, true).await.err(),
            Some(PipeError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn returned_records_are_live_handles() {
        let source = Record::from_fields([("x", Value::Int(1))]);
        let pipe = CollectionPipe::new(vec![source.clone()]);
        let out: Vec<Record> = pipe.query(None, false).await.unwrap().try_collect().await.unwrap();

        out[0].set("x", Value::Int(2)).unwrap();
        assert_eq!(source.get("x").unwrap(), Value::Int(2));
    }
}
