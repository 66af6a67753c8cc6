//! Fan-out and fan-in pipe combinators.
//!
//! [`Distribute`] broadcasts batched writes to N add-pipes; [`Merge`] unions
//! N query-pipes into one lazy, order-preserving concatenation. Both resolve
//! the binding question fail-fast: a binding request is an error unless
//! every sub-pipe advertises `can_binding`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::debug;

use crate::error::PipeError;
use crate::expr::Expr;
use crate::pipe::{AddPipe, QueryPipe, RecordStream};
use crate::record::Record;

/// Fan-out write distributor.
///
/// Buffers input into fixed-size batches and pushes each batch to every
/// target add-pipe. Batching bounds memory for very large inputs while
/// still giving each backend batched writes. Batches are delivered in the
/// order they were formed; no ordering is guaranteed across different
/// targets.
pub struct Distribute {
    targets: Vec<Arc<dyn AddPipe>>,
    batch_size: usize,
}

impl Distribute {
    /// Creates a distributor over `targets` with the given batch size.
    ///
    /// # Errors
    ///
    /// [`PipeError::Unsupported`] if `batch_size` is zero.
    pub fn new(targets: Vec<Arc<dyn AddPipe>>, batch_size: usize) -> Result<Self, PipeError> {
        if batch_size == 0 {
            return Err(PipeError::unsupported("distribute batch size must be >= 1"));
        }
        Ok(Self {
            targets,
            batch_size,
        })
    }
}

#[async_trait]
impl AddPipe for Distribute {
    fn can_binding(&self) -> bool {
        self.targets.iter().all(|t| t.can_binding())
    }

    async fn add(&self, records: Vec<Record>, want_binding: bool) -> Result<(), PipeError> {
        if want_binding && !self.can_binding() {
            return Err(PipeError::unsupported(
                "binding requested but not every distribute target supports it",
            ));
        }
        debug!(
            records = records.len(),
            batch_size = self.batch_size,
            targets = self.targets.len(),
            "distributing batched add"
        );
        for batch in records.chunks(self.batch_size) {
            for target in &self.targets {
                target.add(batch.to_vec(), want_binding).await?;
            }
        }
        Ok(())
    }
}

/// Fan-in read merger.
///
/// Evaluates the same predicate against every source pipe and lazily
/// concatenates their result sequences: per-source order is preserved,
/// sources are consumed in registration order, and nothing is deduplicated.
pub struct Merge {
    sources: Vec<Arc<dyn QueryPipe>>,
}

impl Merge {
    /// Creates a merger over `sources`.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn QueryPipe>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl QueryPipe for Merge {
    fn can_binding(&self) -> bool {
        self.sources.iter().all(|s| s.can_binding())
    }

    async fn query(
        &self,
        predicate: Option<&Expr>,
        want_binding: bool,
    ) -> Result<RecordStream, PipeError> {
        if want_binding && !self.can_binding() {
            return Err(PipeError::unsupported(
                "binding requested but not every merge source supports it",
            ));
        }
        let predicate = predicate.cloned();
        let sources = self.sources.clone();
        let merged = stream::iter(sources)
            .then(move |source| {
                let predicate = predicate.clone();
                async move { source.query(predicate.as_ref(), want_binding).await }
            })
            .flat_map(|sub_result| match sub_result {
                Ok(sub_stream) => sub_stream,
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .boxed();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use parking_lot::Mutex;

    use super::*;
    use crate::collection::CollectionPipe;
    use crate::value::Value;

    /// Add-pipe that records the size of every batch it receives.
    #[derive(Default)]
    struct BatchRecorder {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AddPipe for BatchRecorder {
        async fn add(&self, records: Vec<Record>, _want_binding: bool) -> Result<(), PipeError> {
            self.batches.lock().push(records.len());
            Ok(())
        }
    }

    fn numbered(values: &[i64]) -> Vec<Record> {
        values
            .iter()
            .map(|v| Record::from_fields([("n", Value::Int(*v))]))
            .collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(Distribute::new(Vec::new(), 0).is_err());
        assert!(Distribute::new(Vec::new(), 1).is_ok());
    }

    #[tokio::test]
    async fn seven_records_at_batch_three_arrive_as_3_3_1() {
        let a = Arc::new(BatchRecorder::default());
        let b = Arc::new(BatchRecorder::default());
        let distribute = Distribute::new(
            vec![Arc::clone(&a) as Arc<dyn AddPipe>, Arc::clone(&b) as _],
            3,
        )
        .unwrap();

        distribute
            .add(numbered(&[1, 2, 3, 4, 5, 6, 7]), false)
            .await
            .unwrap();

        assert_eq!(*a.batches.lock(), vec![3, 3, 1]);
        assert_eq!(*b.batches.lock(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn distribute_fails_fast_on_binding_request() {
        let target = Arc::new(BatchRecorder::default()) as Arc<dyn AddPipe>;
        let distribute = Distribute::new(vec![target], 2).unwrap();
        let err = distribute.add(numbered(&[1]), true).await.unwrap_err();
        assert!(matches!(err, PipeError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn merge_concatenates_in_source_order() {
        let merge = Merge::new(vec![
            Arc::new(CollectionPipe::new(numbered(&[1, 2]))) as Arc<dyn QueryPipe>,
            Arc::new(CollectionPipe::new(numbered(&[3]))) as _,
        ]);

        let out: Vec<Record> = merge.query(None, false).await.unwrap().try_collect().await.unwrap();
        let values: Vec<Value> = out.iter().map(|r| r.get("n").unwrap()).collect();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[tokio::test]
    async fn merge_does_not_deduplicate() {
        let merge = Merge::new(vec![
            Arc::new(CollectionPipe::new(numbered(&[1]))) as Arc<dyn QueryPipe>,
            Arc::new(CollectionPipe::new(numbered(&[1]))) as _,
        ]);
        let out: Vec<Record> = merge.query(None, false).await.unwrap().try_collect().await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn merge_applies_the_predicate_to_every_source() {
        use crate::expr::{field, lit};
        let merge = Merge::new(vec![
            Arc::new(CollectionPipe::new(numbered(&[1, 5]))) as Arc<dyn QueryPipe>,
            Arc::new(CollectionPipe::new(numbered(&[7, 2]))) as _,
        ]);
        let predicate = field("n").gt(lit(4));
        let out: Vec<Record> = merge
            .query(Some(&predicate), false)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let values: Vec<Value> = out.iter().map(|r| r.get("n").unwrap()).collect();
        assert_eq!(values, vec![Value::Int(5), Value::Int(7)]);
    }

    #[tokio::test]
    async fn merge_fails_fast_on_binding_request() {
        let merge = Merge::new(vec![
            Arc::new(CollectionPipe::new(numbered(&[1]))) as Arc<dyn QueryPipe>
        ]);
        assert!(matches!(
            merge.query(None, true).await.err(),
            Some(PipeError::Unsupported { .. })
        ));
    }
}
