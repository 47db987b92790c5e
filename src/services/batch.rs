//! Chunked insertion of (id, vector, text) rows.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::IngestError;
use crate::models::CollectionSchema;
use crate::services::vector_store::{Connection, InsertRow};

/// Outcome of one chunk of a [`BatchIngestionManager::batch_insert`] pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    /// Index range `[start, end)` into the input sequences.
    pub start: usize,
    pub end: usize,
    pub first_id: i64,
    pub last_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkOutcome {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-chunk results of a batch insertion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub total: usize,
    pub chunks: Vec<ChunkOutcome>,
}

impl IngestReport {
    pub fn succeeded_rows(&self) -> usize {
        self.chunks.iter().filter(|c| c.succeeded()).map(ChunkOutcome::len).sum()
    }

    pub fn failed_rows(&self) -> usize {
        self.total - self.succeeded_rows()
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| !c.succeeded())
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::succeeded)
    }
}

/// Writes rows into one collection through a connection handle.
#[derive(Debug, Clone)]
pub struct BatchIngestionManager {
    connection: Connection,
    schema: CollectionSchema,
    concurrency: usize,
}

impl BatchIngestionManager {
    pub fn new(connection: Connection, schema: CollectionSchema) -> Self {
        Self {
            connection,
            schema,
            concurrency: 1,
        }
    }

    /// Maximum number of chunk inserts in flight. Only raise this for stores
    /// that accept concurrent writers on one collection.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Inserts all rows with a single store operation, or fails as a whole.
    ///
    /// Rows are validated against the schema before anything is sent.
    pub async fn insert(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        texts: &[String],
    ) -> Result<(), IngestError> {
        check_lengths(ids, vectors, texts)?;
        check_unique(ids)?;
        self.check_rows(ids, vectors, texts)?;

        let rows = ids
            .iter()
            .zip(vectors)
            .zip(texts)
            .map(|((&id, vector), text)| InsertRow {
                id,
                vector: vector.clone(),
                text: text.clone(),
            })
            .collect();

        self.connection.insert(&self.schema, rows).await?;
        tracing::info!(
            collection = %self.schema.name,
            count = ids.len(),
            "Inserted records"
        );
        Ok(())
    }

    /// Inserts in consecutive chunks of at most `batch_size` rows.
    ///
    /// A failing chunk is logged with its range and recorded in the report;
    /// the remaining chunks are still attempted.
    pub async fn batch_insert(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        texts: &[String],
        batch_size: usize,
    ) -> Result<IngestReport, IngestError> {
        check_lengths(ids, vectors, texts)?;
        if batch_size == 0 {
            return Err(IngestError::Validation(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        check_unique(ids)?;

        let ranges: Vec<(usize, usize)> = (0..ids.len())
            .step_by(batch_size)
            .map(|start| (start, (start + batch_size).min(ids.len())))
            .collect();

        let chunks: Vec<ChunkOutcome> = stream::iter(ranges)
            .map(|(start, end)| async move {
                let result = self
                    .insert(&ids[start..end], &vectors[start..end], &texts[start..end])
                    .await;
                let error = result.err().map(|e| {
                    tracing::error!(
                        collection = %self.schema.name,
                        start,
                        end,
                        error = %e,
                        "Chunk insert failed"
                    );
                    e.to_string()
                });
                ChunkOutcome {
                    start,
                    end,
                    first_id: ids[start],
                    last_id: ids[end - 1],
                    error,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = IngestReport {
            collection: self.schema.name.clone(),
            total: ids.len(),
            chunks,
        };

        tracing::info!(
            collection = %report.collection,
            total = report.total,
            succeeded = report.succeeded_rows(),
            failed = report.failed_rows(),
            "Batch insertion finished"
        );
        Ok(report)
    }

    fn check_rows(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        texts: &[String],
    ) -> Result<(), IngestError> {
        for ((&id, vector), text) in ids.iter().zip(vectors).zip(texts) {
            if id < 1 {
                return Err(IngestError::Validation(format!("id {} must be >= 1", id)));
            }
            if vector.len() != self.schema.dimension {
                return Err(IngestError::Validation(format!(
                    "id {}: vector has dimension {}, collection '{}' expects {}",
                    id,
                    vector.len(),
                    self.schema.name,
                    self.schema.dimension
                )));
            }
            if text.trim().is_empty() {
                return Err(IngestError::Validation(format!("id {}: text is empty", id)));
            }
            let chars = text.chars().count();
            if chars > self.schema.text_max_len {
                return Err(IngestError::Validation(format!(
                    "id {}: text has {} characters, limit is {}",
                    id, chars, self.schema.text_max_len
                )));
            }
        }
        Ok(())
    }
}

fn check_lengths(ids: &[i64], vectors: &[Vec<f32>], texts: &[String]) -> Result<(), IngestError> {
    if ids.len() != vectors.len() || ids.len() != texts.len() {
        return Err(IngestError::Validation(format!(
            "length mismatch: {} ids, {} vectors, {} texts",
            ids.len(),
            vectors.len(),
            texts.len()
        )));
    }
    Ok(())
}

fn check_unique(ids: &[i64]) -> Result<(), IngestError> {
    let mut seen = HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(IngestError::Validation(format!("duplicate id {}", id))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::VectorStoreConnector;
    use crate::services::vector_store::Endpoint;
    use crate::services::vector_store::memory::MemoryBackend;
    use std::sync::Arc;

    async fn setup(dimension: usize) -> (MemoryBackend, VectorStoreConnector, BatchIngestionManager) {
        let backend = MemoryBackend::new();
        let connector =
            VectorStoreConnector::new(Arc::new(backend.clone()), Endpoint::new("memory://test"));
        let connection = connector.connect().await.unwrap();
        let schema = CollectionSchema::new("plans", dimension).with_text_max_len(10);
        connector.create_collection(&schema).await.unwrap();
        (backend, connector, BatchIngestionManager::new(connection, schema))
    }

    fn rows(n: usize) -> (Vec<i64>, Vec<Vec<f32>>, Vec<String>) {
        let ids = (1..=n as i64).collect();
        let vectors = (0..n).map(|i| vec![i as f32, 1.0]).collect();
        let texts = (0..n).map(|i| format!("t{}", i)).collect();
        (ids, vectors, texts)
    }

    #[tokio::test]
    async fn test_length_mismatch_rejected_before_network() {
        let (backend, connector, manager) = setup(2).await;
        let (ids, vectors, _) = rows(3);
        let texts = vec!["a".to_string()];

        let err = manager.insert(&ids, &vectors, &texts).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        let err = manager.batch_insert(&ids, &vectors, &texts, 2).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        assert!(backend.state().insert_calls.is_empty());
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_insert_validates_schema() {
        let (backend, connector, manager) = setup(2).await;

        let err = manager
            .insert(&[1], &[vec![1.0, 2.0, 3.0]], &["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = manager
            .insert(&[0], &[vec![1.0, 2.0]], &["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = manager
            .insert(&[1], &[vec![1.0, 2.0]], &["a".repeat(11)])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = manager
            .insert(&[1, 1], &[vec![1.0, 2.0], vec![1.0, 2.0]], &["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        assert!(backend.state().insert_calls.is_empty());
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_text_limit_counts_characters() {
        let (_backend, connector, manager) = setup(2).await;
        manager
            .insert(&[1], &[vec![1.0, 2.0]], &["é".repeat(10)])
            .await
            .unwrap();
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_batch_insert_partitions_in_order() {
        let (backend, connector, manager) = setup(2).await;
        let (ids, vectors, texts) = rows(5);

        let report = manager.batch_insert(&ids, &vectors, &texts, 2).await.unwrap();

        assert_eq!(
            backend.state().insert_calls,
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
        let ranges: Vec<(usize, usize)> = report.chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 4), (4, 5)]);
        assert!(report.is_complete());
        assert_eq!(report.succeeded_rows(), 5);
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_chunk_failure_does_not_abort_run() {
        let (backend, connector, manager) = setup(2).await;
        backend.state().fail_insert_ids.insert(3);
        let (ids, vectors, texts) = rows(5);

        let report = manager.batch_insert(&ids, &vectors, &texts, 2).await.unwrap();

        assert_eq!(backend.state().insert_calls.len(), 3);
        assert_eq!(report.succeeded_rows(), 3);
        assert_eq!(report.failed_rows(), 2);
        let failed: Vec<(i64, i64)> = report
            .failed_chunks()
            .map(|c| (c.first_id, c.last_id))
            .collect();
        assert_eq!(failed, vec![(3, 4)]);
        assert_eq!(backend.state().collections["plans"].rows.len(), 3);
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_concurrent_chunks_report_in_order() {
        let (backend, connector, manager) = setup(2).await;
        let manager = manager.with_concurrency(3);
        let (ids, vectors, texts) = rows(7);

        let report = manager.batch_insert(&ids, &vectors, &texts, 3).await.unwrap();

        let firsts: Vec<i64> = report.chunks.iter().map(|c| c.first_id).collect();
        assert_eq!(firsts, vec![1, 4, 7]);
        assert_eq!(backend.state().collections["plans"].rows.len(), 7);
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_empty_batch_insert() {
        let (backend, connector, manager) = setup(2).await;
        let report = manager.batch_insert(&[], &[], &[], 4).await.unwrap();
        assert_eq!(report.total, 0);
        assert!(report.chunks.is_empty());
        assert!(backend.state().insert_calls.is_empty());
        connector.disconnect().await;
    }
}
