//! End-to-end ingestion: embed (or reuse cached embeddings), make sure the
//! collection exists, then insert in chunks.

use std::path::PathBuf;

use crate::error::{CacheError, IngestError};
use crate::models::{CollectionSchema, IndexSpec, RecordSet};
use crate::services::VectorStoreConnector;
use crate::services::batch::{BatchIngestionManager, IngestReport};
use crate::services::cache::{CacheEntry, EmbeddingCache};
use crate::services::embedding::Embedder;

pub struct IngestPipeline {
    embedder: Embedder,
    schema: CollectionSchema,
    index: IndexSpec,
    cache_path: Option<PathBuf>,
    batch_size: usize,
    concurrency: usize,
}

impl IngestPipeline {
    /// Fails when the embedder does not produce vectors the collection
    /// accepts (dimension, normalisation).
    pub fn new(
        embedder: Embedder,
        schema: CollectionSchema,
        index: IndexSpec,
    ) -> Result<Self, IngestError> {
        schema
            .check_normalization(embedder.normalize())
            .map_err(IngestError::Validation)?;
        if embedder.dimension() != schema.dimension {
            return Err(IngestError::Validation(format!(
                "embedder dimension {} does not match collection '{}' dimension {}",
                embedder.dimension(),
                schema.name,
                schema.dimension
            )));
        }
        if index.metric != schema.metric {
            return Err(IngestError::Validation(format!(
                "index metric '{}' does not match collection metric '{}'",
                index.metric, schema.metric
            )));
        }

        Ok(Self {
            embedder,
            schema,
            index,
            cache_path: None,
            batch_size: 500,
            concurrency: 1,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub async fn run(
        &self,
        connector: &VectorStoreConnector,
        records: &RecordSet,
    ) -> Result<IngestReport, IngestError> {
        if records.is_empty() {
            return Err(IngestError::Validation("no records to ingest".to_string()));
        }

        let texts = records.texts();
        let ids = records.ids();
        let vectors = self.embeddings(&texts).await?;

        self.ensure_collection(connector).await?;

        let manager = BatchIngestionManager::new(connector.connection().await?, self.schema.clone())
            .with_concurrency(self.concurrency);
        manager
            .batch_insert(&ids, &vectors, &texts, self.batch_size)
            .await
    }

    /// Cached vectors when the cache holds exactly these texts, otherwise
    /// fresh embeddings (written back to the cache when one is configured).
    async fn embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let cache = EmbeddingCache::new(self.schema.dimension);

        if let Some(ref path) = self.cache_path {
            match cache.load(path) {
                Ok(entries) if entries.iter().map(|e| &e.text).eq(texts.iter()) => {
                    tracing::info!(path = %path.display(), count = entries.len(), "Using cached embeddings");
                    return Ok(entries.into_iter().map(|e| e.vector).collect());
                }
                Ok(_) => {
                    tracing::info!(path = %path.display(), "Cache does not match input; re-embedding");
                }
                Err(CacheError::NotFound(_)) => {
                    tracing::debug!(path = %path.display(), "No embeddings cache yet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let vectors = self
            .embedder
            .encode(texts, self.embedder.batch_size(), self.embedder.normalize())
            .await?;
        tracing::info!(count = vectors.len(), "Generated embeddings");

        if let Some(ref path) = self.cache_path {
            let entries: Vec<CacheEntry> = texts
                .iter()
                .zip(&vectors)
                .map(|(text, vector)| CacheEntry::new(text.clone(), vector.clone()))
                .collect();
            cache.save(&entries, path)?;
        }

        Ok(vectors)
    }

    async fn ensure_collection(&self, connector: &VectorStoreConnector) -> Result<(), IngestError> {
        if connector.has_collection(&self.schema.name).await? {
            let stored = connector
                .describe_collection(&self.schema.name, &self.schema.vector_field)
                .await?;
            stored.check(&self.schema).map_err(IngestError::Validation)?;
            tracing::info!(collection = %self.schema.name, "Using existing collection");
            return Ok(());
        }

        connector.create_collection(&self.schema).await?;
        connector.create_index(&self.schema.name, &self.index).await?;
        Ok(())
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("collection", &self.schema.name)
            .field("cache_path", &self.cache_path)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
