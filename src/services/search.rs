//! Similarity search with metadata post-filtering.
//!
//! Filters are applied to the `top_k` nearest neighbours *after* retrieval.
//! A filtered query can therefore return fewer than `top_k` results even
//! when the collection holds more matching records; raise `top_k` when
//! filters are selective.

use std::time::Instant;

use tokio::sync::OnceCell;

use crate::error::SearchError;
use crate::models::{CollectionSchema, Filters, MetadataTable, SearchResult, SearchResults};
use crate::services::embedding::Embedder;
use crate::services::vector_store::{Connection, SearchRequest};

pub struct SearchEngine {
    connection: Connection,
    embedder: Embedder,
    schema: CollectionSchema,
    metadata: Option<MetadataTable>,
    verified: OnceCell<()>,
}

impl SearchEngine {
    /// Fails when the embedder's normalisation or dimension does not match
    /// `schema`. The stored collection is checked against `schema` before the
    /// first query.
    pub fn new(
        connection: Connection,
        embedder: Embedder,
        schema: CollectionSchema,
    ) -> Result<Self, SearchError> {
        schema
            .check_normalization(embedder.normalize())
            .map_err(SearchError::Validation)?;
        if embedder.dimension() != schema.dimension {
            return Err(SearchError::Validation(format!(
                "embedder dimension {} does not match collection '{}' dimension {}",
                embedder.dimension(),
                schema.name,
                schema.dimension
            )));
        }

        Ok(Self {
            connection,
            embedder,
            schema,
            metadata: None,
            verified: OnceCell::new(),
        })
    }

    /// Metadata table used to evaluate filters, joined to hits by id.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataTable) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Checks that the stored collection has the configured dimension, metric
    /// and normalisation. Runs against the store once per engine.
    pub async fn verify_collection(&self) -> Result<(), SearchError> {
        self.verified
            .get_or_try_init(|| async {
                let stored = self
                    .connection
                    .describe_collection(&self.schema.name, &self.schema.vector_field)
                    .await?;
                stored.check(&self.schema).map_err(SearchError::Validation)
            })
            .await?;
        Ok(())
    }

    /// The `top_k` nearest neighbours of `query_vector`, best-first under the
    /// collection metric.
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidQuery(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if query_vector.len() != self.schema.dimension {
            return Err(SearchError::InvalidQuery(format!(
                "query vector has dimension {}, collection expects {}",
                query_vector.len(),
                self.schema.dimension
            )));
        }

        self.verify_collection().await?;

        let request = SearchRequest {
            query_vector: query_vector.to_vec(),
            vector_field: self.schema.vector_field.clone(),
            metric: self.schema.metric,
            limit: top_k as u64,
            output_fields: vec![self.schema.text_field.clone()],
        };

        let hits = self.connection.search(&self.schema.name, request).await?;

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|mut hit| SearchResult {
                id: hit.id,
                score: hit.score,
                text: hit.payload.remove(&self.schema.text_field).unwrap_or_default(),
            })
            .collect();
        results.sort_by(|a, b| self.schema.metric.compare(a.score, b.score));
        results.truncate(top_k);

        Ok(results)
    }

    /// Encodes `query_text`, retrieves `top_k` candidates and keeps those
    /// whose metadata row matches every filter.
    ///
    /// Candidates without a metadata row are dropped when filters are given.
    /// Non-empty filters without a metadata table are rejected.
    pub async fn search_with_filter(
        &self,
        query_text: &str,
        top_k: usize,
        filters: &Filters,
    ) -> Result<SearchResults, SearchError> {
        let start = Instant::now();

        if query_text.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query is empty".to_string()));
        }
        if !filters.is_empty() && self.metadata.is_none() {
            return Err(SearchError::InvalidQuery(
                "filters require a metadata table".to_string(),
            ));
        }

        let query_vector = self.embedder.encode_query(query_text).await?;
        let candidates = self.search(&query_vector, top_k).await?;
        let retrieved = candidates.len();

        let results: Vec<SearchResult> = match self.metadata {
            Some(ref table) if !filters.is_empty() => candidates
                .into_iter()
                .filter(|hit| table.matches(hit.id, filters))
                .collect(),
            _ => candidates,
        };

        tracing::debug!(
            collection = %self.schema.name,
            top_k,
            retrieved,
            kept = results.len(),
            filters = filters.len(),
            "Search completed"
        );

        Ok(SearchResults::new(
            query_text.to_string(),
            filters.clone(),
            results,
            start.elapsed().as_millis() as u64,
        ))
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("collection", &self.schema.name)
            .field("metric", &self.schema.metric)
            .field("has_metadata", &self.metadata.is_some())
            .finish()
    }
}
