//! Vector store abstraction layer.
//!
//! A [`VectorStoreBackend`] opens sessions against a remote store; a
//! [`VectorStoreSession`] is the RPC surface used for administration, inserts
//! and similarity queries. Components never reach a store through a global
//! registry: they receive a [`Connection`] handle from the
//! [`VectorStoreConnector`](crate::services::VectorStoreConnector) that owns
//! the connection.

#[cfg(test)]
pub(crate) mod memory;
mod qdrant;

pub use qdrant::QdrantBackend;

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{CollectionSchema, IndexSpec, Metric, VectorStoreConfig};

/// Where and how to reach the store.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&VectorStoreConfig> for Endpoint {
    fn from(config: &VectorStoreConfig) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// One (id, vector, text) row for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub id: i64,
    pub vector: Vec<f32>,
    pub text: String,
}

/// A similarity query against one vector field.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query_vector: Vec<f32>,
    pub vector_field: String,
    pub metric: Metric,
    pub limit: u64,
    pub output_fields: Vec<String>,
}

/// A ranked hit as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

/// Parameters a collection was created with, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredCollection {
    pub dimension: usize,
    pub metric: Metric,
    /// Whether stored vectors are unit length; `None` when the store does not
    /// record it.
    pub normalized: Option<bool>,
}

impl StoredCollection {
    /// Checks that `schema` describes this collection.
    pub fn check(&self, schema: &CollectionSchema) -> Result<(), String> {
        if self.dimension != schema.dimension {
            return Err(format!(
                "collection '{}' stores {}-dimensional vectors, configured dimension is {}",
                schema.name, self.dimension, schema.dimension
            ));
        }
        if self.metric != schema.metric {
            return Err(format!(
                "collection '{}' was created with metric '{}', configured metric is '{}'",
                schema.name, self.metric, schema.metric
            ));
        }
        if let Some(normalized) = self.normalized
            && normalized != schema.normalized
        {
            return Err(format!(
                "collection '{}' stores {} vectors but normalize={} is configured",
                schema.name,
                if normalized { "normalized" } else { "unnormalized" },
                schema.normalized
            ));
        }
        Ok(())
    }
}

/// Opens sessions against a vector store service.
#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    /// Short backend name used in logs and status output.
    fn name(&self) -> &'static str;

    /// Establishes a session, failing with [`VectorStoreError::Connection`]
    /// when the store cannot be reached.
    async fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn VectorStoreSession>, VectorStoreError>;
}

/// An open session. Every call after [`close`](Self::close) fails with
/// [`VectorStoreError::NotConnected`].
#[async_trait]
pub trait VectorStoreSession: Send + Sync {
    async fn close(&self) -> Result<(), VectorStoreError>;

    async fn has_collection(&self, name: &str) -> Result<bool, VectorStoreError>;

    /// Creates a collection with the given schema. Callers check existence
    /// first; backends may reject duplicates.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), VectorStoreError>;

    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Builds an index; returns once the store has accepted the request.
    async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), VectorStoreError>;

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError>;

    /// Dimension, metric and normalisation of `vector_field` in an existing
    /// collection.
    async fn describe_collection(
        &self,
        name: &str,
        vector_field: &str,
    ) -> Result<StoredCollection, VectorStoreError>;

    /// Inserts all rows in a single store operation.
    async fn insert(
        &self,
        schema: &CollectionSchema,
        rows: Vec<InsertRow>,
    ) -> Result<(), VectorStoreError>;

    /// Nearest neighbours of `request.query_vector`, best-first.
    async fn search(
        &self,
        collection: &str,
        request: SearchRequest,
    ) -> Result<Vec<Hit>, VectorStoreError>;

    /// Number of stored records.
    async fn count(&self, name: &str) -> Result<u64, VectorStoreError>;
}

/// Cloneable handle to an open session, passed to the components that talk
/// to the store.
#[derive(Clone)]
pub struct Connection {
    session: Arc<dyn VectorStoreSession>,
    backend: &'static str,
    endpoint: String,
}

impl Connection {
    pub fn new(
        session: Arc<dyn VectorStoreSession>,
        backend: &'static str,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            session,
            backend,
            endpoint: endpoint.into(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Deref for Connection {
    type Target = dyn VectorStoreSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_collection_check() {
        let schema = CollectionSchema::new("plans", 4);
        let stored = StoredCollection {
            dimension: 4,
            metric: Metric::Cosine,
            normalized: Some(true),
        };
        assert!(stored.check(&schema).is_ok());

        let l2 = StoredCollection {
            metric: Metric::L2,
            ..stored
        };
        assert!(l2.check(&schema).unwrap_err().contains("metric 'l2'"));

        let wide = StoredCollection {
            dimension: 8,
            ..stored
        };
        assert!(wide.check(&schema).is_err());

        let dot = CollectionSchema::new("plans", 4)
            .with_metric(Metric::Dot)
            .with_normalized(false);
        let unknown = StoredCollection {
            metric: Metric::Dot,
            normalized: None,
            ..stored
        };
        assert!(unknown.check(&dot).is_ok());
        let recorded = StoredCollection {
            normalized: Some(true),
            ..unknown
        };
        assert!(recorded.check(&dot).is_err());
    }
}
