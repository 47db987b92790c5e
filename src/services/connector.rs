//! Connection lifecycle and collection administration.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::VectorStoreError;
use crate::models::{CollectionSchema, IndexSpec};
use crate::services::vector_store::{Connection, Endpoint, StoredCollection, VectorStoreBackend};

enum ConnectionState {
    Disconnected,
    Connected(Connection),
}

/// Owns the single connection to a vector store.
///
/// `Disconnected -> Connected -> Disconnected`. Transitions are serialised by
/// a mutex; queries run on cloned [`Connection`] handles without holding it.
pub struct VectorStoreConnector {
    backend: Arc<dyn VectorStoreBackend>,
    endpoint: Endpoint,
    state: Mutex<ConnectionState>,
}

impl VectorStoreConnector {
    pub fn new(backend: Arc<dyn VectorStoreBackend>, endpoint: Endpoint) -> Self {
        Self {
            backend,
            endpoint,
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Opens the connection, or returns the existing one when already
    /// connected. On failure the state stays `Disconnected`.
    pub async fn connect(&self) -> Result<Connection, VectorStoreError> {
        let mut state = self.state.lock().await;
        if let ConnectionState::Connected(ref connection) = *state {
            tracing::debug!(endpoint = %self.endpoint.url, "Already connected");
            return Ok(connection.clone());
        }

        let session = self.backend.connect(&self.endpoint).await.inspect_err(|e| {
            tracing::error!(endpoint = %self.endpoint.url, error = %e, "Failed to connect to vector store");
        })?;

        let connection = Connection::new(session, self.backend.name(), self.endpoint.url.clone());
        *state = ConnectionState::Connected(connection.clone());
        tracing::info!(
            backend = self.backend.name(),
            endpoint = %self.endpoint.url,
            "Connected to vector store"
        );
        Ok(connection)
    }

    /// Closes the connection. Never fails; close errors are logged.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        let ConnectionState::Connected(connection) =
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        else {
            tracing::debug!("Disconnect requested while not connected");
            return;
        };

        match connection.close().await {
            Ok(()) => tracing::info!(endpoint = %self.endpoint.url, "Disconnected from vector store"),
            Err(e) => tracing::error!(
                endpoint = %self.endpoint.url,
                error = %e,
                "Error while disconnecting; connection dropped"
            ),
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, ConnectionState::Connected(_))
    }

    /// The current handle, or [`VectorStoreError::NotConnected`].
    pub async fn connection(&self) -> Result<Connection, VectorStoreError> {
        match *self.state.lock().await {
            ConnectionState::Connected(ref connection) => Ok(connection.clone()),
            ConnectionState::Disconnected => Err(VectorStoreError::NotConnected),
        }
    }

    pub async fn has_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        self.connection().await?.has_collection(name).await
    }

    pub async fn describe_collection(
        &self,
        name: &str,
        vector_field: &str,
    ) -> Result<StoredCollection, VectorStoreError> {
        self.connection()
            .await?
            .describe_collection(name, vector_field)
            .await
    }

    /// Creates the collection; an existing collection is left untouched.
    pub async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), VectorStoreError> {
        let connection = self.connection().await?;
        if connection.has_collection(&schema.name).await? {
            tracing::info!(collection = %schema.name, "Collection already exists; skipping create");
            return Ok(());
        }

        connection.create_collection(schema).await?;
        tracing::info!(
            collection = %schema.name,
            dimension = schema.dimension,
            metric = %schema.metric,
            "Collection created"
        );
        Ok(())
    }

    /// Builds an index on an existing collection.
    pub async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), VectorStoreError> {
        let connection = self.connection().await?;
        if !connection.has_collection(name).await? {
            return Err(VectorStoreError::CollectionNotFound(name.to_string()));
        }

        connection.create_index(name, spec).await?;
        tracing::info!(
            collection = %name,
            field = %spec.field,
            index_type = %spec.index_type,
            metric = %spec.metric,
            "Index created"
        );
        Ok(())
    }

    /// Irreversibly deletes a collection. Absent collections are a no-op.
    pub async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        let connection = self.connection().await?;
        if !connection.has_collection(name).await? {
            tracing::info!(collection = %name, "Collection does not exist; nothing to drop");
            return Ok(());
        }

        connection.drop_collection(name).await?;
        tracing::warn!(collection = %name, "Collection dropped");
        Ok(())
    }

    /// Collection names; any failure yields an empty list.
    pub async fn list_collections(&self) -> Vec<String> {
        let result = match self.connection().await {
            Ok(connection) => connection.list_collections().await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to list collections");
            Vec::new()
        })
    }

    /// Connects, runs `f` with the handle and disconnects on every exit path.
    pub async fn with_connection<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<VectorStoreError>,
    {
        let connection = self.connect().await?;
        let result = f(connection).await;
        self.disconnect().await;
        result
    }
}

impl Drop for VectorStoreConnector {
    fn drop(&mut self) {
        if let Ok(state) = self.state.try_lock()
            && matches!(*state, ConnectionState::Connected(_))
        {
            tracing::warn!(
                endpoint = %self.endpoint.url,
                "Connector dropped while connected; call disconnect() before dropping"
            );
        }
    }
}

impl std::fmt::Debug for VectorStoreConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConnector")
            .field("backend", &self.backend.name())
            .field("endpoint", &self.endpoint.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vector_store::memory::MemoryBackend;

    fn connector(backend: &MemoryBackend) -> VectorStoreConnector {
        VectorStoreConnector::new(Arc::new(backend.clone()), Endpoint::new("memory://test"))
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);

        connector.connect().await.unwrap();
        connector.connect().await.unwrap();

        assert_eq!(backend.connects(), 1);
        assert!(connector.is_connected().await);
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let backend = MemoryBackend::new();
        backend.set_fail_connect(true);
        let connector = connector(&backend);

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Connection { .. }));
        assert!(!connector.is_connected().await);

        backend.set_fail_connect(false);
        connector.connect().await.unwrap();
        assert!(connector.is_connected().await);
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_silent() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);

        connector.disconnect().await;
        connector.connect().await.unwrap();
        connector.disconnect().await;
        connector.disconnect().await;

        assert!(!connector.is_connected().await);
        assert_eq!(backend.state().closes, 1);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let connector = connector(&MemoryBackend::new());

        let err = connector.has_collection("c").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::NotConnected));
        let err = connector
            .create_collection(&CollectionSchema::new("c", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::NotConnected));
    }

    #[tokio::test]
    async fn test_stale_handle_fails_after_disconnect() {
        let connector = connector(&MemoryBackend::new());
        let connection = connector.connect().await.unwrap();
        connector.disconnect().await;

        let err = connection.has_collection("c").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::NotConnected));
    }

    #[tokio::test]
    async fn test_create_collection_twice_keeps_one() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);
        connector.connect().await.unwrap();

        let schema = CollectionSchema::new("plans", 4);
        connector.create_collection(&schema).await.unwrap();
        connector.create_collection(&schema).await.unwrap();

        assert_eq!(connector.list_collections().await, vec!["plans".to_string()]);
        assert_eq!(
            backend.state().collections["plans"].schema.as_ref(),
            Some(&schema)
        );
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_drop_missing_collection_is_noop() {
        let connector = connector(&MemoryBackend::new());
        connector.connect().await.unwrap();

        connector.drop_collection("missing").await.unwrap();

        connector
            .create_collection(&CollectionSchema::new("plans", 4))
            .await
            .unwrap();
        connector.drop_collection("plans").await.unwrap();
        assert!(!connector.has_collection("plans").await.unwrap());
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_create_index_requires_collection() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);
        connector.connect().await.unwrap();

        let spec = IndexSpec::ivf_flat(crate::models::Metric::Cosine, 128);
        let err = connector.create_index("missing", &spec).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionNotFound(ref n) if n == "missing"));

        let schema = CollectionSchema::new("plans", 4);
        connector.create_collection(&schema).await.unwrap();
        connector.create_index("plans", &spec).await.unwrap();
        assert_eq!(backend.state().collections["plans"].index, Some(spec));
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_describe_collection_reports_creation_parameters() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);
        connector.connect().await.unwrap();

        let schema = CollectionSchema::new("plans", 4).with_metric(crate::models::Metric::L2);
        connector.create_collection(&schema).await.unwrap();
        let stored = connector.describe_collection("plans", "vector").await.unwrap();
        assert_eq!(stored.dimension, 4);
        assert_eq!(stored.metric, crate::models::Metric::L2);
        assert!(stored.check(&schema).is_ok());

        let err = connector.describe_collection("missing", "vector").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionNotFound(_)));
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_list_collections_swallows_errors() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);
        assert!(connector.list_collections().await.is_empty());

        connector.connect().await.unwrap();
        connector
            .create_collection(&CollectionSchema::new("plans", 4))
            .await
            .unwrap();
        backend.state().fail_list = true;
        assert!(connector.list_collections().await.is_empty());
        connector.disconnect().await;
    }

    #[tokio::test]
    async fn test_with_connection_disconnects_on_error() {
        let backend = MemoryBackend::new();
        let connector = connector(&backend);

        let result: Result<(), VectorStoreError> = connector
            .with_connection(|_connection| async {
                Err(VectorStoreError::Validation("boom".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(!connector.is_connected().await);
        assert_eq!(backend.state().closes, 1);
    }
}
