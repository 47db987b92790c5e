//! Error types for the tabular semantic search pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to the on-disk embedding cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file not found: {0}")]
    NotFound(PathBuf),

    #[error("cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache format error at row {row}: {reason}")]
    Format { row: usize, reason: String },

    #[error("invalid cache entry: {0}")]
    Validation(String),
}

/// Errors raised while loading or running a local embedding model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding model error: {0}")]
    Model(#[from] ModelError),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // 5xx gateway errors and rate limiting are transient
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidInput(_)
            | EmbeddingError::InvalidResponse(_)
            | EmbeddingError::Model(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("not connected to the vector store")]
    NotConnected,

    #[error("failed to connect to vector store at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{operation} failed: {message}")]
    ExternalService { operation: String, message: String },
}

impl VectorStoreError {
    pub fn external(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalService {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Errors related to batch ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors related to loading tabular records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record file not found: {0}")]
    NotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("invalid records: {0}")]
    Validation(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".to_string()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad".to_string()).is_retryable());
        assert!(!EmbeddingError::InvalidInput("empty".to_string()).is_retryable());
    }

    #[test]
    fn test_external_service_message() {
        let err = VectorStoreError::external("insert", "quota exceeded");
        assert_eq!(err.to_string(), "insert failed: quota exceeded");
    }
}
