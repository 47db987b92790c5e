//! Text → vector encoding.
//!
//! [`Embedder`] wraps an [`EmbeddingModel`] with input validation, chunking,
//! bounded concurrency across chunks and optional L2 normalisation. The
//! output is in one-to-one order with the input and does not depend on the
//! batch size.
//!
//! When the collection metric is cosine, vectors must be normalised both at
//! ingestion and at query time. The flag is not auto-detected; it is checked
//! against [`CollectionSchema::normalized`](crate::models::CollectionSchema)
//! by the ingestion pipeline and the search engine.

mod http;
mod onnx;

pub use http::{HealthResponse, HttpEmbeddingModel};
pub use onnx::OnnxEmbeddingModel;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingBackend, EmbeddingConfig};
use crate::utils::is_well_formed;

/// The underlying model: one call embeds one chunk of texts.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Length of every vector this model produces.
    fn dimension(&self) -> usize;

    /// Raw (unnormalised) embeddings for `texts`, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Batching, order-preserving front end over an [`EmbeddingModel`].
#[derive(Clone)]
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
    batch_size: usize,
    normalize: bool,
    concurrency: usize,
}

impl Embedder {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            batch_size: 32,
            normalize: true,
            concurrency: 1,
        }
    }

    /// Builds the configured backend.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model: Arc<dyn EmbeddingModel> = match config.backend {
            EmbeddingBackend::Http => Arc::new(HttpEmbeddingModel::new(config)?),
            EmbeddingBackend::Onnx => {
                let model_dir = config.model_dir().ok_or_else(|| {
                    EmbeddingError::InvalidInput("could not determine model directory".to_string())
                })?;
                Arc::new(OnnxEmbeddingModel::load(config, &model_dir)?)
            }
        };

        tracing::info!(
            backend = ?config.backend,
            model = %config.model_id,
            dimension = model.dimension(),
            "Embedder initialized"
        );

        Ok(Self::new(model)
            .with_batch_size(config.batch_size as usize)
            .with_normalize(config.normalize)
            .with_concurrency(config.concurrency))
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Maximum number of chunks in flight at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Encodes `texts` in chunks of `batch_size`.
    ///
    /// Fails with [`EmbeddingError::InvalidInput`] when `texts` is empty, when
    /// none of them has visible content, or when `batch_size` is zero.
    pub async fn encode(
        &self,
        texts: &[String],
        batch_size: usize,
        normalize: bool,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "input must be a non-empty list of strings".to_string(),
            ));
        }
        if !texts.iter().any(|t| is_well_formed(t)) {
            return Err(EmbeddingError::InvalidInput(
                "input contains no non-blank strings".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(EmbeddingError::InvalidInput(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        let dimension = self.model.dimension();
        let chunks: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size).enumerate())
            .map(|(i, chunk)| async move {
                let start = i * batch_size;
                let vectors = self.model.embed(chunk).await.inspect_err(|e| {
                    tracing::error!(
                        start,
                        end = start + chunk.len(),
                        error = %e,
                        "Embedding generation failed"
                    );
                })?;
                check_shape(&vectors, chunk.len(), dimension)?;
                Ok::<_, EmbeddingError>(vectors)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut embeddings: Vec<Vec<f32>> = chunks.into_iter().flatten().collect();
        if normalize {
            embeddings.iter_mut().for_each(|v| normalize_in_place(v));
        }

        tracing::debug!(count = embeddings.len(), normalize, "Encoded texts");
        Ok(embeddings)
    }

    /// Single-item encode used for queries.
    pub async fn encode_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode(&[text.to_string()], 1, self.normalize)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("dimension", &self.model.dimension())
            .field("batch_size", &self.batch_size)
            .field("normalize", &self.normalize)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

fn check_shape(vectors: &[Vec<f32>], expected: usize, dimension: usize) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected dimension {}, got {}",
            dimension,
            bad.len()
        )));
    }
    Ok(())
}

/// Scales `v` to unit L2 norm; zero vectors are left unchanged.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::HashModel;
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_result_independent_of_batch_size() {
        let model = Arc::new(HashModel::new(8));
        let embedder = Embedder::new(model.clone());
        let input = texts(&["login", "logout", "reset password", "checkout", "search"]);

        let whole = embedder.encode(&input, input.len(), true).await.unwrap();
        let single = embedder.encode(&input, 1, true).await.unwrap();
        let larger = embedder.encode(&input, 100, true).await.unwrap();

        assert_eq!(whole.len(), input.len());
        assert!(whole.iter().all(|v| v.len() == 8));
        assert_eq!(whole, single);
        assert_eq!(whole, larger);
    }

    #[tokio::test]
    async fn test_chunks_bounded_by_batch_size() {
        let model = Arc::new(HashModel::new(4));
        let embedder = Embedder::new(model.clone());
        let input = texts(&["a", "b", "c", "d", "e"]);

        embedder.encode(&input, 2, false).await.unwrap();

        assert_eq!(*model.calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_concurrent_chunks_keep_order() {
        let model = Arc::new(HashModel::new(4));
        let embedder = Embedder::new(model.clone()).with_concurrency(4);
        let input = texts(&["a", "b", "c", "d", "e", "f", "g"]);

        let vectors = embedder.encode(&input, 2, false).await.unwrap();
        let expected: Vec<Vec<f32>> = input.iter().map(|t| model.vector_for(t)).collect();
        assert_eq!(vectors, expected);
    }

    #[tokio::test]
    async fn test_normalize_produces_unit_vectors() {
        let embedder = Embedder::new(Arc::new(HashModel::new(6)));
        let vectors = embedder
            .encode(&texts(&["priority high", "x"]), 2, true)
            .await
            .unwrap();

        for v in vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_and_blank_input() {
        let embedder = Embedder::new(Arc::new(HashModel::new(4)));

        let err = embedder.encode(&[], 4, true).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));

        let err = embedder
            .encode(&texts(&["", "   "]), 4, true)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));

        let err = embedder.encode(&texts(&["a"]), 0, true).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_encode_query_returns_single_vector() {
        let model = Arc::new(HashModel::new(4));
        let embedder = Embedder::new(model.clone()).with_normalize(false);
        let v = embedder.encode_query("login").await.unwrap();
        assert_eq!(v, model.vector_for("login"));
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0];
        normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
