//! Remote embedding model served over HTTP (text-embeddings-inference API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::EmbeddingModel;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::{RetryConfig, with_retry};

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
    /// Normalisation is applied by [`super::Embedder`], never by the server.
    normalize: bool,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Health response from the /health endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Client for an embedding server.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingModel {
    client: Client,
    base_url: String,
    dimension: usize,
    retry: RetryConfig,
}

impl HttpEmbeddingModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            dimension: config.dimension as usize,
            retry: RetryConfig::new(config.max_retries),
        })
    }

    /// Check if the embedding server is healthy and ready.
    pub async fn health_check(&self) -> Result<HealthResponse, EmbeddingError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServerError(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }

        // Some servers answer health checks with an empty or plain-text body
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(HealthResponse {
            status: Some("healthy".to_string()),
            model_id: None,
        }))
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: true,
            normalize: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(embed_response.0)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        with_retry(&self.retry, "embed", || self.embed_once(texts)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = EmbeddingConfig::default();
        let model = HttpEmbeddingModel::new(&config).unwrap();
        assert_eq!(model.dimension(), 384);
    }

    #[test]
    fn test_base_url_trimming() {
        let config = EmbeddingConfig {
            url: "http://localhost:11411/".to_string(),
            ..Default::default()
        };
        let model = HttpEmbeddingModel::new(&config).unwrap();
        assert_eq!(model.base_url(), "http://localhost:11411");
    }

    #[test]
    fn test_request_never_asks_server_to_normalize() {
        let inputs = vec!["login".to_string()];
        let body = serde_json::to_value(EmbedRequest {
            inputs: &inputs,
            truncate: true,
            normalize: false,
        })
        .unwrap();
        assert_eq!(body["normalize"], false);
        assert_eq!(body["inputs"][0], "login");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = EmbeddingConfig {
            url: "http://127.0.0.1:9".to_string(),
            max_retries: 1,
            timeout_secs: 2,
            ..Default::default()
        };
        let model = HttpEmbeddingModel::new(&config).unwrap();
        let err = model.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout | EmbeddingError::RequestError(_)
        ));
    }
}
