use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::schema::{
    CollectionSchema, DEFAULT_NLIST, DEFAULT_TEXT_MAX_LEN, IndexSpec, IndexType, Metric,
};
use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "test_plan_embeddings";

const ENV_QDRANT_URL: &str = "TABSEARCH_QDRANT_URL";
const ENV_QDRANT_API_KEY: &str = "TABSEARCH_QDRANT_API_KEY";
const ENV_EMBEDDING_URL: &str = "TABSEARCH_EMBEDDING_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tabsearch").join("config.toml"))
    }

    /// Loads the config file (or defaults) and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();

        if let Ok(url) = std::env::var(ENV_QDRANT_URL) {
            self.vector_store.url = url;
        }
        if let Ok(key) = std::env::var(ENV_QDRANT_API_KEY) {
            self.vector_store.api_key = Some(key);
        }
        if let Ok(url) = std::env::var(ENV_EMBEDDING_URL) {
            self.embedding.url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.embedding.dimension == 0, "embedding.dimension"),
            (self.embedding.batch_size == 0, "embedding.batch_size"),
            (self.embedding.concurrency == 0, "embedding.concurrency"),
            (self.ingest.batch_size == 0, "ingest.batch_size"),
            (self.ingest.concurrency == 0, "ingest.concurrency"),
            (self.vector_store.text_max_len == 0, "vector_store.text_max_len"),
            (self.search.default_top_k == 0, "search.default_top_k"),
        ];

        if let Some((_, field)) = checks.iter().find(|(invalid, _)| *invalid) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    /// Schema for the configured collection.
    pub fn collection_schema(&self) -> CollectionSchema {
        CollectionSchema::new(
            self.vector_store.collection.clone(),
            self.embedding.dimension as usize,
        )
        .with_metric(self.vector_store.metric)
        .with_text_max_len(self.vector_store.text_max_len)
        .with_normalized(self.embedding.normalize)
    }

    /// Index built when the ingestion path creates the collection.
    pub fn index_spec(&self) -> IndexSpec {
        let schema = self.collection_schema();
        match self.vector_store.index_type {
            IndexType::Flat => IndexSpec::flat(schema.metric),
            IndexType::IvfFlat => IndexSpec::ivf_flat(schema.metric, self.vector_store.nlist),
        }
        .with_field(schema.vector_field)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Remote text-embeddings server.
    #[default]
    Http,
    /// Local ONNX sentence-transformer.
    Onnx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: u32,

    /// Must match the value used when the collection was populated.
    #[serde(default = "default_true")]
    pub normalize: bool,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_one")]
    pub concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_batch_size() -> u32 {
    32
}

fn default_true() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    256
}

fn default_timeout() -> u64 {
    120
}

fn default_one() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

impl EmbeddingConfig {
    pub fn model_dir(&self) -> Option<PathBuf> {
        self.model_dir.clone().or_else(|| {
            dirs::data_dir().map(|p| p.join("tabsearch").join("models").join(&self.model_id))
        })
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            url: default_embedding_url(),
            model_dir: None,
            model_id: default_model_id(),
            dimension: default_dimension(),
            batch_size: default_embedding_batch_size(),
            normalize: true,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            concurrency: default_one(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub index_type: IndexType,

    #[serde(default = "default_nlist")]
    pub nlist: u64,

    #[serde(default = "default_text_max_len")]
    pub text_max_len: usize,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_nlist() -> u64 {
    DEFAULT_NLIST
}

fn default_text_max_len() -> usize {
    DEFAULT_TEXT_MAX_LEN
}

fn default_store_timeout() -> u64 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
            metric: Metric::default(),
            index_type: IndexType::default(),
            nlist: default_nlist(),
            text_max_len: default_text_max_len(),
            timeout_secs: default_store_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_insert_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_one")]
    pub concurrency: usize,

    #[serde(default = "default_text_column")]
    pub text_column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

fn default_insert_batch_size() -> usize {
    500
}

fn default_text_column() -> String {
    "description".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_insert_batch_size(),
            concurrency: default_one(),
            text_column: default_text_column(),
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_top_k() -> u32 {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            default_format: OutputFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.url, DEFAULT_EMBEDDING_URL);
        assert_eq!(config.vector_store.url, DEFAULT_QDRANT_URL);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_embedding_config_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.dimension, 384);
        assert_eq!(config.batch_size, 32);
        assert!(config.normalize);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vector_store]
            collection = "regression_plans"
            metric = "l2"

            [embedding]
            normalize = false
            "#,
        )
        .unwrap();

        assert_eq!(config.vector_store.collection, "regression_plans");
        assert_eq!(config.vector_store.metric, Metric::L2);
        assert_eq!(config.ingest.batch_size, 500);

        let schema = config.collection_schema();
        assert_eq!(schema.dimension, 384);
        assert!(!schema.normalized);
        assert_eq!(config.index_spec().param("nlist"), Some(DEFAULT_NLIST));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ingest.batch_size"));
    }
}
