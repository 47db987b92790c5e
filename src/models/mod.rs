mod config;
mod record;
mod schema;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL, EmbeddingBackend, EmbeddingConfig, IngestConfig,
    SearchConfig, VectorStoreConfig,
};
pub use record::{
    MetadataRow, MetadataTable, Record, RecordBatch, RecordRow, RecordSet, RecordSources,
};
pub use schema::{
    CollectionSchema, DEFAULT_NLIST, DEFAULT_TEXT_FIELD, DEFAULT_TEXT_MAX_LEN,
    DEFAULT_VECTOR_FIELD, IndexSpec, IndexType, Metric, PrimaryKeyPolicy,
};
pub use search::{Filters, OutputFormat, SearchResult, SearchResults};
