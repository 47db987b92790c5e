pub mod batch;
pub mod cache;
mod connector;
pub mod embedding;
pub mod pipeline;
pub mod search;
pub mod vector_store;

pub use batch::{BatchIngestionManager, ChunkOutcome, IngestReport};
pub use cache::{CacheEntry, EmbeddingCache};
pub use connector::VectorStoreConnector;
pub use embedding::{Embedder, EmbeddingModel, HttpEmbeddingModel, OnnxEmbeddingModel};
pub use pipeline::IngestPipeline;
pub use search::SearchEngine;
pub use vector_store::{
    Connection, Endpoint, QdrantBackend, StoredCollection, VectorStoreBackend, VectorStoreSession,
};
