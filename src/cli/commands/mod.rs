mod collections;
mod config;
mod ingest;
mod interactive;
mod search;
mod status;

pub use collections::CollectionsCommand;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use interactive::InteractiveArgs;
pub use search::SearchArgs;

pub use collections::handle_collections;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use interactive::handle_interactive;
pub use search::handle_search;
pub use status::handle_status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Config, MetadataTable};
use crate::services::{Endpoint, QdrantBackend, VectorStoreConnector};
use crate::sources::load_records;

/// Connector for the configured vector store; not yet connected.
fn connector(config: &Config) -> VectorStoreConnector {
    VectorStoreConnector::new(
        Arc::new(QdrantBackend),
        Endpoint::from(&config.vector_store),
    )
}

/// Metadata table built from the same inputs (and so the same ids) used for
/// ingestion. `None` when no inputs are given.
fn load_metadata(inputs: &[String], text_column: &str) -> Result<Option<MetadataTable>> {
    if inputs.is_empty() {
        return Ok(None);
    }
    let records = load_records(inputs, text_column).context("failed to load metadata")?;
    Ok(Some(records.metadata()))
}

/// Parses a `key=value` argument.
fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}
