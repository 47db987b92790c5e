use anyhow::Result;

use super::connector;
use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingBackend, OutputFormat};
use crate::services::HttpEmbeddingModel;

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (embedding_location, embedding_ready) = match config.embedding.backend {
        EmbeddingBackend::Http => {
            let ready = match HttpEmbeddingModel::new(&config.embedding) {
                Ok(model) => model.health_check().await.is_ok(),
                Err(_) => false,
            };
            (config.embedding.url.clone(), ready)
        }
        EmbeddingBackend::Onnx => match config.embedding.model_dir() {
            Some(dir) => {
                let ready = dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists();
                (dir.display().to_string(), ready)
            }
            None => ("(unknown)".to_string(), false),
        },
    };

    let connector = connector(&config);
    let collection = config.vector_store.collection.clone();
    let (vector_store_connected, collection_exists, points) = match connector.connect().await {
        Ok(connection) => {
            let exists = connection.has_collection(&collection).await.unwrap_or(false);
            let points = if exists {
                connection.count(&collection).await.unwrap_or(0)
            } else {
                0
            };
            connector.disconnect().await;
            (true, exists, points)
        }
        Err(_) => (false, false, 0),
    };

    let status = StatusInfo {
        embedding_backend: format!("{:?}", config.embedding.backend).to_lowercase(),
        embedding_model: config.embedding.model_id.clone(),
        embedding_location,
        embedding_ready,
        vector_store_backend: connector.backend_name().to_string(),
        vector_store_url: config.vector_store.url.clone(),
        vector_store_connected,
        collection,
        collection_exists,
        points,
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_ready || !vector_store_connected {
        eprintln!();
        if !embedding_ready {
            match config.embedding.backend {
                EmbeddingBackend::Http => eprintln!(
                    "Warning: embedding server not reachable at {}",
                    config.embedding.url
                ),
                EmbeddingBackend::Onnx => eprintln!(
                    "Warning: model.onnx and tokenizer.json not found in the model directory"
                ),
            }
        }
        if !vector_store_connected {
            eprintln!("Warning: Qdrant not reachable at {}", config.vector_store.url);
        }
    }

    Ok(())
}
