use anyhow::{Context, Result};
use clap::Subcommand;

use super::connector;
use crate::cli::output::get_formatter;
use crate::error::VectorStoreError;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CollectionsCommand {
    /// List collections in the vector store
    List,

    /// Create a collection and its index from the configured schema
    Create {
        /// Collection name (defaults to the configured collection)
        name: Option<String>,
    },

    /// Irreversibly delete a collection and all of its data
    Drop {
        /// Collection name (defaults to the configured collection)
        name: Option<String>,

        /// Confirm the deletion
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn handle_collections(
    cmd: CollectionsCommand,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let connector = connector(&config);
    let active = config.vector_store.collection.clone();

    match cmd {
        CollectionsCommand::List => {
            let collections = connector
                .with_connection(|_connection| async {
                    Ok::<_, VectorStoreError>(connector.list_collections().await)
                })
                .await
                .context("failed to connect to vector store")?;
            print!("{}", formatter.format_collections(&collections, &active));
        }
        CollectionsCommand::Create { name } => {
            let mut schema = config.collection_schema();
            if let Some(name) = name {
                schema.name = name;
            }
            let index = config.index_spec();

            let created = connector
                .with_connection(|_connection| async {
                    let exists = connector.has_collection(&schema.name).await?;
                    if !exists {
                        connector.create_collection(&schema).await?;
                        connector.create_index(&schema.name, &index).await?;
                    }
                    Ok::<_, VectorStoreError>(!exists)
                })
                .await
                .context("failed to create collection")?;

            let message = if created {
                format!(
                    "Created collection '{}' (dimension {}, metric {}, index {})",
                    schema.name, schema.dimension, schema.metric, index.index_type
                )
            } else {
                format!("Collection '{}' already exists", schema.name)
            };
            print!("{}", formatter.format_message(&message));
        }
        CollectionsCommand::Drop { name, yes } => {
            let name = name.unwrap_or(active);
            if !yes {
                anyhow::bail!(
                    "refusing to drop collection '{}' without --yes; this deletes all of its data",
                    name
                );
            }

            connector
                .with_connection(|_connection| connector.drop_collection(&name))
                .await
                .context("failed to drop collection")?;
            print!(
                "{}",
                formatter.format_message(&format!("Dropped collection '{}'", name))
            );
        }
    }

    Ok(())
}
