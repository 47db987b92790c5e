//! Ingest command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::connector;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{Embedder, IngestPipeline};
use crate::sources::load_records;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// CSV files or glob patterns, merged in the given order
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Column holding the text to embed
    #[arg(long)]
    pub text_column: Option<String>,

    /// Rows per insert call
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Embeddings cache file (reused when it matches the input texts)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Ignore the configured cache file
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let text_column = args
        .text_column
        .unwrap_or_else(|| config.ingest.text_column.clone());
    let batch_size = args.batch_size.unwrap_or(config.ingest.batch_size);
    if batch_size == 0 {
        anyhow::bail!("batch size must be at least 1");
    }
    let cache_path = if args.no_cache {
        None
    } else {
        args.cache.or_else(|| config.ingest.cache_path.clone())
    };

    let records = load_records(&args.inputs, &text_column).context("failed to load records")?;
    if records.is_empty() {
        anyhow::bail!("no records with text in column '{}'", text_column);
    }

    if verbose {
        eprintln!("Records: {}", records.len());
        eprintln!("  Collection: {}", config.vector_store.collection);
        eprintln!("  Batch size: {}", batch_size);
        if let Some(ref path) = cache_path {
            eprintln!("  Cache: {}", path.display());
        }
    }

    let embedder = Embedder::from_config(&config.embedding).context("failed to load embedder")?;
    let pipeline = IngestPipeline::new(embedder, config.collection_schema(), config.index_spec())?
        .with_cache(cache_path)
        .with_batch_size(batch_size)
        .with_concurrency(config.ingest.concurrency);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("invalid progress template")?,
    );
    pb.set_message(format!("Ingesting {} records", records.len()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let connector = connector(&config);
    let result = connector
        .with_connection(|_connection| pipeline.run(&connector, &records))
        .await;
    pb.finish_and_clear();

    let report = result.context("ingestion failed")?;
    print!("{}", formatter.format_ingest_report(&report));

    if !report.is_complete() {
        anyhow::bail!(
            "{} of {} records failed to insert",
            report.failed_rows(),
            report.total
        );
    }

    Ok(())
}
