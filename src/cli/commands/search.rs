use anyhow::{Context, Result};
use clap::Args;

use super::{connector, load_metadata, parse_filter};
use crate::cli::output::get_formatter;
use crate::models::{Config, Filters, OutputFormat};
use crate::services::{Embedder, SearchEngine};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'k', help = "Number of nearest neighbours to retrieve")]
    pub top_k: Option<usize>,

    #[arg(
        long = "filter",
        value_parser = parse_filter,
        help = "Metadata filter applied to the retrieved hits (key=value, repeatable)"
    )]
    pub filters: Vec<(String, String)>,

    #[arg(
        long,
        help = "CSV files (or globs) the collection was ingested from, used for filters"
    )]
    pub metadata: Vec<String>,

    #[arg(long, help = "Text column of the metadata files")]
    pub text_column: Option<String>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);

    let top_k = args.top_k.unwrap_or(config.search.default_top_k as usize);
    if top_k == 0 {
        anyhow::bail!("top_k must be at least 1");
    }

    let filters: Filters = args
        .filters
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let text_column = args
        .text_column
        .unwrap_or_else(|| config.ingest.text_column.clone());
    let metadata = load_metadata(&args.metadata, &text_column)?;
    if !filters.is_empty() && metadata.is_none() {
        anyhow::bail!("--filter requires --metadata with the ingested CSV files");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Top k: {top_k}");
        if !filters.is_empty() {
            let pairs: Vec<String> = filters.iter().map(|(k, v)| format!("{k}={v}")).collect();
            eprintln!("  Filters: {}", pairs.join(", "));
        }
    }

    let embedder = Embedder::from_config(&config.embedding).context("failed to load embedder")?;
    let schema = config.collection_schema();
    let connector = connector(&config);

    let results = connector
        .with_connection(|connection| async move {
            let mut engine = SearchEngine::new(connection, embedder, schema)?;
            if let Some(table) = metadata {
                engine = engine.with_metadata(table);
            }
            engine.search_with_filter(query, top_k, &filters).await
        })
        .await
        .context("search failed")?;

    print!("{}", formatter.format_search_results(&results));

    Ok(())
}
