//! Interactive query loop.

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{connector, load_metadata};
use crate::cli::output::{Formatter, get_formatter};
use crate::cli::query::{QueryLine, parse_query_line};
use crate::models::{Config, OutputFormat};
use crate::services::{Embedder, SearchEngine};

const PROMPT: &str = "query> ";

#[derive(Debug, Args)]
pub struct InteractiveArgs {
    #[arg(long, short = 'k', help = "Number of nearest neighbours to retrieve")]
    pub top_k: Option<usize>,

    #[arg(
        long,
        help = "CSV files (or globs) the collection was ingested from, used for filters"
    )]
    pub metadata: Vec<String>,

    #[arg(long, help = "Text column of the metadata files")]
    pub text_column: Option<String>,
}

pub async fn handle_interactive(
    args: InteractiveArgs,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let top_k = args.top_k.unwrap_or(config.search.default_top_k as usize);
    if top_k == 0 {
        anyhow::bail!("top_k must be at least 1");
    }

    let text_column = args
        .text_column
        .unwrap_or_else(|| config.ingest.text_column.clone());
    let metadata = load_metadata(&args.metadata, &text_column)?;
    let has_metadata = metadata.is_some();

    let embedder = Embedder::from_config(&config.embedding).context("failed to load embedder")?;
    let schema = config.collection_schema();
    let connector = connector(&config);

    connector
        .with_connection(|connection| async move {
            let mut engine = SearchEngine::new(connection, embedder, schema)?;
            if let Some(table) = metadata {
                engine = engine.with_metadata(table);
            }
            engine.verify_collection().await?;
            if verbose {
                eprintln!("Collection: {}", engine.schema().name);
                eprintln!("  Top k: {top_k}");
            }
            query_loop(&engine, top_k, has_metadata, formatter.as_ref())
                .await
                .context("failed to read input")
        })
        .await
}

async fn query_loop(
    engine: &SearchEngine,
    top_k: usize,
    has_metadata: bool,
    formatter: &dyn Formatter,
) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Enter a query, optionally with key=value filters. Type 'exit' or 'quit' to leave.");

    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let (text, filters) = match parse_query_line(&line) {
            QueryLine::Exit => break,
            QueryLine::Empty => continue,
            QueryLine::MissingQuery(_) => {
                print!("{}", formatter.format_message("Please enter query text along with filters."));
                continue;
            }
            QueryLine::Query { text, filters } => (text, filters),
        };

        if !filters.is_empty() && !has_metadata {
            print!(
                "{}",
                formatter.format_error("filters need --metadata with the ingested CSV files")
            );
            continue;
        }

        match engine.search_with_filter(&text, top_k, &filters).await {
            Ok(results) => print!("{}", formatter.format_search_results(&results)),
            Err(e) => print!("{}", formatter.format_error(&e.to_string())),
        }
    }

    Ok(())
}
