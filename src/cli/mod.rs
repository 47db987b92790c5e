//! CLI module for tabular semantic search.

pub mod commands;
pub mod output;
pub mod query;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Embed tabular records into a vector store and search them.
#[derive(Debug, Parser)]
#[command(name = "tabsearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed CSV records and insert them into the collection
    Ingest(commands::IngestArgs),

    /// Run one semantic query
    Search(commands::SearchArgs),

    /// Query repeatedly from a prompt
    Interactive(commands::InteractiveArgs),

    /// Manage collections (list, create, drop)
    #[command(subcommand)]
    Collections(commands::CollectionsCommand),

    /// Check embedding backend and vector store status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

// FromStr is implemented in models::search

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_with_filters() {
        let cli = Cli::try_parse_from([
            "tabsearch",
            "--format",
            "json",
            "search",
            "login flow",
            "-k",
            "3",
            "--filter",
            "Priority=High",
            "--metadata",
            "plans.csv",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.query, "login flow");
        assert_eq!(args.top_k, Some(3));
        assert_eq!(args.filters, vec![("Priority".to_string(), "High".to_string())]);
        assert_eq!(args.metadata, vec!["plans.csv".to_string()]);
    }

    #[test]
    fn test_rejects_malformed_filter() {
        let result = Cli::try_parse_from(["tabsearch", "search", "q", "--filter", "priority"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_flag() {
        let cli = Cli::try_parse_from(["tabsearch", "collections", "drop", "plans", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Collections(commands::CollectionsCommand::Drop { ref name, yes: true }) if name.as_deref() == Some("plans")
        ));
    }
}
