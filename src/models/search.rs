//! Search-related models for queries and results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Equality filters applied to metadata after retrieval, keyed by column.
pub type Filters = BTreeMap<String, String>;

/// Output format for search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// A single ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Record id
    pub id: i64,

    /// Similarity or distance, depending on the collection metric
    pub score: f32,

    /// Stored text payload
    pub text: String,
}

/// Results of one query, best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Query that was executed
    pub query: String,

    /// Filters applied after retrieval
    pub filters: Filters,

    /// Matching results
    pub results: Vec<SearchResult>,

    /// Query execution time in milliseconds
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, filters: Filters, results: Vec<SearchResult>, duration_ms: u64) -> Self {
        Self {
            query,
            filters,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Filters rendered as `key=value` pairs.
    pub fn filter_summary(&self) -> String {
        self.filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "md".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn test_search_results() {
        let filters = Filters::from([
            ("priority".to_string(), "High".to_string()),
            ("area".to_string(), "login".to_string()),
        ]);
        let results = SearchResults::new("test".to_string(), filters, vec![], 50);
        assert!(results.is_empty());
        assert_eq!(results.duration_ms, 50);
        assert_eq!(results.filter_summary(), "area=login, priority=High");
    }
}
