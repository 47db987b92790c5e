use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, SearchResults};
use crate::services::IngestReport;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_ingest_report(&self, report: &IngestReport) -> String;
    fn format_collections(&self, collections: &[String], active: &str) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_backend: String,
    pub embedding_model: String,
    pub embedding_location: String,
    pub embedding_ready: bool,
    pub vector_store_backend: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_exists: bool,
    pub points: u64,
}

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        if !results.filters.is_empty() {
            writeln!(output, "Filters: {}", results.filter_summary()).unwrap();
        }
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            writeln!(output, "{}. [ID: {}] [Score: {:.4}]", i + 1, result.id, result.score).unwrap();
            for line in preview(&result.text).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "Ingestion Complete").unwrap();
        writeln!(output, "------------------").unwrap();
        writeln!(output, "Collection: {}", report.collection).unwrap();
        writeln!(output, "Records:    {}", report.total).unwrap();
        writeln!(output, "Inserted:   {}", report.succeeded_rows()).unwrap();
        writeln!(output, "Failed:     {}", report.failed_rows()).unwrap();
        writeln!(output, "Chunks:     {}", report.chunks.len()).unwrap();

        for chunk in report.failed_chunks() {
            writeln!(
                output,
                "  ids {}-{} (rows {}..{}): {}",
                chunk.first_id,
                chunk.last_id,
                chunk.start,
                chunk.end,
                chunk.error.as_deref().unwrap_or_default()
            )
            .unwrap();
        }
        output
    }

    fn format_collections(&self, collections: &[String], active: &str) -> String {
        if collections.is_empty() {
            return "No collections found.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Collections").unwrap();
        writeln!(output, "-----------").unwrap();
        for name in collections {
            let marker = if name == active { "*" } else { " " };
            writeln!(output, "{} {}", marker, name).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding_status = if status.embedding_ready {
            "[READY]"
        } else {
            "[UNAVAILABLE]"
        };
        writeln!(
            output,
            "Embedding:     {} ({})",
            status.embedding_backend, embedding_status
        )
        .unwrap();
        writeln!(output, "  Model:       {}", status.embedding_model).unwrap();
        writeln!(output, "  Location:    {}", status.embedding_location).unwrap();
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_backend, vector_status
        )
        .unwrap();
        writeln!(output, "  URL:         {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.vector_store_connected {
            if status.collection_exists {
                writeln!(output, "  Points:      {}", status.points).unwrap();
            } else {
                writeln!(output, "  (collection not created yet)").unwrap();
            }
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut output = rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let json = serde_json::json!({
            "collection": report.collection,
            "total": report.total,
            "inserted": report.succeeded_rows(),
            "failed": report.failed_rows(),
            "chunks": report.chunks,
        });
        self.render(&json)
    }

    fn format_collections(&self, collections: &[String], active: &str) -> String {
        let json = serde_json::json!({
            "collections": collections,
            "active": active,
        });
        self.render(&json)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        self.render(&serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        if !results.filters.is_empty() {
            writeln!(output, "**Filters:** `{}`\n", results.filter_summary()).unwrap();
        }
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        writeln!(output, "| # | ID | Score | Text |").unwrap();
        writeln!(output, "|---|----|-------|------|").unwrap();
        for (i, result) in results.results.iter().enumerate() {
            let text = preview(&result.text).replace('|', "\\|").replace('\n', " ");
            writeln!(
                output,
                "| {} | {} | {:.4} | {} |",
                i + 1,
                result.id,
                result.score,
                text
            )
            .unwrap();
        }

        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Ingestion Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Collection | `{}` |", report.collection).unwrap();
        writeln!(output, "| Records | {} |", report.total).unwrap();
        writeln!(output, "| Inserted | {} |", report.succeeded_rows()).unwrap();
        writeln!(output, "| Failed | {} |", report.failed_rows()).unwrap();
        writeln!(output, "| Chunks | {} |", report.chunks.len()).unwrap();

        let failed: Vec<_> = report.failed_chunks().collect();
        if !failed.is_empty() {
            writeln!(output, "\n### Failed chunks\n").unwrap();
            for chunk in failed {
                writeln!(
                    output,
                    "- ids {}-{}: {}",
                    chunk.first_id,
                    chunk.last_id,
                    chunk.error.as_deref().unwrap_or_default()
                )
                .unwrap();
            }
        }
        output
    }

    fn format_collections(&self, collections: &[String], active: &str) -> String {
        if collections.is_empty() {
            return "## Collections\n\n*No collections found.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Collections\n").unwrap();
        for name in collections {
            if name == active {
                writeln!(output, "- `{}` (active)", name).unwrap();
            } else {
                writeln!(output, "- `{}`", name).unwrap();
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let embedding_status = if status.embedding_ready { "✅" } else { "❌" };
        writeln!(
            output,
            "### Embedding ({}) {}\n",
            status.embedding_backend, embedding_status
        )
        .unwrap();
        writeln!(output, "- **Model:** {}", status.embedding_model).unwrap();
        writeln!(output, "- **Location:** `{}`\n", status.embedding_location).unwrap();

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.vector_store_backend, vector_status
        )
        .unwrap();
        writeln!(output, "- **URL:** `{}`", status.vector_store_url).unwrap();
        writeln!(output, "- **Collection:** {}", status.collection).unwrap();
        writeln!(output, "- **Points:** {}", status.points).unwrap();

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
