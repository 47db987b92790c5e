//! Loading processed tabular exports (CSV) into record batches.
//!
//! Header names are normalised with [`normalize_column_name`], cells are
//! trimmed, fully empty rows are dropped and rows with a blank text cell are
//! skipped. An `id` column, when present, supplies explicit record ids;
//! every other column apart from the text column becomes metadata.

use std::path::{Path, PathBuf};

use crate::error::RecordError;
use crate::models::{MetadataRow, RecordBatch, RecordRow, RecordSources};
use crate::utils::normalize_column_name;

const ID_COLUMN: &str = "id";

/// Reads one CSV file.
pub fn load_record_batch(path: &Path, text_column: &str) -> Result<RecordBatch, RecordError> {
    if !path.is_file() {
        return Err(RecordError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();

    let text_column = normalize_column_name(text_column);
    let text_idx = headers
        .iter()
        .position(|h| *h == text_column)
        .ok_or_else(|| RecordError::MissingColumn(text_column.clone()))?;
    let id_idx = headers.iter().position(|h| h == ID_COLUMN);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = i + 2;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let text = record.get(text_idx).unwrap_or_default();
        if text.is_empty() {
            skipped += 1;
            continue;
        }

        let id = match id_idx {
            Some(idx) => Some(parse_id(record.get(idx).unwrap_or_default(), path, line)?),
            None => None,
        };

        let metadata: MetadataRow = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(idx, (name, _))| {
                *idx != text_idx && Some(*idx) != id_idx && !name.is_empty()
            })
            .map(|(_, (name, value))| (name.clone(), value.to_string()))
            .collect();

        rows.push(RecordRow {
            id,
            text: text.to_string(),
            metadata,
        });
    }

    tracing::info!(
        path = %path.display(),
        rows = rows.len(),
        skipped,
        "Loaded records"
    );
    Ok(RecordBatch { rows })
}

/// Reads every file into an ordered [`RecordSources`], keyed by path.
pub fn load_sources(paths: &[PathBuf], text_column: &str) -> Result<RecordSources, RecordError> {
    let mut sources = RecordSources::new();
    for path in paths {
        let batch = load_record_batch(path, text_column)?;
        sources.insert(path.display().to_string(), batch);
    }
    Ok(sources)
}

/// Expands glob patterns into file paths, keeping argument order.
///
/// Arguments without glob metacharacters are taken literally. Each pattern
/// must match at least one file; matches within a pattern are sorted.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, RecordError> {
    let mut paths = Vec::new();

    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(input));
            continue;
        }

        let mut matched: Vec<PathBuf> = glob::glob(input)
            .map_err(|e| RecordError::Validation(format!("invalid pattern '{}': {}", input, e)))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();

        if matched.is_empty() {
            return Err(RecordError::NotFound(PathBuf::from(input)));
        }
        matched.sort();
        paths.append(&mut matched);
    }

    Ok(paths)
}

fn parse_id(value: &str, path: &Path, line: usize) -> Result<i64, RecordError> {
    match value.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(RecordError::Validation(format!(
            "{}:{}: id '{}' is not an integer >= 1",
            path.display(),
            line,
            value
        ))),
    }
}
