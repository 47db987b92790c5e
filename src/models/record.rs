//! Records, metadata rows and the ordered multi-file record collection.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::RecordError;

/// Metadata row for a record, keyed by lower-cased column name.
pub type MetadataRow = HashMap<String, String>;

/// A single text row ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub text: String,
    pub metadata: MetadataRow,
}

/// A row parsed from one input file, before ids are finalised.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    /// Explicit id from an `id` column, if the file has one.
    pub id: Option<i64>,
    pub text: String,
    pub metadata: MetadataRow,
}

/// Rows parsed from a single input file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub rows: Vec<RecordRow>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ordered mapping from a stable file identifier to its parsed batch.
///
/// Iteration and merge order is insertion order. Re-inserting an existing
/// identifier replaces its batch in place.
#[derive(Debug, Clone, Default)]
pub struct RecordSources {
    entries: Vec<(String, RecordBatch)>,
}

impl RecordSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: impl Into<String>, batch: RecordBatch) {
        let file_id = file_id.into();
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == file_id) {
            entry.1 = batch;
        } else {
            self.entries.push((file_id, batch));
        }
    }

    pub fn get(&self, file_id: &str) -> Option<&RecordBatch> {
        self.entries
            .iter()
            .find(|(id, _)| id == file_id)
            .map(|(_, batch)| batch)
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenates every batch in insertion order.
    ///
    /// Rows without an explicit id get their 1-based position in the merged
    /// sequence. Duplicate ids across the result are rejected.
    pub fn merge(self) -> Result<RecordSet, RecordError> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for (file_id, batch) in self.entries {
            for row in batch.rows {
                let position = records.len() as i64 + 1;
                let id = row.id.unwrap_or(position);
                if id < 1 {
                    return Err(RecordError::Validation(format!(
                        "id {} in '{}' must be >= 1",
                        id, file_id
                    )));
                }
                if !seen.insert(id) {
                    return Err(RecordError::Validation(format!(
                        "duplicate id {} in '{}'",
                        id, file_id
                    )));
                }
                records.push(Record {
                    id,
                    text: row.text,
                    metadata: row.metadata,
                });
            }
        }

        Ok(RecordSet { records })
    }
}

/// Merged records with stable ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    /// Metadata table joined to vectors by the same ids used for ingestion.
    pub fn metadata(&self) -> MetadataTable {
        self.records
            .iter()
            .map(|r| (r.id, r.metadata.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Metadata rows looked up by record id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    rows: BTreeMap<i64, MetadataRow>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row, lower-casing its column names.
    pub fn insert(&mut self, id: i64, row: MetadataRow) {
        let row = row
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: i64) -> Option<&MetadataRow> {
        self.rows.get(&id)
    }

    /// True when a row exists for `id` and every filter column is present
    /// with a case-insensitively equal value.
    pub fn matches(&self, id: i64, filters: &BTreeMap<String, String>) -> bool {
        let Some(row) = self.rows.get(&id) else {
            return false;
        };
        filters.iter().all(|(key, expected)| {
            row.get(&key.to_lowercase())
                .is_some_and(|actual| actual.to_lowercase() == expected.to_lowercase())
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<(i64, MetadataRow)> for MetadataTable {
    fn from_iter<T: IntoIterator<Item = (i64, MetadataRow)>>(iter: T) -> Self {
        let mut table = MetadataTable::new();
        for (id, row) in iter {
            table.insert(id, row);
        }
        table
    }
}
