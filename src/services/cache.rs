//! On-disk (text, vector) cache so embeddings survive across runs.
//!
//! The file is a CSV table with a `text` column and a `vector` column holding
//! the components joined by commas. Components are written with Rust's
//! shortest round-trip float formatting, so a load reproduces the saved
//! vectors exactly.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::CacheError;

const TEXT_COLUMN: &str = "text";
const VECTOR_COLUMN: &str = "vector";

/// One cached embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub text: String,
    pub vector: Vec<f32>,
}

impl CacheEntry {
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            vector,
        }
    }
}

/// Reads and writes cache files of a fixed vector dimension.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingCache {
    dimension: usize,
}

impl EmbeddingCache {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Writes `entries` to `destination`, replacing any previous file.
    ///
    /// The table is written to a temporary file in the destination directory
    /// and renamed into place, so a concurrent `load` sees either the old or
    /// the new file, never a partial one.
    pub fn save(&self, entries: &[CacheEntry], destination: &Path) -> Result<(), CacheError> {
        for (i, entry) in entries.iter().enumerate() {
            if entry.vector.len() != self.dimension {
                return Err(CacheError::Validation(format!(
                    "entry {} has {} components, expected {}",
                    i,
                    entry.vector.len(),
                    self.dimension
                )));
            }
            if entry.vector.iter().any(|v| !v.is_finite()) {
                return Err(CacheError::Validation(format!(
                    "entry {} contains a non-finite component",
                    i
                )));
            }
        }

        let io_err = |source: std::io::Error| CacheError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let dir = parent_dir(destination);
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer
                .write_record([TEXT_COLUMN, VECTOR_COLUMN])
                .map_err(|e| io_err(e.into()))?;
            for entry in entries {
                writer
                    .write_record([entry.text.as_str(), &serialize_vector(&entry.vector)])
                    .map_err(|e| io_err(e.into()))?;
            }
            writer.flush().map_err(io_err)?;
        }

        tmp.as_file_mut().flush().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(destination).map_err(|e| io_err(e.error))?;

        tracing::info!(
            path = %destination.display(),
            entries = entries.len(),
            "Saved embeddings cache"
        );
        Ok(())
    }

    /// Reads a cache file back in saved order.
    pub fn load(&self, source: &Path) -> Result<Vec<CacheEntry>, CacheError> {
        let file = File::open(source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(source.to_path_buf())
            } else {
                CacheError::Io {
                    path: source.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file);

        let headers = reader.headers().map_err(|e| CacheError::Format {
            row: 0,
            reason: e.to_string(),
        })?;
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| CacheError::Format {
                    row: 0,
                    reason: format!("missing required column '{}'", name),
                })
        };
        let text_idx = column(TEXT_COLUMN)?;
        let vector_idx = column(VECTOR_COLUMN)?;

        let mut entries = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let row = i + 1;
            let record = record.map_err(|e| CacheError::Format {
                row,
                reason: e.to_string(),
            })?;

            let text = record.get(text_idx).ok_or_else(|| CacheError::Format {
                row,
                reason: format!("missing '{}' field", TEXT_COLUMN),
            })?;
            let raw_vector = record.get(vector_idx).ok_or_else(|| CacheError::Format {
                row,
                reason: format!("missing '{}' field", VECTOR_COLUMN),
            })?;

            let vector = parse_vector(raw_vector, self.dimension)
                .map_err(|reason| CacheError::Format { row, reason })?;
            entries.push(CacheEntry::new(text, vector));
        }

        tracing::info!(
            path = %source.display(),
            entries = entries.len(),
            "Loaded embeddings cache"
        );
        Ok(entries)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn serialize_vector(vector: &[f32]) -> String {
    vector
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_vector(raw: &str, dimension: usize) -> Result<Vec<f32>, String> {
    if raw.trim().is_empty() {
        return Err("empty vector".to_string());
    }

    let vector = raw
        .split(',')
        .map(|part| match part.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => Err(format!("'{}' is not a finite number", part.trim())),
            Err(_) => Err(format!("'{}' is not a number", part.trim())),
        })
        .collect::<Result<Vec<f32>, String>>()?;

    if vector.len() != dimension {
        return Err(format!(
            "vector has {} components, expected {}",
            vector.len(),
            dimension
        ));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries() -> Vec<CacheEntry> {
        vec![
            CacheEntry::new("Verify login, with \"quotes\"", vec![0.1, -0.333_333_34, 1e-8]),
            CacheEntry::new("multi\nline text", vec![1.0, 0.0, -1.0]),
            CacheEntry::new("checkout", vec![f32::MAX, f32::MIN_POSITIVE, 0.5]),
        ]
    }

    #[test]
    fn test_round_trip_is_exact_and_ordered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        let cache = EmbeddingCache::new(3);

        cache.save(&entries(), &path).unwrap();
        let loaded = cache.load(&path).unwrap();

        assert_eq!(loaded, entries());
    }

    #[test]
    fn test_save_replaces_existing_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        let cache = EmbeddingCache::new(3);

        cache.save(&entries(), &path).unwrap();
        cache.save(&entries()[..1], &path).unwrap();

        assert_eq!(cache.load(&path).unwrap().len(), 1);
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = EmbeddingCache::new(3)
            .load(&dir.path().join("absent.csv"))
            .unwrap_err();
        assert!(matches!(err, CacheError::NotFound(_)));
    }

    #[test]
    fn test_save_to_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no_such_dir").join("cache.csv");
        let err = EmbeddingCache::new(3).save(&entries(), &path).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[test]
    fn test_load_rejects_wrong_dimension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        std::fs::write(&path, "text,vector\nok,\"1,2,3\"\nshort,\"1,2\"\n").unwrap();

        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 2, .. }));
    }

    #[test]
    fn test_load_rejects_non_numeric_component() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        std::fs::write(&path, "text,vector\nbad,\"1,abc,3\"\n").unwrap();

        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 1, reason } if reason.contains("abc")));
    }

    #[test]
    fn test_load_rejects_non_finite_component() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        std::fs::write(&path, "text,vector\nok,\"1,2,3\"\nnan,\"1,NaN,3\"\n").unwrap();

        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 2, reason } if reason.contains("finite")));

        std::fs::write(&path, "text,vector\ninf,\"inf,0,0\"\n").unwrap();
        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 1, .. }));
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        std::fs::write(&path, "description,embedding\nx,\"1,2,3\"\n").unwrap();

        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 0, .. }));
    }

    #[test]
    fn test_load_rejects_short_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.csv");
        std::fs::write(&path, "text,vector\nonly-text\n").unwrap();

        let err = EmbeddingCache::new(3).load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Format { row: 1, .. }));
    }

    #[test]
    fn test_save_rejects_mismatched_dimension() {
        let dir = TempDir::new().unwrap();
        let err = EmbeddingCache::new(4)
            .save(&entries(), &dir.path().join("cache.csv"))
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
    }
}
