//! Record sources.
//!
//! Input is the processed tabular export of the test-plan spreadsheets: one
//! CSV per sheet, concatenated in argument order.

mod tabular;

pub use tabular::{expand_inputs, load_record_batch, load_sources};

use std::path::PathBuf;

use crate::error::RecordError;
use crate::models::RecordSet;

/// Expands `inputs`, loads every file and merges them into one record set.
pub fn load_records(inputs: &[String], text_column: &str) -> Result<RecordSet, RecordError> {
    let paths: Vec<PathBuf> = expand_inputs(inputs)?;
    if paths.is_empty() {
        return Err(RecordError::Validation("no input files given".to_string()));
    }
    load_sources(&paths, text_column)?.merge()
}
