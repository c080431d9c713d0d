//! CSV street source.
//!
//! Reads one named column from a headered CSV file. Values are passed through
//! verbatim; whitespace and case are left for the pipeline to deal with.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::corpus::RawAddressRecord;
use crate::storage::traits::{SourceError, StreetSource};

/// Column read when none is configured.
pub const DEFAULT_STREET_COLUMN: &str = "street";

/// Street source backed by a CSV file on disk.
#[derive(Debug, Clone)]
pub struct CsvStreetSource {
    path: PathBuf,
    column: String,
}

impl CsvStreetSource {
    /// Reads the [`DEFAULT_STREET_COLUMN`] of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_column(path, DEFAULT_STREET_COLUMN)
    }

    /// Reads `column` of `path`.
    pub fn with_column(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            column: column.into(),
        }
    }

    /// File the source reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column the source reads.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }
}

impl StreetSource for CsvStreetSource {
    fn read_records(&self) -> Result<Vec<RawAddressRecord>, SourceError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| SourceError::Io(format!("{}: {e}", self.path.display())))?;
        read_column(file, &self.column)
    }
}

/// Extracts `column` from every row of a headered CSV stream.
///
/// # Errors
/// - `MissingColumn` if the header lacks `column`
/// - `Malformed` if a row is undecodable or too short
pub fn read_column(reader: impl Read, column: &str) -> Result<Vec<RawAddressRecord>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| header_err(&e))?.clone();
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| SourceError::MissingColumn {
            column: column.to_string(),
        })?;

    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let row = row + 1;
        let record = result.map_err(|e| SourceError::Malformed {
            row,
            message: e.to_string(),
        })?;
        let value = record.get(idx).ok_or_else(|| SourceError::Malformed {
            row,
            message: format!(
                "row has {} fields, column '{column}' is field {}",
                record.len(),
                idx + 1
            ),
        })?;
        records.push(RawAddressRecord::new(value));
    }

    tracing::debug!(column, rows = records.len(), "read street column");
    Ok(records)
}

fn header_err(e: &csv::Error) -> SourceError {
    if e.is_io_error() {
        SourceError::Io(e.to_string())
    } else {
        SourceError::Malformed {
            row: 0,
            message: e.to_string(),
        }
    }
}
