//! Abstract storage traits for refsel.
//!
//! The engine touches the outside world at two points: it reads raw street
//! records from a [`StreetSource`] and appends one batch of reference entities
//! to a [`ReferenceStore`]. Keeping both behind traits lets the same pipeline
//! run against in-memory fixtures, CSV files or the durable store.

use thiserror::Error;

use crate::corpus::RawAddressRecord;
use crate::reference::{ReferenceBatch, ReferenceEntity, RunId};

/// Errors raised by a reference store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The batch carried no entities.
    #[error("Refusing to append an empty batch")]
    EmptyBatch,

    /// The batch repeats an entity id.
    #[error("Duplicate entity id {id} in batch for run {run_id}")]
    DuplicateEntityId { run_id: RunId, id: u64 },

    /// A batch for this run was already committed.
    #[error("Run {0} has already been written")]
    DuplicateRun(RunId),

    /// Another process holds the store.
    #[error("Store is locked: {0}")]
    Locked(String),

    /// Stored data failed verification.
    #[error("Store is corrupted: {0}")]
    Corrupted(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors raised while reading raw records.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be opened or read.
    #[error("Source I/O error: {0}")]
    Io(String),

    /// The expected street column is absent.
    #[error("Source has no column named '{column}'")]
    MissingColumn { column: String },

    /// A row could not be decoded.
    #[error("Malformed row {row}: {message}")]
    Malformed { row: usize, message: String },
}

/// Read side of the input boundary.
pub trait StreetSource: Send + Sync {
    /// Every record, verbatim and in source order. No filtering.
    fn read_records(&self) -> Result<Vec<RawAddressRecord>, SourceError>;
}

/// Append-only destination for reference entities.
///
/// # Atomicity
/// `append_batch` either commits every entity of the batch or none. A failed
/// call must leave `read_all` unchanged.
pub trait ReferenceStore: Send + Sync {
    /// Appends a whole batch.
    ///
    /// # Errors
    /// - `EmptyBatch`, `DuplicateEntityId`, `DuplicateRun` on invalid input,
    ///   checked before anything is written
    /// - backend errors on write failure
    fn append_batch(&self, batch: &ReferenceBatch) -> Result<(), StorageError>;

    /// Every committed entity in append order.
    fn read_all(&self) -> Result<Vec<ReferenceEntity>, StorageError>;

    /// Entities of one run, or `None` if the run was never committed.
    fn read_run(&self, run_id: RunId) -> Result<Option<Vec<ReferenceEntity>>, StorageError>;

    /// Committed runs in append order.
    fn runs(&self) -> Result<Vec<RunId>, StorageError>;

    /// Total committed entities.
    fn count(&self) -> Result<usize, StorageError>;
}

/// Checks a batch against the invariants every store enforces.
///
/// # Errors
/// `EmptyBatch`, `DuplicateEntityId`, or `DuplicateRun` if `already_committed`.
pub fn validate_batch(batch: &ReferenceBatch, already_committed: bool) -> Result<(), StorageError> {
    if batch.is_empty() {
        return Err(StorageError::EmptyBatch);
    }
    if already_committed {
        return Err(StorageError::DuplicateRun(batch.run_id));
    }
    let mut seen = std::collections::HashSet::with_capacity(batch.len());
    for entity in &batch.entities {
        if !seen.insert(entity.id) {
            return Err(StorageError::DuplicateEntityId {
                run_id: batch.run_id,
                id: entity.id,
            });
        }
    }
    Ok(())
}
