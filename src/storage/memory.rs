//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits for embedded usage and
//! tests. Nothing survives the process.

use std::sync::RwLock;

use crate::corpus::RawAddressRecord;
use crate::reference::{ReferenceBatch, ReferenceEntity, RunId};
use crate::storage::traits::{
    validate_batch, ReferenceStore, SourceError, StorageError, StreetSource,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Append-only reference store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryReferenceStore {
    batches: RwLock<Vec<ReferenceBatch>>,
}

impl InMemoryReferenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed batch, in append order.
    ///
    /// # Errors
    /// Returns `Backend` if the lock is poisoned.
    pub fn batches(&self) -> Result<Vec<ReferenceBatch>, StorageError> {
        Ok(self
            .batches
            .read()
            .map_err(|_| lock_err("reference.batches"))?
            .clone())
    }
}

impl ReferenceStore for InMemoryReferenceStore {
    fn append_batch(&self, batch: &ReferenceBatch) -> Result<(), StorageError> {
        let mut batches = self
            .batches
            .write()
            .map_err(|_| lock_err("reference.append_batch"))?;
        let committed = batches.iter().any(|b| b.run_id == batch.run_id);
        validate_batch(batch, committed)?;
        batches.push(batch.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<ReferenceEntity>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("reference.read_all"))?;
        Ok(batches
            .iter()
            .flat_map(|b| b.entities.iter().cloned())
            .collect())
    }

    fn read_run(&self, run_id: RunId) -> Result<Option<Vec<ReferenceEntity>>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("reference.read_run"))?;
        Ok(batches
            .iter()
            .find(|b| b.run_id == run_id)
            .map(|b| b.entities.clone()))
    }

    fn runs(&self) -> Result<Vec<RunId>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("reference.runs"))?;
        Ok(batches.iter().map(|b| b.run_id).collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("reference.count"))?;
        Ok(batches.iter().map(ReferenceBatch::len).sum())
    }
}

/// Street source over records already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStreetSource {
    records: Vec<RawAddressRecord>,
}

impl InMemoryStreetSource {
    /// Wraps a list of records.
    #[must_use]
    pub fn new(records: Vec<RawAddressRecord>) -> Self {
        Self { records }
    }

    /// Builds a source from raw street strings.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: texts
                .into_iter()
                .map(|t| RawAddressRecord::new(t.into()))
                .collect(),
        }
    }
}

impl StreetSource for InMemoryStreetSource {
    fn read_records(&self) -> Result<Vec<RawAddressRecord>, SourceError> {
        Ok(self.records.clone())
    }
}
