//! Durable reference store.
//!
//! Committed batches are kept in memory for reads and in the write-ahead log
//! for durability. A batch reaches the in-memory index only after its frame is
//! in the log.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::reference::{ReferenceBatch, ReferenceEntity, RunId};
use crate::storage::traits::{validate_batch, ReferenceStore, StorageError};

use super::file_lock::DirLock;
use super::wal::WriteAheadLog;
use super::PersistentConfig;

/// Log file name inside a store directory.
pub const WAL_FILE: &str = "references.wal";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Reference store persisted in a single directory.
pub struct PersistentReferenceStore {
    dir: PathBuf,
    _lock: DirLock,
    wal: WriteAheadLog,
    batches: RwLock<Vec<ReferenceBatch>>,
}

impl std::fmt::Debug for PersistentReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentReferenceStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl PersistentReferenceStore {
    /// Opens or creates the store in `dir`, replaying its log.
    ///
    /// # Errors
    /// - `Locked` if another process owns the directory
    /// - `Corrupted` if the log fails verification
    /// - `Io` on filesystem failure
    pub fn open(dir: &Path, config: &PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| {
            StorageError::Io(format!("failed to create store directory {}: {e}", dir.display()))
        })?;

        let lock = DirLock::acquire(dir)?;
        let (wal, recovered) = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)?;

        let mut seen = HashSet::with_capacity(recovered.entries.len());
        let mut batches = Vec::with_capacity(recovered.entries.len());
        for entry in recovered.entries {
            if !seen.insert(entry.batch.run_id) {
                return Err(StorageError::Corrupted(format!(
                    "run {} appears twice in the log",
                    entry.batch.run_id
                )));
            }
            batches.push(entry.batch);
        }

        tracing::info!(
            dir = %dir.display(),
            runs = batches.len(),
            discarded_bytes = recovered.discarded_bytes,
            "opened reference store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            batches: RwLock::new(batches),
        })
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every committed batch, in append order.
    ///
    /// # Errors
    /// Returns `Backend` if the lock is poisoned.
    pub fn batches(&self) -> Result<Vec<ReferenceBatch>, StorageError> {
        Ok(self
            .batches
            .read()
            .map_err(|_| lock_err("persistent.batches"))?
            .clone())
    }
}

impl ReferenceStore for PersistentReferenceStore {
    fn append_batch(&self, batch: &ReferenceBatch) -> Result<(), StorageError> {
        // Held across the log write so appends are serialized.
        let mut batches = self
            .batches
            .write()
            .map_err(|_| lock_err("persistent.append_batch"))?;
        let committed = batches.iter().any(|b| b.run_id == batch.run_id);
        validate_batch(batch, committed)?;

        let sequence = self.wal.append(batch)?;
        batches.push(batch.clone());

        tracing::debug!(
            run_id = %batch.run_id,
            sequence,
            entities = batch.len(),
            "batch committed"
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<ReferenceEntity>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("persistent.read_all"))?;
        Ok(batches
            .iter()
            .flat_map(|b| b.entities.iter().cloned())
            .collect())
    }

    fn read_run(&self, run_id: RunId) -> Result<Option<Vec<ReferenceEntity>>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("persistent.read_run"))?;
        Ok(batches
            .iter()
            .find(|b| b.run_id == run_id)
            .map(|b| b.entities.clone()))
    }

    fn runs(&self) -> Result<Vec<RunId>, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("persistent.runs"))?;
        Ok(batches.iter().map(|b| b.run_id).collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let batches = self
            .batches
            .read()
            .map_err(|_| lock_err("persistent.count"))?;
        Ok(batches.iter().map(ReferenceBatch::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Fingerprint;
    use tempfile::tempdir;

    fn batch(values: &[&str]) -> ReferenceBatch {
        ReferenceBatch::new(
            RunId::new(),
            Fingerprint::compute(b"store", &[]),
            values
                .iter()
                .zip(1u64..)
                .map(|(v, id)| ReferenceEntity::new(id, *v))
                .collect(),
        )
    }

    #[test]
    fn test_reopen_restores_batches() {
        let dir = tempdir().unwrap();
        let cfg = PersistentConfig::default();
        let first = batch(&["123 main st", "456 oak ave"]);
        {
            let store = PersistentReferenceStore::open(dir.path(), &cfg).unwrap();
            store.append_batch(&first).unwrap();
        }

        let store = PersistentReferenceStore::open(dir.path(), &cfg).unwrap();
        assert_eq!(store.batches().unwrap(), vec![first.clone()]);
        assert_eq!(store.read_run(first.run_id).unwrap().unwrap().len(), 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let store =
            PersistentReferenceStore::open(dir.path(), &PersistentConfig::default()).unwrap();
        let first = batch(&["123 main st"]);
        store.append_batch(&first).unwrap();
        let size = std::fs::metadata(dir.path().join(WAL_FILE)).unwrap().len();

        assert!(matches!(store.append_batch(&first), Err(StorageError::DuplicateRun(_))));
        assert!(matches!(store.append_batch(&batch(&[])), Err(StorageError::EmptyBatch)));

        assert_eq!(std::fs::metadata(dir.path().join(WAL_FILE)).unwrap().len(), size);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_directory_is_exclusive() {
        let dir = tempdir().unwrap();
        let config = PersistentConfig::default();
        let _held = PersistentReferenceStore::open(dir.path(), &config).unwrap();
        let err = PersistentReferenceStore::open(dir.path(), &config).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }
}
