//! Persistent storage backend for refsel.
//!
//! A store is a directory holding:
//! - `references.wal`, an append-only log with one CRC-framed record per batch
//! - `.lock`, an advisory lock giving one process exclusive access
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │        PersistentReferenceStore           │
//! ├───────────────────────────────────────────┤
//! │  in-memory batches  ◄── replay on open    │
//! │          │                                │
//! │          ▼                                │
//! │  ┌─────────────────┐  ┌───────────────┐   │
//! │  │ WriteAheadLog   │  │ DirLock       │   │
//! │  │ (append-only)   │  │ (flock)       │   │
//! │  └─────────────────┘  └───────────────┘   │
//! └───────────────────────────────────────────┘
//! ```

mod codec;
mod file_lock;
mod store;
mod wal;

pub use file_lock::{DirLock, LOCK_FILE};
pub use store::{PersistentReferenceStore, WAL_FILE};
pub use wal::{Recovered, WalEntry, WriteAheadLog};

use std::path::Path;

use crate::storage::traits::StorageError;

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Whether to fsync after every batch (slower but durable across power loss).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

/// Opens or creates a persistent reference store at `path`.
///
/// # Errors
/// - If the directory cannot be created or accessed
/// - If another process holds the lock
/// - If the log fails verification
///
/// # Example
/// ```rust,no_run
/// use refsel::storage::persistent::open_store;
/// use refsel::storage::ReferenceStore;
///
/// let store = open_store("./refs", None)?;
/// println!("{} reference entities", store.count()?);
/// # Ok::<(), refsel::storage::StorageError>(())
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentReferenceStore, StorageError> {
    PersistentReferenceStore::open(path.as_ref(), &config.unwrap_or_default())
}
