//! Write-ahead log of reference batches.
//!
//! Each committed batch is exactly one frame, so a batch is either entirely in
//! the log or not at all. Recovery replays frames in order; a frame cut short
//! at the tail is a write that never committed and is cut off the file, while
//! a complete frame that fails its checksum stops the open with `Corrupted`.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [FRAME 1: codec-encoded WalEntry]
//! [FRAME 2: codec-encoded WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::ReferenceBatch;
use crate::storage::traits::StorageError;

use super::codec::{self, Frame, HEADER_LEN};

/// One committed batch in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Strictly increasing from 1.
    pub sequence: u64,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// The batch itself.
    pub batch: ReferenceBatch,
}

/// What recovery found on open.
#[derive(Debug, Default)]
pub struct Recovered {
    /// Every committed entry, in log order.
    pub entries: Vec<WalEntry>,
    /// Bytes of uncommitted tail that were discarded.
    pub discarded_bytes: u64,
}

struct WalState {
    file: File,
    committed_len: u64,
    sequence: u64,
}

/// Append-only, single-writer log.
pub struct WriteAheadLog {
    path: PathBuf,
    state: Mutex<WalState>,
    sync_on_write: bool,
}

fn io_err(path: &Path, e: &std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {e}", path.display()))
}

fn lock_err() -> StorageError {
    StorageError::Backend("poisoned lock: wal.state".to_string())
}

impl WriteAheadLog {
    /// Opens or creates the log at `path` and replays it.
    ///
    /// # Errors
    /// - `Corrupted` if a complete frame fails verification or sequences are
    ///   out of order
    /// - `Io` on filesystem failure
    pub fn open(path: &Path, sync_on_write: bool) -> Result<(Self, Recovered), StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_err(path, &e))?;
        let len = file.metadata().map_err(|e| io_err(path, &e))?.len();

        let mut recovered = Recovered::default();
        let committed_len = if len < HEADER_LEN {
            if len > 0 {
                tracing::warn!(path = %path.display(), len, "rewriting truncated log header");
            }
            file.set_len(0).map_err(|e| io_err(path, &e))?;
            codec::write_header(&mut file)?;
            file.sync_all().map_err(|e| io_err(path, &e))?;
            HEADER_LEN
        } else {
            let valid = replay(&file, path, &mut recovered.entries)?;
            if valid < len {
                recovered.discarded_bytes = len - valid;
                tracing::warn!(
                    path = %path.display(),
                    discarded = recovered.discarded_bytes,
                    "discarding uncommitted log tail"
                );
                file.set_len(valid).map_err(|e| io_err(path, &e))?;
                file.sync_all().map_err(|e| io_err(path, &e))?;
            }
            valid
        };

        file.seek(SeekFrom::Start(committed_len))
            .map_err(|e| io_err(path, &e))?;

        let sequence = recovered.entries.last().map_or(0, |e| e.sequence);
        let wal = Self {
            path: path.to_path_buf(),
            state: Mutex::new(WalState {
                file,
                committed_len,
                sequence,
            }),
            sync_on_write,
        };
        Ok((wal, recovered))
    }

    /// Appends one batch as a single frame and returns its sequence number.
    ///
    /// On failure the file is cut back to its last committed length.
    ///
    /// # Errors
    /// `Serialization` if the batch cannot be encoded, `Io` on write failure.
    pub fn append(&self, batch: &ReferenceBatch) -> Result<u64, StorageError> {
        let mut state = self.state.lock().map_err(|_| lock_err())?;

        let sequence = state.sequence + 1;
        let encoded = codec::encode(&WalEntry {
            sequence,
            timestamp: Utc::now(),
            batch: batch.clone(),
        })?;

        let written = state.file.write_all(&encoded).and_then(|()| {
            if self.sync_on_write {
                state.file.sync_data()
            } else {
                state.file.flush()
            }
        });

        if let Err(e) = written {
            let committed = state.committed_len;
            let rollback = state
                .file
                .set_len(committed)
                .and_then(|()| state.file.seek(SeekFrom::Start(committed)).map(|_| ()));
            if let Err(re) = rollback {
                tracing::error!(
                    path = %self.path.display(),
                    error = %re,
                    "failed to roll back partial append"
                );
            }
            return Err(io_err(&self.path, &e));
        }

        state.committed_len += encoded.len() as u64;
        state.sequence = sequence;
        Ok(sequence)
    }

    /// Sequence number of the last committed entry, 0 if none.
    ///
    /// # Errors
    /// `Backend` if the lock is poisoned.
    pub fn current_sequence(&self) -> Result<u64, StorageError> {
        Ok(self.state.lock().map_err(|_| lock_err())?.sequence)
    }

    /// Committed size of the log in bytes.
    ///
    /// # Errors
    /// `Backend` if the lock is poisoned.
    pub fn size_bytes(&self) -> Result<u64, StorageError> {
        Ok(self.state.lock().map_err(|_| lock_err())?.committed_len)
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every committed entry and returns the byte length they span.
fn replay(file: &File, path: &Path, entries: &mut Vec<WalEntry>) -> Result<u64, StorageError> {
    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| io_err(path, &e))?;
    codec::read_header(&mut reader)?;

    let mut valid = HEADER_LEN;
    loop {
        match codec::decode::<WalEntry>(&mut reader)? {
            Frame::Record(entry) => {
                let expected = entries.last().map_or(1, |e| e.sequence + 1);
                if entry.sequence != expected {
                    return Err(StorageError::Corrupted(format!(
                        "log sequence jumps from {} to {}",
                        expected - 1,
                        entry.sequence
                    )));
                }
                entries.push(entry);
                valid = reader.stream_position().map_err(|e| io_err(path, &e))?;
            }
            Frame::End | Frame::Torn => return Ok(valid),
        }
    }
}
