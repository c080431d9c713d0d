//! Reference entities and the batches they are persisted in.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::corpus::RawAddressRecord;

/// Identifier of one selection run.
///
/// # Examples
///
/// ```
/// use refsel::RunId;
///
/// let id = RunId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a run ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLAKE3 digest (hex) of a run's configuration and raw input.
///
/// Equal fingerprints mean the run is reproducible from the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes canonical config bytes followed by every raw street, length-prefixed.
    #[must_use]
    pub fn compute(config_bytes: &[u8], records: &[RawAddressRecord]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(config_bytes.len() as u64).to_le_bytes());
        hasher.update(config_bytes);
        hasher.update(&(records.len() as u64).to_le_bytes());
        for record in records {
            let bytes = record.street_text.as_bytes();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonical street standing in for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEntity {
    /// 1-based, gap-free within a run.
    pub id: u64,
    /// Normalized, abbreviated street text.
    pub entity_value: String,
}

impl ReferenceEntity {
    /// Creates a reference entity.
    #[must_use]
    pub fn new(id: u64, entity_value: impl Into<String>) -> Self {
        Self {
            id,
            entity_value: entity_value.into(),
        }
    }
}

/// The unit of persistence: every reference entity a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBatch {
    /// Run that produced the batch.
    pub run_id: RunId,
    /// Fingerprint of the run's inputs.
    pub fingerprint: Fingerprint,
    /// When the batch was assembled.
    pub created_at: DateTime<Utc>,
    /// Entities in id order.
    pub entities: Vec<ReferenceEntity>,
}

impl ReferenceBatch {
    /// Creates a batch stamped with the current time.
    #[must_use]
    pub fn new(run_id: RunId, fingerprint: Fingerprint, entities: Vec<ReferenceEntity>) -> Self {
        Self {
            run_id,
            fingerprint,
            created_at: Utc::now(),
            entities,
        }
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the batch holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
