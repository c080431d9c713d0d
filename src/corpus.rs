//! Raw records and the deduplicated street corpus.
//!
//! The index a street receives in [`UniqueStreetSet`] is its first-appearance
//! position in the raw record stream. That index is the stable enumeration
//! order used by the vectorizer rows, cluster membership lists and every
//! tie-break downstream.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// One source row contributing a free-text street.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAddressRecord {
    /// The street exactly as the source supplied it.
    pub street_text: String,
}

impl RawAddressRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(street_text: impl Into<String>) -> Self {
        Self {
            street_text: street_text.into(),
        }
    }
}

impl From<&str> for RawAddressRecord {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RawAddressRecord {
    fn from(street_text: String) -> Self {
        Self { street_text }
    }
}

/// A distinct street and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueStreet {
    /// Exact (case-sensitive, pre-normalization) street text.
    pub text: String,
    /// Number of raw records carrying this text.
    pub frequency: usize,
}

/// Distinct streets in first-appearance order, with occurrence counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueStreetSet {
    streets: Vec<UniqueStreet>,
    total_records: usize,
}

impl UniqueStreetSet {
    /// Deduplicates records by exact string equality.
    #[must_use]
    pub fn from_records(records: &[RawAddressRecord]) -> Self {
        Self::from_texts(records.iter().map(|r| r.street_text.as_str()))
    }

    /// Deduplicates raw street strings by exact string equality.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut position: HashMap<&'a str, usize> = HashMap::new();
        let mut streets: Vec<UniqueStreet> = Vec::new();
        let mut total_records = 0usize;

        for text in texts {
            total_records += 1;
            match position.get(text) {
                Some(&idx) => streets[idx].frequency += 1,
                None => {
                    position.insert(text, streets.len());
                    streets.push(UniqueStreet {
                        text: text.to_string(),
                        frequency: 1,
                    });
                }
            }
        }

        Self {
            streets,
            total_records,
        }
    }

    /// Number of distinct streets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streets.len()
    }

    /// Returns true if no records were seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streets.is_empty()
    }

    /// Number of raw records, equal to the sum of all frequencies.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.total_records
    }

    /// Street at a stable index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&UniqueStreet> {
        self.streets.get(index)
    }

    /// Streets in stable index order.
    #[must_use]
    pub fn streets(&self) -> &[UniqueStreet] {
        &self.streets
    }

    /// Street texts in stable index order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.streets.iter().map(|s| s.text.as_str())
    }

    /// Indices of the `n` most frequent streets.
    ///
    /// Ranking is by frequency descending, then by lower index, so the result
    /// is fully determined by the input order.
    #[must_use]
    pub fn top_n_indices(&self, n: usize) -> BTreeSet<usize> {
        let mut ranked: Vec<usize> = (0..self.streets.len()).collect();
        ranked.sort_by(|&a, &b| {
            self.streets[b]
                .frequency
                .cmp(&self.streets[a].frequency)
                .then(a.cmp(&b))
        });
        ranked.into_iter().take(n).collect()
    }
}
