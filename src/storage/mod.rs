//! Storage for refsel: where raw streets come from and where reference
//! entities go.
//!
//! The traits live in [`traits`]; the in-memory and CSV implementations are
//! always available, the durable store sits behind the `persistent` feature.

mod csv_source;
mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use csv_source::{read_column, CsvStreetSource, DEFAULT_STREET_COLUMN};
pub use memory::{InMemoryReferenceStore, InMemoryStreetSource};
pub use traits::{validate_batch, ReferenceStore, SourceError, StorageError, StreetSource};
