//! # refsel - Reference Entity Selection
//!
//! refsel turns a noisy, duplicated stream of free-text street strings into a
//! small dictionary of canonical "reference entities" that a fuzzy matcher can
//! compare incoming records against.
//!
//! ## Pipeline
//!
//! - **Corpus**: deduplicate raw records, keeping first-appearance order and frequency
//! - **Vectorizer**: TF-IDF over the distinct streets
//! - **Clusterer**: seeded k-means++ / Lloyd partitioning into K groups
//! - **Selector**: one representative per non-empty cluster (frequency priority
//!   with centroid-distance fallback, or centroid-nearest only)
//! - **Normalizer**: lowercase and abbreviate the representatives
//! - **Store**: append the `(id, entity_value)` batch atomically
//!
//! ## Usage
//!
//! ```rust
//! use refsel::storage::{InMemoryReferenceStore, InMemoryStreetSource, ReferenceStore};
//! use refsel::{ReferenceSelectionEngine, SelectionConfig};
//!
//! let engine = ReferenceSelectionEngine::new(SelectionConfig {
//!     cluster_count: 2,
//!     top_n_frequency_threshold: 1,
//!     ..SelectionConfig::default()
//! })?;
//!
//! let source = InMemoryStreetSource::from_texts(["123 Main St", "123 Main St", "456 Oak Avenue"]);
//! let store = InMemoryReferenceStore::new();
//! let report = engine.run(&source, &store)?;
//!
//! assert_eq!(report.persisted, 2);
//! assert_eq!(store.count()?, 2);
//! # Ok::<(), refsel::RefselError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Pipeline stages
pub mod cluster;
pub mod config;
pub mod corpus;
pub mod normalize;
pub mod select;
pub mod vectorize;

// Runs, errors and storage
pub mod engine;
pub mod error;
pub mod reference;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use cluster::{Cluster, ClusterModel, KMeans, KMeansConfig};
pub use config::{SelectionConfig, SelectionPolicy, StopwordPolicy, TokenizerMode};
pub use corpus::{RawAddressRecord, UniqueStreet, UniqueStreetSet};
pub use engine::{ReferenceSelectionEngine, ReferenceSet, RunReport, RunStats};
pub use error::{ConfigError, FitError, RefselError, RefselResult};
pub use normalize::{AbbreviationTable, Normalizer};
pub use reference::{Fingerprint, ReferenceBatch, ReferenceEntity, RunId};
pub use select::{Representative, RepresentativeSelector, SelectedBy};
pub use storage::{ReferenceStore, SourceError, StorageError, StreetSource};
pub use vectorize::{FeatureMatrix, FittedVectorizer, SparseVector, Vectorizer};
