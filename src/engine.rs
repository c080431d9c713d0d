//! Reference selection engine.
//!
//! Runs the full pipeline for one batch of raw records:
//!
//! ```text
//! records → UniqueStreetSet → TF-IDF → k-means → representatives → normalize → batch
//! ```
//!
//! The engine owns only immutable configuration. Every run builds its own
//! corpus, fitted vectorizer and cluster model, so concurrent runs on one
//! engine share nothing mutable.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::cluster::{check_cluster_count, KMeans, KMeansConfig};
use crate::config::SelectionConfig;
use crate::corpus::{RawAddressRecord, UniqueStreetSet};
use crate::error::{FitError, RefselResult};
use crate::normalize::Normalizer;
use crate::reference::{Fingerprint, ReferenceBatch, ReferenceEntity, RunId};
use crate::select::{to_reference_entities, Representative, RepresentativeSelector, SelectedBy};
use crate::storage::{ReferenceStore, StreetSource};
use crate::vectorize::Vectorizer;

/// Figures describing one selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Raw records read.
    pub record_count: usize,
    /// Distinct streets.
    pub unique_count: usize,
    /// Fitted vocabulary size.
    pub vocabulary_size: usize,
    /// Lloyd iterations of the winning k-means run.
    pub iterations: usize,
    /// Whether k-means converged before the iteration cap.
    pub converged: bool,
    /// Sum of squared distances to assigned centroids.
    pub inertia: f64,
    /// Clusters that ended empty and produced no entity.
    pub empty_clusters: usize,
}

/// Output of [`ReferenceSelectionEngine::select`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSet {
    /// Identifier assigned to the run.
    pub run_id: RunId,
    /// Fingerprint of configuration and input.
    pub fingerprint: Fingerprint,
    /// Chosen street per non-empty cluster, before normalization.
    pub representatives: Vec<Representative>,
    /// Normalized entities, ids `1..=len`.
    pub entities: Vec<ReferenceEntity>,
    /// Run figures.
    pub stats: RunStats,
}

impl ReferenceSet {
    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Packages the entities as a persistence batch.
    #[must_use]
    pub fn to_batch(&self) -> ReferenceBatch {
        ReferenceBatch::new(self.run_id, self.fingerprint.clone(), self.entities.clone())
    }
}

/// Outcome of [`ReferenceSelectionEngine::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier of the committed run.
    pub run_id: RunId,
    /// Fingerprint of configuration and input.
    pub fingerprint: Fingerprint,
    /// Entities committed.
    pub persisted: usize,
    /// Run figures.
    pub stats: RunStats,
}

/// The reference selection pipeline.
///
/// # Examples
///
/// ```
/// use refsel::{RawAddressRecord, ReferenceSelectionEngine, SelectionConfig};
///
/// let config = SelectionConfig {
///     cluster_count: 2,
///     top_n_frequency_threshold: 1,
///     ..SelectionConfig::default()
/// };
/// let engine = ReferenceSelectionEngine::new(config)?;
///
/// let records: Vec<RawAddressRecord> = ["123 Main St", "123 Main St", "456 Oak Avenue"]
///     .into_iter()
///     .map(RawAddressRecord::from)
///     .collect();
/// let set = engine.select(&records)?;
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.entities[0].id, 1);
/// # Ok::<(), refsel::RefselError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceSelectionEngine {
    config: SelectionConfig,
    config_bytes: Vec<u8>,
    normalizer: Normalizer,
    vectorizer: Vectorizer,
    selector: RepresentativeSelector,
}

impl ReferenceSelectionEngine {
    /// Validates `config` and builds the pipeline stages.
    ///
    /// # Errors
    /// Returns a configuration error if any parameter is invalid.
    pub fn new(config: SelectionConfig) -> RefselResult<Self> {
        let config = config.validate()?;
        let config_bytes = config.canonical_json()?;
        let normalizer = Normalizer::new(config.abbreviation_table.clone());
        let vectorizer = Vectorizer::new(config.tokenizer_mode, config.stopword_policy)?;
        let selector =
            RepresentativeSelector::new(config.selection_policy, config.top_n_frequency_threshold);

        Ok(Self {
            config,
            config_bytes,
            normalizer,
            vectorizer,
            selector,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// The normalizer applied to representatives.
    #[must_use]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Selects reference entities from raw records. Performs no I/O.
    ///
    /// # Errors
    /// - `FitError::EmptyCorpus` if there are no records
    /// - `FitError::InvalidClusterCount` if K is zero or exceeds the distinct streets
    /// - `FitError::DegenerateVocabulary` if tokenization leaves no terms
    pub fn select(&self, records: &[RawAddressRecord]) -> RefselResult<ReferenceSet> {
        let run_id = RunId::new();
        let span = info_span!("reference_selection", %run_id);
        let _guard = span.enter();
        self.select_in_run(run_id, records)
    }

    fn select_in_run(
        &self,
        run_id: RunId,
        records: &[RawAddressRecord],
    ) -> RefselResult<ReferenceSet> {
        let fingerprint = Fingerprint::compute(&self.config_bytes, records);

        let streets = UniqueStreetSet::from_records(records);
        info!(
            records = streets.total_records(),
            unique = streets.len(),
            %fingerprint,
            "built street corpus"
        );
        if streets.is_empty() {
            return Err(FitError::EmptyCorpus.into());
        }
        check_cluster_count(self.config.cluster_count, streets.len())?;

        let documents: Vec<&str> = streets.texts().collect();
        let (fitted, matrix) = self.vectorizer.fit_transform(&documents)?;
        debug!(
            vocabulary = fitted.dim(),
            tokenizer = %self.config.tokenizer_mode,
            stopwords = %self.config.stopword_policy,
            "fitted vectorizer"
        );

        let model = KMeans::new(KMeansConfig::from(&self.config)).fit(&matrix)?;
        let empty_clusters = model.empty_clusters();
        info!(
            k = model.k(),
            iterations = model.iterations,
            converged = model.converged,
            inertia = model.inertia,
            "clustered streets"
        );
        if !model.converged {
            warn!(
                max_iterations = self.config.max_iterations,
                "k-means stopped at the iteration cap without converging"
            );
        }
        if empty_clusters > 0 {
            warn!(empty_clusters, "skipping empty clusters");
        }

        let representatives = self.selector.select(&streets, &matrix, &model);
        for rep in &representatives {
            debug!(
                cluster = rep.cluster_id,
                street_index = rep.street_index,
                street = %rep.street,
                rule = %rep.rule,
                "selected representative"
            );
        }
        let by_frequency = representatives
            .iter()
            .filter(|r| r.rule == SelectedBy::TopFrequency)
            .count();

        let entities = to_reference_entities(&representatives, &self.normalizer);
        info!(
            entities = entities.len(),
            by_frequency,
            by_centroid = entities.len() - by_frequency,
            policy = %self.config.selection_policy,
            "selected reference entities"
        );

        Ok(ReferenceSet {
            run_id,
            fingerprint,
            representatives,
            entities,
            stats: RunStats {
                record_count: streets.total_records(),
                unique_count: streets.len(),
                vocabulary_size: fitted.dim(),
                iterations: model.iterations,
                converged: model.converged,
                inertia: model.inertia,
                empty_clusters,
            },
        })
    }

    /// Reads records from `source`, selects, and appends one batch to `store`.
    ///
    /// Nothing is written unless every earlier stage succeeded, and the store
    /// commits the batch atomically.
    ///
    /// # Errors
    /// - `UpstreamRead` if the source fails
    /// - any error from [`Self::select`]
    /// - `Persistence` if the store rejects or fails the batch
    pub fn run(
        &self,
        source: &dyn StreetSource,
        store: &dyn ReferenceStore,
    ) -> RefselResult<RunReport> {
        let run_id = RunId::new();
        let span = info_span!("reference_selection", %run_id);
        let _guard = span.enter();

        let records = source.read_records()?;
        debug!(records = records.len(), "read street source");

        let set = self.select_in_run(run_id, &records)?;
        let batch = set.to_batch();
        store.append_batch(&batch)?;
        info!(persisted = batch.len(), "committed reference batch");

        Ok(RunReport {
            run_id,
            fingerprint: set.fingerprint,
            persisted: batch.len(),
            stats: set.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionPolicy;
    use crate::error::RefselError;
    use crate::storage::{InMemoryReferenceStore, InMemoryStreetSource};

    fn records(texts: &[&str]) -> Vec<RawAddressRecord> {
        texts.iter().map(|t| RawAddressRecord::from(*t)).collect()
    }

    fn engine(k: usize, top_n: usize) -> ReferenceSelectionEngine {
        ReferenceSelectionEngine::new(SelectionConfig {
            cluster_count: k,
            top_n_frequency_threshold: top_n,
            ..SelectionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_stats_describe_the_run() {
        let set = engine(2, 1)
            .select(&records(&["123 Main St", "123 Main St", "456 Oak Ave", "789 Pine Rd"]))
            .unwrap();
        assert_eq!(set.stats.record_count, 4);
        assert_eq!(set.stats.unique_count, 3);
        assert_eq!(set.stats.vocabulary_size, 9);
        assert!(set.stats.iterations >= 1);
        assert_eq!(set.len() + set.stats.empty_clusters, 2);
        assert_eq!(set.representatives.len(), set.len());
    }

    #[test]
    fn test_empty_input() {
        let err = engine(2, 1).select(&[]).unwrap_err();
        assert!(matches!(err, RefselError::Fit(FitError::EmptyCorpus)));
    }

    #[test]
    fn test_cluster_count_checked_against_distinct_streets() {
        // Six records but only two distinct streets.
        let input = records(&["a st", "a st", "a st", "b st", "b st", "b st"]);
        let err = engine(3, 1).select(&input).unwrap_err();
        assert!(matches!(
            err,
            RefselError::Fit(FitError::InvalidClusterCount { requested: 3, points: 2 })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let err = ReferenceSelectionEngine::new(SelectionConfig {
            max_iterations: 0,
            ..SelectionConfig::default()
        })
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_fingerprint_ignores_run_id() {
        let input = records(&["123 Main St", "456 Oak Ave"]);
        let e = engine(2, 1);
        let a = e.select(&input).unwrap();
        let b = e.select(&input).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.entities, b.entities);
    }

    #[test]
    fn test_policy_changes_the_fingerprint() {
        let input = records(&["123 Main St", "456 Oak Ave"]);
        let a = engine(2, 1).select(&input).unwrap();
        let b = ReferenceSelectionEngine::new(SelectionConfig {
            cluster_count: 2,
            top_n_frequency_threshold: 1,
            selection_policy: SelectionPolicy::CentroidNearest,
            ..SelectionConfig::default()
        })
        .unwrap()
        .select(&input)
        .unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_run_commits_one_batch() {
        let source =
            InMemoryStreetSource::from_texts(["123 Main St", "456 Oak Avenue", "123 Main St"]);
        let store = InMemoryReferenceStore::new();
        let report = engine(2, 1).run(&source, &store).unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(store.runs().unwrap(), vec![report.run_id]);
        let ids: Vec<u64> = store.read_all().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_failed_run_writes_nothing() {
        let source = InMemoryStreetSource::from_texts(["123 Main St", "456 Oak Ave"]);
        let store = InMemoryReferenceStore::new();
        let err = engine(10, 1).run(&source, &store).unwrap_err();
        assert!(err.is_fit());
        assert_eq!(store.count().unwrap(), 0);
    }
}
