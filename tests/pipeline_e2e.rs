//! End-to-end tests for the reference selection pipeline.
//!
//! These tests drive the public API only: records in, reference entities out,
//! through the in-memory source and store.

use refsel::storage::{
    InMemoryReferenceStore, InMemoryStreetSource, ReferenceStore, SourceError, StorageError,
    StreetSource,
};
use refsel::{
    FitError, Normalizer, RawAddressRecord, ReferenceBatch, ReferenceEntity,
    ReferenceSelectionEngine, RefselError, RunId, SelectedBy, SelectionConfig, SelectionPolicy,
    StopwordPolicy, TokenizerMode, UniqueStreetSet, Vectorizer,
};

fn records(texts: &[&str]) -> Vec<RawAddressRecord> {
    texts.iter().map(|t| RawAddressRecord::from(*t)).collect()
}

fn repeated(pairs: &[(&str, usize)]) -> Vec<RawAddressRecord> {
    pairs
        .iter()
        .flat_map(|&(text, n)| std::iter::repeat(text).take(n))
        .map(RawAddressRecord::from)
        .collect()
}

fn engine(k: usize, top_n: usize) -> ReferenceSelectionEngine {
    ReferenceSelectionEngine::new(SelectionConfig {
        cluster_count: k,
        top_n_frequency_threshold: top_n,
        ..SelectionConfig::default()
    })
    .unwrap()
}

/// A mixed corpus: several spellings of a handful of streets.
fn city() -> Vec<RawAddressRecord> {
    repeated(&[
        ("123 Main St", 6),
        ("123 Main Street", 3),
        ("123 MAIN ST", 2),
        ("456 Oak Ave", 4),
        ("456 Oak Avenue", 2),
        ("456 oak ave", 1),
        ("789 Pine Rd", 3),
        ("789 Pine Road", 1),
        ("12 Elm Blvd", 2),
        ("12 Elm Boulevard", 1),
        ("88 Lake Shore Dr", 5),
        ("88 Lake Shore Drive", 2),
        ("5 Harbor Ct NW", 1),
        ("5 Harbor Court Northwest", 1),
        ("PO Box 1200", 2),
        ("P.O. Box 1200", 1),
    ])
}

/// Store whose writes always fail, counting attempts.
#[derive(Default)]
struct FailingStore {
    attempts: std::sync::atomic::AtomicUsize,
}

impl ReferenceStore for FailingStore {
    fn append_batch(&self, _batch: &ReferenceBatch) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(StorageError::Io("disk full".to_string()))
    }

    fn read_all(&self) -> Result<Vec<ReferenceEntity>, StorageError> {
        Ok(Vec::new())
    }

    fn read_run(&self, _run_id: RunId) -> Result<Option<Vec<ReferenceEntity>>, StorageError> {
        Ok(None)
    }

    fn runs(&self) -> Result<Vec<RunId>, StorageError> {
        Ok(Vec::new())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(0)
    }
}

struct BrokenSource;

impl StreetSource for BrokenSource {
    fn read_records(&self) -> Result<Vec<RawAddressRecord>, SourceError> {
        Err(SourceError::Io("connection reset".to_string()))
    }
}

#[test]
fn test_most_frequent_street_represents_its_cluster() {
    let input = repeated(&[("123 Main St", 5), ("123 Main Street", 3), ("456 Oak Ave", 1)]);
    let set = engine(2, 1).select(&input).unwrap();

    assert_eq!(set.len(), 2);
    assert_eq!(set.entities.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);

    let main = set
        .representatives
        .iter()
        .find(|r| r.street_index == 0)
        .expect("the cluster holding 123 Main St must pick it");
    assert_eq!(main.street, "123 Main St");
    assert_eq!(main.rule, SelectedBy::TopFrequency);

    let other = set
        .representatives
        .iter()
        .find(|r| r.street_index != 0)
        .unwrap();
    assert_eq!(other.rule, SelectedBy::CentroidDistance);

    assert!(set.entities.iter().any(|e| e.entity_value == "123 main st"));
}

#[test]
fn test_abbreviation_of_long_forms() {
    let normalizer = Normalizer::default();
    assert_eq!(normalizer.normalize("456 OAK AVENUE NORTHWEST"), "456 oak ave nw");
    assert_eq!(normalizer.normalize("PO Box 1200"), "pobox 1200");

    let set = engine(1, 1).select(&records(&["456 OAK AVENUE NORTHWEST"])).unwrap();
    assert_eq!(set.entities, vec![ReferenceEntity::new(1, "456 oak ave nw")]);
}

#[test]
fn test_too_many_clusters_writes_nothing() {
    let source = InMemoryStreetSource::from_texts([
        "123 Main St",
        "456 Oak Ave",
        "789 Pine Rd",
        "12 Elm Blvd",
        "123 Main St",
    ]);
    let store = InMemoryReferenceStore::new();

    let err = engine(10, 10).run(&source, &store).unwrap_err();
    assert!(matches!(
        err,
        RefselError::Fit(FitError::InvalidClusterCount { requested: 10, points: 4 })
    ));
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.runs().unwrap().is_empty());
}

#[test]
fn test_identical_runs_are_identical() {
    let config = SelectionConfig {
        cluster_count: 5,
        top_n_frequency_threshold: 3,
        random_seed: 42,
        n_init: 3,
        ..SelectionConfig::default()
    };
    let a = ReferenceSelectionEngine::new(config.clone())
        .unwrap()
        .select(&city())
        .unwrap();
    let b = ReferenceSelectionEngine::new(config)
        .unwrap()
        .select(&city())
        .unwrap();

    assert_eq!(a.entities, b.entities);
    assert_eq!(a.representatives, b.representatives);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.stats, b.stats);
}

#[test]
fn test_entity_count_bounded_by_k() {
    let input = city();
    let unique = UniqueStreetSet::from_records(&input).len();
    for k in 1..=unique {
        let set = engine(k, 3).select(&input).unwrap();
        assert!(set.len() <= k, "k={k} produced {}", set.len());
        assert!(!set.is_empty(), "k={k} produced nothing");
        let ids: Vec<u64> = set.entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=set.len() as u64).collect::<Vec<_>>());
    }
}

#[test]
fn test_frequencies_account_for_every_record() {
    let input = city();
    let streets = UniqueStreetSet::from_records(&input);
    let total: usize = streets.streets().iter().map(|s| s.frequency).sum();
    assert_eq!(total, input.len());
    assert_eq!(streets.total_records(), input.len());
}

#[test]
fn test_frequent_streets_win_whenever_present() {
    let input = city();
    let top_n = 4;
    let streets = UniqueStreetSet::from_records(&input);
    let frequent = streets.top_n_indices(top_n);

    let set = engine(6, top_n).select(&input).unwrap();
    for rep in &set.representatives {
        if rep.rule == SelectedBy::TopFrequency {
            assert!(frequent.contains(&rep.street_index));
        } else {
            assert!(!frequent.contains(&rep.street_index));
        }
    }
}

#[test]
fn test_output_is_normalization_fixed_point() {
    let normalizer = Normalizer::default();
    let set = engine(6, 3).select(&city()).unwrap();
    for entity in &set.entities {
        assert_eq!(normalizer.normalize(&entity.entity_value), entity.entity_value);
    }
    for raw in city() {
        let once = normalizer.normalize(&raw.street_text);
        assert_eq!(normalizer.normalize(&once), once);
    }
}

#[test]
fn test_centroid_policy_ignores_frequency() {
    let engine = ReferenceSelectionEngine::new(SelectionConfig {
        cluster_count: 4,
        top_n_frequency_threshold: 100,
        selection_policy: SelectionPolicy::CentroidNearest,
        ..SelectionConfig::default()
    })
    .unwrap();
    let set = engine.select(&city()).unwrap();
    assert!(set
        .representatives
        .iter()
        .all(|r| r.rule == SelectedBy::CentroidDistance));
}

#[test]
fn test_store_round_trip() {
    let source = InMemoryStreetSource::new(city());
    let store = InMemoryReferenceStore::new();
    let e = engine(5, 3);

    let expected = e.select(&city()).unwrap().entities;
    let report = e.run(&source, &store).unwrap();

    assert_eq!(report.persisted, expected.len());
    assert_eq!(store.read_all().unwrap(), expected);
    assert_eq!(store.read_run(report.run_id).unwrap().unwrap(), expected);

    // A second run appends; earlier rows are untouched.
    let second = e.run(&source, &store).unwrap();
    assert_eq!(store.runs().unwrap(), vec![report.run_id, second.run_id]);
    assert_eq!(store.count().unwrap(), expected.len() * 2);
    assert_eq!(store.read_all().unwrap()[..expected.len()], expected[..]);
}

#[test]
fn test_store_failure_propagates() {
    let store = FailingStore::default();
    let err = engine(2, 1)
        .run(&InMemoryStreetSource::new(city()), &store)
        .unwrap_err();
    assert!(err.is_persistence());
    assert!(!err.is_retryable());
    assert_eq!(store.attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_source_failure_propagates() {
    let store = InMemoryReferenceStore::new();
    let err = engine(2, 1).run(&BrokenSource, &store).unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_empty_source() {
    let store = InMemoryReferenceStore::new();
    let err = engine(1, 1)
        .run(&InMemoryStreetSource::default(), &store)
        .unwrap_err();
    assert!(matches!(err, RefselError::Fit(FitError::EmptyCorpus)));
}

#[test]
fn test_yaml_config_drives_the_run() {
    let config = SelectionConfig::from_yaml_str(
        "cluster_count: 3\n\
         top_n_frequency_threshold: 2\n\
         tokenizer_mode: standard\n\
         stopword_policy: builtin_english\n\
         random_seed: 7\n",
    )
    .unwrap();
    assert_eq!(config.cluster_count, 3);
    assert_eq!(config.random_seed, 7);

    let input = city();
    let tuned = ReferenceSelectionEngine::new(config)
        .unwrap()
        .select(&input)
        .unwrap();
    let plain = engine(3, 2).select(&input).unwrap();
    assert!(tuned.len() <= 3);
    assert!(!tuned.is_empty());

    // The vocabulary must be the one the configured tokenizer builds.
    let streets = UniqueStreetSet::from_records(&input);
    let docs: Vec<&str> = streets.texts().collect();
    let dim = |mode, stopwords| {
        let vectorizer = Vectorizer::new(mode, stopwords).unwrap();
        vectorizer.fit(&docs).unwrap().dim()
    };
    assert_eq!(
        tuned.stats.vocabulary_size,
        dim(TokenizerMode::Standard, StopwordPolicy::BuiltinEnglish)
    );
    assert_eq!(
        plain.stats.vocabulary_size,
        dim(TokenizerMode::Whitespace, StopwordPolicy::None)
    );
    // "5" and "p.o." only survive whitespace splitting.
    assert!(tuned.stats.vocabulary_size < plain.stats.vocabulary_size);
    assert_ne!(tuned.fingerprint, plain.fingerprint);
}

#[test]
fn test_stopword_only_corpus_writes_nothing() {
    let config = SelectionConfig {
        cluster_count: 1,
        tokenizer_mode: TokenizerMode::Standard,
        stopword_policy: StopwordPolicy::BuiltinEnglish,
        ..SelectionConfig::default()
    };
    let source = InMemoryStreetSource::from_texts(["the", "of the", "the"]);
    let store = InMemoryReferenceStore::new();

    let err = ReferenceSelectionEngine::new(config)
        .unwrap()
        .run(&source, &store)
        .unwrap_err();
    assert!(matches!(
        err,
        RefselError::Fit(FitError::DegenerateVocabulary { documents: 2 })
    ));
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.runs().unwrap().is_empty());
}
