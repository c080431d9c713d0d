//! TF-IDF vectorization of the unique street corpus.
//!
//! Fitting learns a lexicographically ordered vocabulary and smoothed IDF
//! weights from the distinct streets (not the raw multiset). Rows are raw term
//! counts times IDF, L2-normalized:
//!
//! ```text
//! idf(t) = ln((1 + n) / (1 + df(t))) + 1
//! ```

mod stopwords;
mod tokenizer;

pub use stopwords::ENGLISH_STOP_WORDS;
pub use tokenizer::Tokenizer;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{StopwordPolicy, TokenizerMode};
use crate::error::{FitError, RefselResult};

/// Sparse row in the fitted term space. Indices are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Builds a vector from `(column, value)` pairs sorted by column.
    fn from_sorted(entries: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let (indices, values) = entries.into_iter().unzip();
        Self { indices, values }
    }

    /// Non-zero entries as `(column, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Returns true for the zero vector.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    /// Squared Euclidean norm.
    #[must_use]
    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Squared Euclidean distance to a dense point whose squared norm is known.
    #[must_use]
    pub fn squared_distance(&self, dense: &[f64], dense_squared_norm: f64) -> f64 {
        let mut d = dense_squared_norm;
        for (col, v) in self.iter() {
            let c = dense[col];
            d += v * v - 2.0 * v * c;
        }
        d.max(0.0)
    }

    /// Adds this vector into a dense accumulator.
    pub fn add_to(&self, dense: &mut [f64]) {
        for (col, v) in self.iter() {
            dense[col] += v;
        }
    }

    /// Dense copy with `dim` columns.
    #[must_use]
    pub fn to_dense(&self, dim: usize) -> Vec<f64> {
        let mut out = vec![0.0; dim];
        self.add_to(&mut out);
        out
    }
}

/// One row per unique street, aligned with [`crate::UniqueStreetSet`] indices.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<SparseVector>,
    dim: usize,
}

impl FeatureMatrix {
    /// Column count (vocabulary size).
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Row count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at a stable street index.
    #[must_use]
    pub fn row(&self, index: usize) -> &SparseVector {
        &self.rows[index]
    }

    /// All rows in index order.
    #[must_use]
    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }
}

/// Unfitted TF-IDF vectorizer.
#[derive(Debug, Clone)]
pub struct Vectorizer {
    tokenizer: Tokenizer,
}

impl Vectorizer {
    /// Creates a vectorizer for the given tokenization policy.
    ///
    /// # Errors
    /// Propagates tokenizer construction failures.
    pub fn new(mode: TokenizerMode, policy: StopwordPolicy) -> RefselResult<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new(mode, policy)?,
        })
    }

    /// Learns vocabulary and IDF weights from `documents`.
    ///
    /// # Errors
    /// - `FitError::EmptyCorpus` if `documents` is empty
    /// - `FitError::DegenerateVocabulary` if no term survives tokenization
    pub fn fit(&self, documents: &[&str]) -> Result<FittedVectorizer, FitError> {
        if documents.is_empty() {
            return Err(FitError::EmptyCorpus);
        }

        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let terms: BTreeSet<String> = self.tokenizer.tokenize(doc).into_iter().collect();
            for term in terms {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        if document_frequency.is_empty() {
            return Err(FitError::DegenerateVocabulary {
                documents: documents.len(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let n = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (column, (term, df)) in document_frequency.into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let df = df as f64;
            idf.push(((1.0 + n) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term, column);
        }

        Ok(FittedVectorizer {
            tokenizer: self.tokenizer.clone(),
            vocabulary,
            idf,
        })
    }

    /// Fits on `documents` and transforms the same documents.
    ///
    /// # Errors
    /// As [`Self::fit`].
    pub fn fit_transform(
        &self,
        documents: &[&str],
    ) -> Result<(FittedVectorizer, FeatureMatrix), FitError> {
        let fitted = self.fit(documents)?;
        let matrix = fitted.transform(documents);
        Ok((fitted, matrix))
    }
}

/// Fitted model handle: vocabulary plus IDF weights.
#[derive(Debug, Clone)]
pub struct FittedVectorizer {
    tokenizer: Tokenizer,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl FittedVectorizer {
    /// Vocabulary size; every transformed row has this many columns.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    /// Column of a term, if it is in the vocabulary.
    #[must_use]
    pub fn column(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// IDF weight of a column.
    #[must_use]
    pub fn idf(&self, column: usize) -> Option<f64> {
        self.idf.get(column).copied()
    }

    /// Maps one string into the fitted space; unknown terms are ignored.
    #[must_use]
    pub fn transform_one(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.tokenizer.tokenize(text) {
            if let Some(&col) = self.vocabulary.get(&term) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        let weighted: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(col, tf)| (col, tf * self.idf[col]))
            .collect();
        let norm = weighted.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm <= 0.0 {
            return SparseVector::default();
        }
        SparseVector::from_sorted(weighted.into_iter().map(|(c, v)| (c, v / norm)))
    }

    /// Maps every document into the fitted space, preserving order.
    #[must_use]
    pub fn transform(&self, documents: &[&str]) -> FeatureMatrix {
        FeatureMatrix {
            rows: documents.iter().map(|d| self.transform_one(d)).collect(),
            dim: self.dim(),
        }
    }
}
