//! Run configuration.
//!
//! Every knob the pipeline reads lives here so a driver can inject it from a
//! YAML file instead of relying on compiled-in constants. Missing fields fall
//! back to the defaults used by the reference deployment.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::normalize::AbbreviationTable;

/// How street text is split into terms before TF-IDF weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    /// Split on whitespace only; punctuation stays attached to tokens.
    #[default]
    Whitespace,
    /// Runs of two or more word characters.
    Standard,
}

/// Which stop words are removed after tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopwordPolicy {
    /// Keep every token.
    #[default]
    None,
    /// Drop the built-in English stop-word list.
    BuiltinEnglish,
}

/// How a cluster's representative is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Prefer a globally top-N frequent member, else the member nearest the centroid.
    #[default]
    FrequencyPriority,
    /// Always take the member nearest the centroid.
    CentroidNearest,
}

impl fmt::Display for TokenizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitespace => write!(f, "whitespace"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

impl fmt::Display for StopwordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::BuiltinEnglish => write!(f, "builtin_english"),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrequencyPriority => write!(f, "frequency_priority"),
            Self::CentroidNearest => write!(f, "centroid_nearest"),
        }
    }
}

/// Configuration for one reference selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// Number of k-means clusters (K).
    pub cluster_count: usize,
    /// Size of the global most-frequent street set consulted during selection.
    pub top_n_frequency_threshold: usize,
    /// Tokenizer used by the vectorizer.
    pub tokenizer_mode: TokenizerMode,
    /// Stop-word removal used by the vectorizer.
    pub stopword_policy: StopwordPolicy,
    /// Seed for k-means++ initialization.
    pub random_seed: u64,
    /// Long-form to short-form abbreviations applied to representatives.
    pub abbreviation_table: AbbreviationTable,
    /// Representative selection mode.
    pub selection_policy: SelectionPolicy,
    /// Lloyd iteration cap.
    pub max_iterations: usize,
    /// Number of seeded restarts; the lowest inertia wins.
    pub n_init: usize,
    /// Total squared centroid movement at or below which iteration stops.
    pub tolerance: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cluster_count: 10,
            top_n_frequency_threshold: 10,
            tokenizer_mode: TokenizerMode::default(),
            stopword_policy: StopwordPolicy::default(),
            random_seed: 0,
            abbreviation_table: AbbreviationTable::default(),
            selection_policy: SelectionPolicy::default(),
            max_iterations: 300,
            n_init: 1,
            tolerance: 1e-6,
        }
    }
}

impl SelectionConfig {
    /// Checks the numeric parameters.
    ///
    /// The cluster count is checked against the corpus at fit time, since
    /// `K > N` can only be decided once the unique streets are known.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidParameter` naming the first bad field.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be > 0"));
        }
        if self.n_init == 0 {
            return Err(ConfigError::invalid("n_init", "must be > 0"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::invalid(
                "tolerance",
                format!("must be a finite non-negative number (got {})", self.tolerance),
            ));
        }
        Ok(self)
    }

    /// Parses a YAML document; absent fields take their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::Malformed` on syntax errors, unknown fields or an
    /// invalid abbreviation table, and any error from [`Self::validate`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Malformed {
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Reads and parses a YAML config file.
    ///
    /// # Errors
    /// Returns `ConfigError::Unreadable` if the file cannot be read, otherwise
    /// as [`Self::from_yaml_str`].
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Canonical JSON form, used when fingerprinting a run.
    ///
    /// # Errors
    /// Returns `ConfigError::Malformed` if serialization fails.
    pub fn canonical_json(&self) -> Result<Vec<u8>, ConfigError> {
        serde_json::to_vec(self).map_err(|e| ConfigError::Malformed {
            message: format!("config serialization failed: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SelectionConfig::default();
        assert_eq!(cfg.cluster_count, 10);
        assert_eq!(cfg.top_n_frequency_threshold, 10);
        assert_eq!(cfg.tokenizer_mode, TokenizerMode::Whitespace);
        assert_eq!(cfg.stopword_policy, StopwordPolicy::None);
        assert_eq!(cfg.selection_policy, SelectionPolicy::FrequencyPriority);
        assert_eq!(cfg.abbreviation_table.get("avenue"), Some("ave"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let cfg = SelectionConfig::from_yaml_str(
            "cluster_count: 4\ntokenizer_mode: standard\nstopword_policy: builtin_english\n",
        )
        .unwrap();
        assert_eq!(cfg.cluster_count, 4);
        assert_eq!(cfg.tokenizer_mode, TokenizerMode::Standard);
        assert_eq!(cfg.stopword_policy, StopwordPolicy::BuiltinEnglish);
        assert_eq!(cfg.top_n_frequency_threshold, 10);
        assert_eq!(cfg.max_iterations, 300);
    }

    #[test]
    fn test_yaml_abbreviation_table_replaces_default() {
        let cfg = SelectionConfig::from_yaml_str(
            "abbreviation_table:\n  parkway: pkwy\n  'rural route': rr\n",
        )
        .unwrap();
        assert_eq!(cfg.abbreviation_table.len(), 2);
        assert_eq!(cfg.abbreviation_table.get("avenue"), None);
        assert_eq!(cfg.abbreviation_table.get("rural route"), Some("rr"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/refsel.yaml");
        let cfg = SelectionConfig::from_yaml_file(path).unwrap();
        assert_eq!(cfg, SelectionConfig::default());
    }

    #[test]
    fn test_yaml_rejects_unknown_field() {
        let err = SelectionConfig::from_yaml_str("clusters: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_yaml_rejects_negative_cluster_count() {
        assert!(SelectionConfig::from_yaml_str("cluster_count: -1\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = SelectionConfig {
            max_iterations: 0,
            ..SelectionConfig::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("max_iterations"));

        let cfg = SelectionConfig {
            tolerance: f64::NAN,
            ..SelectionConfig::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("tolerance"));

        let cfg = SelectionConfig {
            n_init: 0,
            ..SelectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refsel.yaml");
        std::fs::write(&path, "random_seed: 42\nselection_policy: centroid_nearest\n").unwrap();
        let cfg = SelectionConfig::from_yaml_file(&path).unwrap();
        assert_eq!(cfg.random_seed, 42);
        assert_eq!(cfg.selection_policy, SelectionPolicy::CentroidNearest);

        let missing = SelectionConfig::from_yaml_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_canonical_json_is_stable() {
        let a = SelectionConfig::default().canonical_json().unwrap();
        let b = SelectionConfig::default().canonical_json().unwrap();
        assert_eq!(a, b);
    }
}
