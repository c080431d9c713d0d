//! Error types for refsel.
//!
//! All errors are strongly typed using thiserror, grouped by the stage that
//! raises them. Every failure is fatal to the run: fitting is deterministic
//! for a fixed input and configuration, so nothing here is worth retrying
//! without changing one of the two.

use thiserror::Error;

use crate::storage::{SourceError, StorageError};

/// Configuration errors, raised before any work is done.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    #[error("Invalid abbreviation entry '{key}' -> '{value}': {reason}")]
    InvalidAbbreviation {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file '{path}': {message}")]
    Unreadable {
        path: String,
        message: String,
    },

    #[error("Failed to parse config: {message}")]
    Malformed {
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while vectorizing or clustering the street corpus.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("Street corpus is empty; nothing to vectorize")]
    EmptyCorpus,

    #[error("Vocabulary is empty after tokenization over {documents} streets")]
    DegenerateVocabulary {
        documents: usize,
    },

    #[error("Cannot form {requested} clusters from {points} distinct streets")]
    InvalidClusterCount {
        requested: usize,
        points: usize,
    },
}

/// Top-level error type for refsel.
#[derive(Debug, Error)]
pub enum RefselError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Upstream read error: {0}")]
    UpstreamRead(#[from] SourceError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl RefselError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if vectorizing or clustering failed.
    #[must_use]
    pub const fn is_fit(&self) -> bool {
        matches!(self, Self::Fit(_))
    }

    /// Returns true if the reference store rejected or failed the write.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Returns true if the street source could not be read.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamRead(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Always false. The driver decides whether to re-run with a different
    /// configuration (for example a lower cluster count).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

/// Result type alias for refsel operations.
pub type RefselResult<T> = Result<T, RefselError>;
