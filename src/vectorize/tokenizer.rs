//! Term extraction for the vectorizer.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{StopwordPolicy, TokenizerMode};
use crate::error::{RefselError, RefselResult};

use super::stopwords::ENGLISH_STOP_WORDS;

/// Two or more word characters between word boundaries.
const STANDARD_TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Lower-cases text, splits it into terms and drops stop words.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    mode: TokenizerMode,
    policy: StopwordPolicy,
    pattern: Option<Regex>,
    stopwords: HashSet<&'static str>,
}

impl Tokenizer {
    /// Builds a tokenizer for the given mode and stop-word policy.
    ///
    /// # Errors
    /// Returns an internal error if the standard token pattern fails to compile.
    pub fn new(mode: TokenizerMode, policy: StopwordPolicy) -> RefselResult<Self> {
        let pattern = match mode {
            TokenizerMode::Whitespace => None,
            TokenizerMode::Standard => Some(Regex::new(STANDARD_TOKEN_PATTERN).map_err(|e| {
                RefselError::internal(format!("standard token pattern failed to compile: {e}"))
            })?),
        };
        let stopwords = match policy {
            StopwordPolicy::None => HashSet::new(),
            StopwordPolicy::BuiltinEnglish => ENGLISH_STOP_WORDS.iter().copied().collect(),
        };
        Ok(Self {
            mode,
            policy,
            pattern,
            stopwords,
        })
    }

    /// Tokenizer mode.
    #[must_use]
    pub const fn mode(&self) -> TokenizerMode {
        self.mode
    }

    /// Stop-word policy.
    #[must_use]
    pub const fn policy(&self) -> StopwordPolicy {
        self.policy
    }

    /// Terms of `text`, in order, duplicates kept.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let raw: Vec<&str> = match &self.pattern {
            Some(re) => re.find_iter(&lowered).map(|m| m.as_str()).collect(),
            None => lowered.split_whitespace().collect(),
        };
        raw.into_iter()
            .filter(|t| !self.stopwords.contains(t))
            .map(str::to_owned)
            .collect()
    }
}
