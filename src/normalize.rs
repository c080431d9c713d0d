//! Street text normalization.
//!
//! A normalized street is lower-cased, split on whitespace, passed through an
//! abbreviation table (long form to short form) and re-joined with single
//! spaces. Normalization is applied only to the representative chosen for each
//! cluster; clustering itself runs on the raw unique strings.
//!
//! Multi-word keys such as `"po box"` are matched by a phrase pass over the
//! token stream before the single-token lookup, so they are not inert.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Abbreviations used by the reference deployment for US street addresses.
const US_STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("circle", "cir"),
    ("court", "ct"),
    ("drive", "dr"),
    ("highway", "hwy"),
    ("lane", "ln"),
    ("place", "pl"),
    ("road", "rd"),
    ("street", "st"),
    ("terrace", "ter"),
    ("northwest", "nw"),
    ("southeast", "se"),
    ("southwest", "sw"),
    ("northeast", "ne"),
    ("unit", "unit"),
    ("ste", "ste"),
    ("apt", "apt"),
    ("floor", "fl"),
    ("po box", "pobox"),
];

fn canonical_key(key: &str) -> Vec<String> {
    key.split_whitespace().map(str::to_lowercase).collect()
}

/// Immutable long-form to short-form mapping.
///
/// Keys are stored lower-cased with internal whitespace collapsed. Values are
/// single lower-case tokens. A value may only reappear as a key when it maps
/// to itself (`unit -> unit`), which keeps normalization idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct AbbreviationTable {
    entries: BTreeMap<String, String>,
    words: HashMap<String, String>,
    /// Multi-token keys, longest first.
    phrases: Vec<(Vec<String>, String)>,
}

impl AbbreviationTable {
    /// Builds a validated table from `(long_form, short_form)` pairs.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidAbbreviation` for empty keys, values that
    /// are not exactly one token, conflicting duplicate keys, or a value that
    /// would be rewritten again on a second pass.
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let invalid = |reason: &str| ConfigError::InvalidAbbreviation {
                key: key.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            };

            let tokens = canonical_key(key);
            if tokens.is_empty() {
                return Err(invalid("key is empty"));
            }
            let value_tokens = canonical_key(value);
            if value_tokens.len() != 1 {
                return Err(invalid("value must be exactly one token"));
            }

            let canonical = tokens.join(" ");
            let short = value_tokens.into_iter().next().unwrap_or_default();
            if entries.get(&canonical).is_some_and(|existing| *existing != short) {
                return Err(invalid("key is already mapped to a different value"));
            }
            entries.insert(canonical, short);
        }

        for (key, value) in &entries {
            for (other_key, other_value) in &entries {
                let self_mapping = other_key == value && other_value == value;
                if !self_mapping && other_key.split(' ').any(|t| t == value) {
                    return Err(ConfigError::InvalidAbbreviation {
                        key: key.clone(),
                        value: value.clone(),
                        reason: format!(
                            "value reappears in key '{other_key}', \
                             normalization would not be idempotent"
                        ),
                    });
                }
            }
        }

        Ok(Self::from_entries(entries))
    }

    /// The built-in US street table.
    #[must_use]
    pub fn us_street() -> Self {
        Self::from_entries(
            US_STREET_ABBREVIATIONS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    /// A table that maps nothing; normalization only lower-cases and re-spaces.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_entries(BTreeMap::new())
    }

    fn from_entries(entries: BTreeMap<String, String>) -> Self {
        let mut words = HashMap::new();
        let mut phrases = Vec::new();
        for (key, value) in &entries {
            let tokens = canonical_key(key);
            if tokens.len() == 1 {
                words.insert(key.clone(), value.clone());
            } else {
                phrases.push((tokens, value.clone()));
            }
        }
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self {
            entries,
            words,
            phrases,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table maps nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a canonical key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn match_phrase(&self, tokens: &[String]) -> Option<(usize, &str)> {
        self.phrases
            .iter()
            .find(|(phrase, _)| tokens.starts_with(phrase))
            .map(|(phrase, value)| (phrase.len(), value.as_str()))
    }
}

impl Default for AbbreviationTable {
    fn default() -> Self {
        Self::us_street()
    }
}

impl TryFrom<BTreeMap<String, String>> for AbbreviationTable {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::new(map)
    }
}

impl From<AbbreviationTable> for BTreeMap<String, String> {
    fn from(table: AbbreviationTable) -> Self {
        table.entries
    }
}

/// Pure, locale-independent street normalizer.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    table: AbbreviationTable,
}

impl Normalizer {
    /// Creates a normalizer over the given table.
    #[must_use]
    pub fn new(table: AbbreviationTable) -> Self {
        Self { table }
    }

    /// The abbreviation table in use.
    #[must_use]
    pub fn table(&self) -> &AbbreviationTable {
        &self.table
    }

    /// Normalizes a raw street string.
    ///
    /// ```
    /// use refsel::Normalizer;
    ///
    /// let n = Normalizer::default();
    /// assert_eq!(n.normalize("456 OAK AVENUE NORTHWEST"), "456 oak ave nw");
    /// assert_eq!(n.normalize("PO  Box 12"), "pobox 12");
    /// ```
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let lowered = raw.to_lowercase();
        let tokens: Vec<String> = lowered.split_whitespace().map(str::to_owned).collect();

        let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            if let Some((len, value)) = self.table.match_phrase(&tokens[i..]) {
                out.push(value);
                i += len;
                continue;
            }
            let token = tokens[i].as_str();
            out.push(self.table.words.get(token).map_or(token, String::as_str));
            i += 1;
        }

        out.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "456 OAK AVENUE NORTHWEST",
        "123 Main Street",
        "  PO   BOX 17 ",
        "Po Box Lane Unit 4",
        "1 northeast court floor 2",
        "",
        "ÉLAN  Boulevard",
        "99 apt ste unit",
        "Street Street street",
    ];

    #[test]
    fn test_abbreviates_and_lowercases() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("456 OAK AVENUE NORTHWEST"), "456 oak ave nw");
        assert_eq!(n.normalize("123 Main Street"), "123 main st");
    }

    #[test]
    fn test_multi_word_key_matches() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("PO Box 12"), "pobox 12");
        assert_eq!(n.normalize("po box lane"), "pobox ln");
        // Only whole tokens form a phrase.
        assert_eq!(n.normalize("po boxer 3"), "po boxer 3");
    }

    #[test]
    fn test_collapses_whitespace() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("  12\tElm   Road \n"), "12 elm rd");
        assert_eq!(n.normalize("   "), "");
    }

    #[test]
    fn test_punctuation_is_left_alone() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("12 Elm Street,"), "12 elm street,");
    }

    #[test]
    fn test_idempotent_over_samples() {
        let n = Normalizer::default();
        for s in SAMPLES {
            let once = n.normalize(s);
            assert_eq!(n.normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_default_table_passes_validation() {
        let pairs = BTreeMap::from(AbbreviationTable::us_street());
        let rebuilt = AbbreviationTable::new(pairs).unwrap();
        assert_eq!(rebuilt, AbbreviationTable::us_street());
        assert_eq!(rebuilt.len(), US_STREET_ABBREVIATIONS.len());
    }

    #[test]
    fn test_rejects_chained_mapping() {
        let err = AbbreviationTable::new([("street", "st"), ("st", "s")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAbbreviation { .. }));
    }

    #[test]
    fn test_rejects_value_inside_phrase() {
        let err = AbbreviationTable::new([("avenue", "ave"), ("ave north", "an")]).unwrap_err();
        assert!(err.to_string().contains("idempotent"));
    }

    #[test]
    fn test_rejects_multi_token_value() {
        let err = AbbreviationTable::new([("pobox", "po box")]).unwrap_err();
        assert!(err.to_string().contains("exactly one token"));
    }

    #[test]
    fn test_rejects_conflicting_duplicates() {
        let err = AbbreviationTable::new([("Street", "st"), ("street", "str")]).unwrap_err();
        assert!(err.to_string().contains("different value"));
        // Same mapping twice, differing only in case, is fine.
        assert!(AbbreviationTable::new([("Street", "st"), ("street", "ST")]).is_ok());
    }

    #[test]
    fn test_keys_are_canonicalized() {
        let table = AbbreviationTable::new([("  Rural   Route ", "RR")]).unwrap();
        assert_eq!(table.get("rural route"), Some("rr"));
        let n = Normalizer::new(table);
        assert_eq!(n.normalize("Rural Route 9"), "rr 9");
    }

    #[test]
    fn test_longest_phrase_wins() {
        let table =
            AbbreviationTable::new([("north east", "ne"), ("north east corner", "nec")]).unwrap();
        let n = Normalizer::new(table);
        assert_eq!(n.normalize("North East Corner lot"), "nec lot");
        assert_eq!(n.normalize("north east lot"), "ne lot");
    }

    #[test]
    fn test_empty_table_only_lowercases() {
        let n = Normalizer::new(AbbreviationTable::empty());
        assert_eq!(n.normalize("12  Oak AVENUE"), "12 oak avenue");
    }

    #[test]
    fn test_yaml_roundtrip_of_table() {
        let table: AbbreviationTable =
            serde_yaml::from_str("avenue: ave\n'po box': pobox\n").unwrap();
        assert_eq!(table.get("po box"), Some("pobox"));
        let bad: Result<AbbreviationTable, _> = serde_yaml::from_str("street: st\nst: s\n");
        assert!(bad.is_err());
    }
}
