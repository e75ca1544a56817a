//! Misspelling detection for a single proper noun.
//!
//! A [`SpellingMatcher`] holds the canonical spelling and an ordered list of
//! known wrong variants, each compiled as a case-insensitive whole-word regex.
//! The correct spelling always wins: if it appears anywhere in the text, no
//! misspelling is reported.

use regex::Regex;

/// Canonical spelling used in corrections.
pub const CORRECT_NAME: &str = "Mbeumo";

/// Known wrong spellings, in match priority order.
pub const KNOWN_MISSPELLINGS: &[&str] = &[
    "mbuemo", "mbeuemo", "mbeuomo", "mbeuono", "mbeoumo", "mboomo", "mbeemo", "mbeuno", "meubomo",
    "mboma", "mbumeo", "mbewmoe",
];

/// Errors building a matcher.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    /// A word could not be compiled into a regex.
    #[error("invalid pattern for {word:?}: {source}")]
    InvalidPattern {
        /// The offending word.
        word: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
    /// The correct spelling was empty.
    #[error("correct name must not be empty")]
    EmptyCorrectName,
}

/// Detects known misspellings of a proper noun.
#[derive(Debug, Clone)]
pub struct SpellingMatcher {
    correct_name: String,
    correct: Regex,
    misspellings: Vec<Regex>,
}

impl SpellingMatcher {
    /// Build a matcher for `correct_name` and its wrong `variants`.
    ///
    /// Variant order is significant: when a text contains several variants,
    /// the one listed first is reported. Empty variants are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] if the correct name is empty or a word fails
    /// to compile.
    pub fn new<S: AsRef<str>>(correct_name: &str, variants: &[S]) -> Result<Self, MatcherError> {
        if correct_name.trim().is_empty() {
            return Err(MatcherError::EmptyCorrectName);
        }
        let correct = whole_word(correct_name)?;
        let misspellings = variants
            .iter()
            .map(AsRef::as_ref)
            .filter(|word| !word.trim().is_empty())
            .map(whole_word)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            correct_name: correct_name.to_owned(),
            correct,
            misspellings,
        })
    }

    /// The built-in matcher for "Mbeumo".
    ///
    /// # Errors
    ///
    /// Only fails if the built-in word list stops compiling.
    pub fn mbeumo() -> Result<Self, MatcherError> {
        Self::new(CORRECT_NAME, KNOWN_MISSPELLINGS)
    }

    /// The canonical spelling.
    pub fn correct_name(&self) -> &str {
        &self.correct_name
    }

    /// Number of misspelling patterns.
    pub fn pattern_count(&self) -> usize {
        self.misspellings.len()
    }

    /// Return the exact misspelled text found in `text`, if any.
    ///
    /// Returns `None` when the correct spelling appears as a whole word,
    /// even if a misspelling is also present. Otherwise returns the matched
    /// substring of the first pattern (in list order) that hits, preserving
    /// the input's casing.
    pub fn find_misspelling(&self, text: &str) -> Option<String> {
        if text.is_empty() || self.correct.is_match(text) {
            return None;
        }
        self.misspellings
            .iter()
            .find_map(|pattern| pattern.find(text))
            .map(|m| m.as_str().to_owned())
    }
}

fn whole_word(word: &str) -> Result<Regex, MatcherError> {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(word.trim()));
    Regex::new(&pattern).map_err(|source| MatcherError::InvalidPattern {
        word: word.to_owned(),
        source,
    })
}
