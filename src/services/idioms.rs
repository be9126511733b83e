//! Idiom normalization: replaces known idioms with their plain meaning
//! before translation.

use std::path::Path;

use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::{DubError, Result};

// Entry of the idioms JSON file
#[derive(Debug, Deserialize)]
struct IdiomEntry {
    idiom: String,
    meaning: String,
}

struct IdiomRule {
    pattern: Regex,
    meaning: String,
}

/// Whole-phrase, case-insensitive replacer. Longer idioms are tried first
/// so that "break the ice cube" wins over "break the ice".
#[derive(Default)]
pub struct IdiomReplacer {
    rules: Vec<IdiomRule>,
}

impl IdiomReplacer {
    /// Replacer that leaves text unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(idiom, meaning)| (idiom.into().trim().to_lowercase(), meaning.into()))
            .filter(|(idiom, _)| !idiom.is_empty())
            .collect();
        // longest first, then alphabetical to keep the order stable
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);

        let mut rules = Vec::with_capacity(entries.len());
        for (idiom, meaning) in entries {
            let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(&idiom)))
                .case_insensitive(true)
                .build()
                .map_err(|e| DubError::Config(format!("Invalid idiom '{}': {}", idiom, e)))?;
            rules.push(IdiomRule { pattern, meaning });
        }
        Ok(Self { rules })
    }

    /// Load `[{ "idiom": ..., "meaning": ... }]` from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<IdiomEntry> = serde_json::from_str(&content)?;
        let replacer = Self::from_pairs(entries.into_iter().map(|e| (e.idiom, e.meaning)))?;
        info!("Loaded {} idioms from {}", replacer.len(), path.as_ref().display());
        Ok(replacer)
    }

    /// Like `from_file`, but falls back to the identity replacer
    pub fn load_or_identity(path: Option<&Path>) -> Self {
        match path {
            None => Self::identity(),
            Some(path) => Self::from_file(path).unwrap_or_else(|e| {
                warn!(
                    "degraded: could not load idioms from {}, text is left as is: {}",
                    path.display(),
                    e
                );
                Self::identity()
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pure and total: text without matches is returned unchanged
    pub fn replace(&self, text: &str) -> String {
        let mut result = text.to_string();
        for rule in &self.rules {
            if rule.pattern.is_match(&result) {
                debug!("Replacing idiom /{}/ with '{}'", rule.pattern.as_str(), rule.meaning);
                result = rule
                    .pattern
                    .replace_all(&result, regex::NoExpand(&rule.meaning))
                    .into_owned();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replaces_whole_phrase_case_insensitive() {
        let replacer = IdiomReplacer::from_pairs([("Break a leg", "good luck")]).unwrap();
        assert_eq!(replacer.replace("Well, BREAK A LEG tonight!"), "Well, good luck tonight!");
        // no partial word match
        assert_eq!(replacer.replace("break a legend"), "break a legend");
    }

    #[test]
    fn test_longest_idiom_wins() {
        let replacer = IdiomReplacer::from_pairs([
            ("piece of cake", "easy"),
            ("a piece of cake and tea", "a simple snack"),
        ])
        .unwrap();
        assert_eq!(replacer.replace("it was a piece of cake and tea"), "it was a simple snack");
        assert_eq!(replacer.replace("that's a piece of cake"), "that's a easy");
    }

    #[test]
    fn test_meaning_is_literal() {
        let replacer = IdiomReplacer::from_pairs([("cost an arm", "$1 price")]).unwrap();
        assert_eq!(replacer.replace("it cost an arm"), "it $1 price");
    }

    #[test]
    fn test_identity_and_missing_file() {
        assert_eq!(IdiomReplacer::identity().replace("same text"), "same text");
        let replacer = IdiomReplacer::load_or_identity(Some(Path::new("/nonexistent/idioms.json")));
        assert!(replacer.is_empty());
    }

    #[test]
    fn test_loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"idiom": "Hit the sack", "meaning": "go to sleep"}}]"#).unwrap();

        let replacer = IdiomReplacer::from_file(file.path()).unwrap();
        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.replace("time to hit the sack"), "time to go to sleep");
    }
}
