//! Ordered multi-word term matching.
//!
//! A term matches when its words occur in the input's token sequence in the
//! same relative order, with any number of tokens in between. This tolerates
//! inserted words ("hurt myself" in "hurt *really* myself") while still
//! rejecting reordered text ("myself I hurt").

use crate::error::{read_config, PolicyError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use sukoon_text::tokenize;

/// One configured term together with its pre-tokenized words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    text: String,
    words: Vec<String>,
}

impl Term {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Does this term occur (in order) in `tokens`?
    pub fn matches_tokens(&self, tokens: &[String]) -> bool {
        !self.words.is_empty() && is_ordered_subsequence(tokens, &self.words)
    }
}

/// A named, immutable set of lowercase terms.
///
/// Terms are trimmed, lowercased and de-duplicated on construction; the stored
/// order (and therefore the order of match results) is lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermList {
    name: String,
    terms: Vec<Term>,
}

#[derive(Debug, Deserialize)]
struct TermFile {
    #[serde(default)]
    terms: Vec<serde_yaml::Value>,
}

impl TermList {
    pub fn new<I, S>(name: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let terms = unique
            .into_iter()
            .map(|text| Term {
                words: tokenize(&text),
                text,
            })
            .collect();

        Self {
            name: name.into(),
            terms,
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terms: Vec::new(),
        }
    }

    /// Parse `{terms: [string, ...]}`. Non-string entries are skipped.
    pub fn from_yaml_str(name: impl Into<String>, yaml: &str) -> std::result::Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty(name));
        }
        let file: TermFile = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
        let terms = file
            .terms
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>();
        Ok(Self::new(name, terms))
    }

    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self> {
        let text = read_config(path)?;
        Self::from_yaml_str(name, &text).map_err(|e| PolicyError::malformed(path, e))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter()
    }

    /// Matched terms, in list order.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        self.matches_tokens(&tokens)
    }

    pub fn matches_tokens(&self, tokens: &[String]) -> Vec<String> {
        self.terms
            .iter()
            .filter(|term| term.matches_tokens(tokens))
            .map(|term| term.text.clone())
            .collect()
    }
}

/// `match(text, term_list)`: terms of `list` occurring in order in `text`.
pub fn match_terms(text: &str, list: &TermList) -> Vec<String> {
    list.matches(text)
}

/// True when every word of `needle` appears in `haystack` in order.
pub fn is_ordered_subsequence(haystack: &[String], needle: &[String]) -> bool {
    let mut rest = haystack.iter();
    needle
        .iter()
        .all(|word| rest.by_ref().any(|tok| tok == word))
}
