//! Query expansion.
//!
//! Two passes over one query:
//!
//! 1. **Phrase pass**: every canonical concept whose compact form occurs in
//!    the compact query (so `phq 9`, `PHQ-9` and `phq9` all hit `phq-9`)
//!    contributes itself, its synonyms and its `ur` / `roman` aliases.
//! 2. **Token pass**: each token resolves through exact alias → compact form
//!    → itself, then contributes the resolved term and that term's synonyms
//!    and aliases.
//!
//! A seen-set keeps the first weight assigned to any term.

use crate::table::{
    ConceptTable, CANONICAL_WEIGHT, EXPANSION_LANGS, LANG_ALIAS_WEIGHT, SYNONYM_WEIGHT,
    UNRESOLVED_WEIGHT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use sukoon_text::{normalize_compact, tokenize, Lang};

/// One weighted expansion term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynTerm {
    pub term: String,
    pub weight: f64,
}

impl SynTerm {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self {
            term: term.into(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub syn_terms: Vec<SynTerm>,
    pub lang: Lang,
}

impl Expansion {
    pub fn is_empty(&self) -> bool {
        self.syn_terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.syn_terms.iter().map(|s| s.term.as_str())
    }
}

#[derive(Default)]
struct Collector {
    out: Vec<SynTerm>,
    seen: HashSet<String>,
}

impl Collector {
    fn push(&mut self, term: &str, weight: f64) {
        if term.is_empty() || self.seen.contains(term) {
            return;
        }
        self.seen.insert(term.to_string());
        self.out.push(SynTerm::new(term, weight));
    }
}

impl ConceptTable {
    /// Expand `query` into weighted synonym / alias terms.
    pub fn expand(&self, query: &str) -> Expansion {
        let lang = Lang::detect(query);
        let compact_query = normalize_compact(query);
        let mut acc = Collector::default();

        for (canon, syns) in &self.synonyms {
            let compact = normalize_compact(canon);
            if compact.is_empty() || !compact_query.contains(&compact) {
                continue;
            }
            acc.push(canon, CANONICAL_WEIGHT);
            self.push_related(canon, Some(syns.as_slice()), &mut acc);
        }

        for token in tokenize(query) {
            let resolved = self
                .lookup_alias(&token)
                .map(|(canon, _)| canon)
                .or_else(|| self.lookup_normalized(&normalize_compact(&token)))
                .unwrap_or(token.as_str());

            let weight = if resolved == token.as_str() {
                self.lookup_alias(&token)
                    .map(|(_, w)| w)
                    .unwrap_or(UNRESOLVED_WEIGHT)
            } else {
                CANONICAL_WEIGHT
            };
            acc.push(resolved, weight);
            self.push_related(resolved, self.synonyms_of(resolved), &mut acc);
        }

        Expansion {
            syn_terms: acc.out,
            lang,
        }
    }

    fn push_related(&self, canon: &str, synonyms: Option<&[String]>, acc: &mut Collector) {
        let cap = self.max_syn_per_term;
        for alias in synonyms.unwrap_or_default().iter().take(cap) {
            acc.push(alias, SYNONYM_WEIGHT);
        }
        for lang in EXPANSION_LANGS {
            if let Some(aliases) = self.lang_aliases_of(lang, canon) {
                for alias in aliases.iter().take(cap) {
                    acc.push(alias, LANG_ALIAS_WEIGHT);
                }
            }
        }
    }
}
