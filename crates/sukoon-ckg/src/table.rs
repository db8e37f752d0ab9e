//! Concept table: canonical terms, synonyms and cross-language aliases.
//!
//! ```yaml
//! lambda: 0.25
//! max_syn_per_term: 5
//! synonyms:
//!   phq-9: [patient health questionnaire, phq9]
//! lang_aliases:
//!   ur:
//!     anxiety: [اضطراب, گھبراہٹ]
//!   roman:
//!     anxiety: [ghabrahat, bechaini]
//! ```
//!
//! Two reverse indexes are built once at load:
//!
//! | index        | key                     | value            |
//! |--------------|-------------------------|------------------|
//! | `alias_index`| lowercase alias         | (canon, weight)  |
//! | `norm_index` | compact normalized form | canon            |
//!
//! Weights: canonical 1.0, listed synonym 0.9, language alias 0.8. A
//! `lang_aliases` base that is not already known indexes itself at 0.9.

use crate::error::{ConceptError, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;
use sukoon_text::normalize_compact;

pub const CANONICAL_WEIGHT: f64 = 1.0;
pub const SYNONYM_WEIGHT: f64 = 0.9;
pub const LANG_ALIAS_WEIGHT: f64 = 0.8;
/// Weight of a query token that resolves to no concept.
pub const UNRESOLVED_WEIGHT: f64 = 0.7;

pub const DEFAULT_LAMBDA: f64 = 0.25;
pub const DEFAULT_MAX_SYN_PER_TERM: usize = 5;

/// Alias languages pulled in during expansion.
pub const EXPANSION_LANGS: [&str; 2] = ["ur", "roman"];

#[derive(Debug, Deserialize)]
struct ConceptFile {
    #[serde(default)]
    lambda: Option<f64>,
    #[serde(default)]
    max_syn_per_term: Option<usize>,
    #[serde(default)]
    synonyms: Option<Mapping>,
    #[serde(default)]
    lang_aliases: Option<Mapping>,
}

/// Immutable concept table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptTable {
    pub(crate) lambda: f64,
    pub(crate) max_syn_per_term: usize,
    /// `(canon, synonyms)` in file order.
    pub(crate) synonyms: Vec<(String, Vec<String>)>,
    /// lang → base → aliases.
    pub(crate) lang_aliases: HashMap<String, HashMap<String, Vec<String>>>,
    pub(crate) alias_index: HashMap<String, (String, f64)>,
    pub(crate) norm_index: HashMap<String, String>,
}

impl Default for ConceptTable {
    fn default() -> Self {
        Self::disabled()
    }
}

fn clean(s: &str) -> String {
    s.trim().to_lowercase()
}

/// A YAML list of strings; anything else yields an empty list.
fn string_list(v: &Value) -> Vec<String> {
    v.as_sequence()
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(clean)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl ConceptTable {
    /// No concepts and `λ = 0`: reranking degrades to base order.
    pub fn disabled() -> Self {
        Self {
            lambda: 0.0,
            max_syn_per_term: DEFAULT_MAX_SYN_PER_TERM,
            synonyms: Vec::new(),
            lang_aliases: HashMap::new(),
            alias_index: HashMap::new(),
            norm_index: HashMap::new(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::build(DEFAULT_LAMBDA, DEFAULT_MAX_SYN_PER_TERM, Vec::new(), Vec::new()));
        }
        let file: ConceptFile = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;

        let lambda = match file.lambda {
            Some(l) if l.is_finite() => l,
            Some(l) => return Err(format!("lambda must be finite, got {l}")),
            None => DEFAULT_LAMBDA,
        };
        let max_syn = file.max_syn_per_term.unwrap_or(DEFAULT_MAX_SYN_PER_TERM);

        let synonyms = file
            .synonyms
            .unwrap_or_default()
            .iter()
            .filter_map(|(k, v)| Some((clean(k.as_str()?), string_list(v))))
            .collect();

        let lang_aliases = file
            .lang_aliases
            .unwrap_or_default()
            .iter()
            .filter_map(|(lang, bases)| {
                let bases = bases
                    .as_mapping()?
                    .iter()
                    .filter_map(|(b, v)| Some((clean(b.as_str()?), string_list(v))))
                    .collect::<Vec<_>>();
                Some((clean(lang.as_str()?), bases))
            })
            .collect();

        Ok(Self::build(lambda, max_syn, synonyms, lang_aliases))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConceptError::ConfigMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(ConceptError::Io(e)),
        };
        Self::from_yaml_str(&text).map_err(|message| ConceptError::ConfigMalformed {
            path: path.to_path_buf(),
            message,
        })
    }

    fn build(
        lambda: f64,
        max_syn_per_term: usize,
        synonyms: Vec<(String, Vec<String>)>,
        lang_aliases: Vec<(String, Vec<(String, Vec<String>)>)>,
    ) -> Self {
        let mut alias_index = HashMap::new();
        let mut norm_index = HashMap::new();

        for (canon, syns) in &synonyms {
            if !canon.is_empty() {
                alias_index.insert(canon.clone(), (canon.clone(), CANONICAL_WEIGHT));
                norm_index.insert(normalize_compact(canon), canon.clone());
            }
            for alias in syns {
                alias_index.insert(alias.clone(), (canon.clone(), SYNONYM_WEIGHT));
                norm_index.insert(normalize_compact(alias), canon.clone());
            }
        }

        for (_, bases) in &lang_aliases {
            for (base, aliases) in bases {
                if !base.is_empty() {
                    alias_index
                        .entry(base.clone())
                        .or_insert_with(|| (base.clone(), SYNONYM_WEIGHT));
                }
                norm_index.insert(normalize_compact(base), base.clone());
                for alias in aliases {
                    alias_index
                        .entry(alias.clone())
                        .or_insert_with(|| (base.clone(), LANG_ALIAS_WEIGHT));
                    norm_index.insert(normalize_compact(alias), base.clone());
                }
            }
        }
        norm_index.remove("");

        let lang_aliases = lang_aliases
            .into_iter()
            .map(|(lang, bases)| (lang, bases.into_iter().collect()))
            .collect();

        Self {
            lambda,
            max_syn_per_term,
            synonyms,
            lang_aliases,
            alias_index,
            norm_index,
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn max_syn_per_term(&self) -> usize {
        self.max_syn_per_term
    }

    /// Reranking only blends when this is true.
    pub fn is_enabled(&self) -> bool {
        self.lambda > 0.0
    }

    pub fn concept_count(&self) -> usize {
        self.synonyms.len()
    }

    /// `(canon, weight)` for an exact alias.
    pub fn lookup_alias(&self, alias: &str) -> Option<(&str, f64)> {
        self.alias_index.get(alias).map(|(c, w)| (c.as_str(), *w))
    }

    /// Canon for a compact normalized form.
    pub fn lookup_normalized(&self, normalized: &str) -> Option<&str> {
        self.norm_index.get(normalized).map(String::as_str)
    }

    pub(crate) fn synonyms_of(&self, canon: &str) -> Option<&[String]> {
        self.synonyms
            .iter()
            .find(|(c, _)| c == canon)
            .map(|(_, syns)| syns.as_slice())
    }

    pub(crate) fn lang_aliases_of(&self, lang: &str, base: &str) -> Option<&[String]> {
        self.lang_aliases
            .get(lang)
            .and_then(|bases| bases.get(base))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
lambda: 0.3
max_syn_per_term: 2
synonyms:
  PHQ-9: [Patient Health Questionnaire, phq9, depression screener]
  anxiety: [worry]
lang_aliases:
  ur:
    anxiety: [اضطراب]
    sleep: [نیند]
  roman:
    anxiety: [ghabrahat]
"#;

    #[test]
    fn indexes_use_documented_weights() {
        let t = ConceptTable::from_yaml_str(YAML).unwrap();
        assert_eq!(t.lookup_alias("phq-9"), Some(("phq-9", CANONICAL_WEIGHT)));
        assert_eq!(t.lookup_alias("worry"), Some(("anxiety", SYNONYM_WEIGHT)));
        assert_eq!(t.lookup_alias("اضطراب"), Some(("anxiety", LANG_ALIAS_WEIGHT)));
        // A base only known through lang_aliases indexes itself.
        assert_eq!(t.lookup_alias("sleep"), Some(("sleep", SYNONYM_WEIGHT)));
        // Canonical entries are not downgraded by lang_aliases.
        assert_eq!(t.lookup_alias("anxiety"), Some(("anxiety", CANONICAL_WEIGHT)));
    }

    #[test]
    fn normalized_forms_resolve_to_canon() {
        let t = ConceptTable::from_yaml_str(YAML).unwrap();
        assert_eq!(t.lookup_normalized("phq9"), Some("phq-9"));
        assert_eq!(t.lookup_normalized("patienthealthquestionnaire"), Some("phq-9"));
        assert_eq!(t.lookup_normalized(""), None);
    }

    #[test]
    fn scalar_settings_and_defaults() {
        let t = ConceptTable::from_yaml_str(YAML).unwrap();
        assert_eq!(t.lambda(), 0.3);
        assert_eq!(t.max_syn_per_term(), 2);
        assert_eq!(t.concept_count(), 2);

        let d = ConceptTable::from_yaml_str("synonyms: {}").unwrap();
        assert_eq!(d.lambda(), DEFAULT_LAMBDA);
        assert_eq!(d.max_syn_per_term(), DEFAULT_MAX_SYN_PER_TERM);
    }

    #[test]
    fn null_sections_are_empty() {
        let t = ConceptTable::from_yaml_str("lambda: 0.1\nsynonyms:\nlang_aliases:\n").unwrap();
        assert_eq!(t.concept_count(), 0);
    }

    #[test]
    fn disabled_table_does_not_blend() {
        assert!(!ConceptTable::disabled().is_enabled());
        assert!(ConceptTable::from_yaml_str(YAML).unwrap().is_enabled());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ConceptTable::load(Path::new("/nope/ckg.yaml")).unwrap_err();
        assert!(matches!(err, ConceptError::ConfigMissing { .. }));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(ConceptTable::from_yaml_str("lambda: [1").is_err());
        assert!(ConceptTable::from_yaml_str("lambda: .nan").is_err());
    }
}
