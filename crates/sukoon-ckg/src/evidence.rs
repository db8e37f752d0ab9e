//! Evidence candidates and the concept-overlap score.

use crate::expand::SynTerm;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use sukoon_text::tokenize;

/// Bonus when both the candidate source and the expansion mention `phq`.
pub const PHQ_SOURCE_BONUS: f64 = 0.1;

/// One retrieved passage, as seen by the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCandidate {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub base_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_score: Option<f64>,
    pub blended_score: f64,
}

impl EvidenceCandidate {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        source: impl Into<String>,
        base_score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            snippet: snippet.into(),
            source: source.into(),
            base_score,
            concept_score: None,
            blended_score: base_score,
        }
    }
}

/// Weighted overlap of `syn_terms` with the candidate's title and snippet,
/// in `[0, 1]`.
///
/// Membership is checked against the token set, so each term counts once no
/// matter how often it occurs. Multi-word terms never match a single token;
/// they only add to the denominator.
pub fn concept_score(candidate: &EvidenceCandidate, syn_terms: &[SynTerm]) -> f64 {
    let hay: HashSet<String> = tokenize(&format!("{} {}", candidate.title, candidate.snippet))
        .into_iter()
        .collect();
    if hay.is_empty() || syn_terms.is_empty() {
        return 0.0;
    }

    let total: f64 = syn_terms.iter().map(|s| s.weight).sum();
    let total = if total > 0.0 { total } else { 1.0 };
    let got: f64 = syn_terms
        .iter()
        .filter(|s| hay.contains(&s.term))
        .map(|s| s.weight)
        .sum();

    let bonus = if candidate.source.to_lowercase().contains("phq")
        && syn_terms.iter().any(|s| s.term.contains("phq"))
    {
        PHQ_SOURCE_BONUS
    } else {
        0.0
    };

    (got / total + bonus).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cand(title: &str, snippet: &str, source: &str) -> EvidenceCandidate {
        EvidenceCandidate::new("c1", title, snippet, source, 1.0)
    }

    #[test]
    fn weighted_overlap() {
        let syn = vec![SynTerm::new("anxiety", 1.0), SynTerm::new("worry", 0.9)];
        let s = concept_score(&cand("Anxiety basics", "breathing slowly", "gad7"), &syn);
        assert_relative_eq!(s, 1.0 / 1.9, epsilon = 1e-12);
    }

    #[test]
    fn repeated_terms_count_once() {
        let syn = vec![SynTerm::new("anxiety", 1.0), SynTerm::new("sleep", 1.0)];
        let s = concept_score(&cand("anxiety anxiety anxiety", "", "x"), &syn);
        assert_relative_eq!(s, 0.5);
    }

    #[test]
    fn phq_bonus_and_clamp() {
        let syn = vec![SynTerm::new("phq", 1.0)];
        let s = concept_score(&cand("PHQ items", "", "PHQ-9 manual"), &syn);
        assert_relative_eq!(s, 1.0);

        let syn = vec![SynTerm::new("phq9", 1.0), SynTerm::new("mood", 1.0)];
        let s = concept_score(&cand("mood check", "", "phq9_en"), &syn);
        assert_relative_eq!(s, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(concept_score(&cand("", "", "phq"), &[SynTerm::new("phq", 1.0)]), 0.0);
        assert_eq!(concept_score(&cand("title", "", "x"), &[]), 0.0);
    }

    #[test]
    fn new_candidate_blends_to_base() {
        let c = EvidenceCandidate::new("a", "t", "s", "src", 0.42);
        assert_eq!(c.blended_score, 0.42);
        assert!(c.concept_score.is_none());
    }
}
