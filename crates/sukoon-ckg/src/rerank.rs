//! Blended reranking: `blended = base + λ · concept`.
//!
//! Output order never depends on the order the retriever returned
//! candidates in. Candidates are first put in base order (base score
//! descending, then id ascending) and every later tie falls back to that
//! order.

use crate::evidence::{concept_score, EvidenceCandidate};
use crate::expand::SynTerm;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What the reranker did, surfaced as `metrics.ckg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankMetrics {
    pub used: bool,
    pub lambda: f64,
    pub syn_terms: usize,
    /// Lowest concept score among the first `top_k` candidates.
    pub min_score_used: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reranked {
    pub candidates: Vec<EvidenceCandidate>,
    pub metrics: RerankMetrics,
}

fn base_order(a: &EvidenceCandidate, b: &EvidenceCandidate) -> Ordering {
    b.base_score
        .total_cmp(&a.base_score)
        .then_with(|| a.id.cmp(&b.id))
}

/// Put candidates in base order with `blended = base`.
pub fn sort_by_base(candidates: &mut [EvidenceCandidate]) {
    candidates.sort_by(base_order);
    for c in candidates.iter_mut() {
        c.concept_score = None;
        c.blended_score = c.base_score;
    }
}

/// Rerank `candidates`. A no-op beyond base ordering when `syn_terms` is
/// empty or `lambda <= 0`.
pub fn rerank(
    mut candidates: Vec<EvidenceCandidate>,
    syn_terms: &[SynTerm],
    lambda: f64,
    top_k: usize,
) -> Reranked {
    sort_by_base(&mut candidates);

    if syn_terms.is_empty() || lambda.is_nan() || lambda <= 0.0 {
        return Reranked {
            candidates,
            metrics: RerankMetrics {
                used: false,
                lambda,
                syn_terms: syn_terms.len(),
                min_score_used: 0.0,
            },
        };
    }

    let mut ranked: Vec<(usize, EvidenceCandidate)> = candidates
        .into_iter()
        .map(|mut c| {
            let concept = concept_score(&c, syn_terms);
            c.concept_score = Some(concept);
            c.blended_score = c.base_score + lambda * concept;
            c
        })
        .enumerate()
        .collect();

    ranked.sort_by(|(ia, a), (ib, b)| {
        b.blended_score
            .total_cmp(&a.blended_score)
            .then_with(|| ia.cmp(ib))
    });
    let candidates: Vec<EvidenceCandidate> = ranked.into_iter().map(|(_, c)| c).collect();

    let min_score_used = candidates
        .iter()
        .take(top_k)
        .filter_map(|c| c.concept_score)
        .reduce(f64::min)
        .unwrap_or(0.0);

    tracing::debug!(
        lambda,
        syn_terms = syn_terms.len(),
        min_score_used,
        "reranked evidence"
    );

    Reranked {
        candidates,
        metrics: RerankMetrics {
            used: true,
            lambda,
            syn_terms: syn_terms.len(),
            min_score_used,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(id: &str, title: &str, base: f64) -> EvidenceCandidate {
        EvidenceCandidate::new(id, title, "", "kb", base)
    }

    fn ids(r: &Reranked) -> Vec<&str> {
        r.candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn zero_lambda_keeps_base_order() {
        let r = rerank(
            vec![c("b", "x", 0.5), c("a", "x", 0.9), c("c", "x", 0.5)],
            &[SynTerm::new("x", 1.0)],
            0.0,
            3,
        );
        assert_eq!(ids(&r), vec!["a", "b", "c"]);
        assert!(!r.metrics.used);
        assert!(r.candidates.iter().all(|c| c.blended_score == c.base_score));
    }

    #[test]
    fn empty_syn_terms_is_noop() {
        let r = rerank(vec![c("a", "x", 0.1), c("b", "x", 0.2)], &[], 0.5, 2);
        assert_eq!(ids(&r), vec!["b", "a"]);
        assert!(!r.metrics.used);
        assert_eq!(r.metrics.syn_terms, 0);
    }

    #[test]
    fn concept_overlap_can_lift_a_candidate() {
        let syn = [SynTerm::new("breathing", 1.0)];
        let r = rerank(
            vec![c("plain", "sleep hygiene", 1.0), c("match", "breathing drill", 0.9)],
            &syn,
            0.25,
            2,
        );
        assert_eq!(ids(&r), vec!["match", "plain"]);
        assert_eq!(r.candidates[0].blended_score, 0.9 + 0.25);
        assert!(r.metrics.used);
        assert_eq!(r.metrics.syn_terms, 1);
        assert_eq!(r.metrics.min_score_used, 0.0);
    }

    #[test]
    fn blended_ties_fall_back_to_base_order() {
        let syn = [SynTerm::new("zzz", 1.0)];
        let r = rerank(vec![c("b", "t", 0.5), c("a", "t", 0.5)], &syn, 1.0, 2);
        assert_eq!(ids(&r), vec!["a", "b"]);
    }

    #[test]
    fn min_score_only_covers_top_k() {
        let syn = [SynTerm::new("calm", 1.0)];
        let r = rerank(
            vec![c("a", "calm", 0.9), c("b", "other", 0.1)],
            &syn,
            0.5,
            1,
        );
        assert_eq!(r.metrics.min_score_used, 1.0);
    }
}
