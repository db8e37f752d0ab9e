//! Sukoon CKG-lite: concept expansion and blended evidence ranking
//!
//! A small, config-driven concept graph (canonical terms, synonyms, Urdu and
//! Roman-Urdu aliases) used only to improve evidence ranking. It never takes
//! part in safety gating.
//!
//! ```text
//!   query ──► ConceptTable::expand ──► [(term, weight)]
//!                                          │
//!   retriever hits ──► EvidenceCandidate ──┴──► rerank(λ) ──► top-k
//! ```
//!
//! With `λ = 0`, an empty expansion or a missing table, reranking is the
//! identity over base order.

pub mod error;
pub mod evidence;
pub mod expand;
pub mod rerank;
pub mod table;

pub use error::{ConceptError, Result};
pub use evidence::{concept_score, EvidenceCandidate};
pub use expand::{Expansion, SynTerm};
pub use rerank::{rerank, sort_by_base, RerankMetrics, Reranked};
pub use table::ConceptTable;
