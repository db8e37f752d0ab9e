//! Sukoon Pipeline: one turn from raw text to a traced decision
//!
//! ```text
//!   TurnRequest
//!       │
//!       ▼
//!   input ─────────► NFC, language, topic
//!       │
//!       ▼
//!   policy_gate ───► term gate + risk net, tags, safety node
//!       │               (crisis flow / refusal / finance tip halt here)
//!       ▼
//!   retrieve ──────► BoundedRetriever → expand → rerank → top_k
//!       │               (skipped unless assist and not halted)
//!       ▼
//!   respond ───────► fixed safety text, or evidence lines, or generic reply
//!       │
//!       ▼
//!   TurnDecision { route, answer, actions, crisis_decision, graph.trace, metrics }
//! ```
//!
//! Configuration is an immutable [`SukoonConfig`] snapshot behind a
//! [`ConfigHandle`]; reloading swaps the snapshot without disturbing turns
//! already in flight.

pub mod config;
pub mod error;
pub mod eval;
pub mod orchestrator;
pub mod respond;
pub mod retrieval;
pub mod types;
pub mod usage;

pub use config::{ConfigHandle, ConfigSources, FileReport, FileStatus, SukoonConfig};
pub use error::{PipelineError, Result};
pub use eval::{run_eval, write_report, EvalConfig, EvalItem, EvalReport};
pub use orchestrator::{classify_route, Pipeline};
pub use retrieval::{
    BoundedRetriever, InFlight, KbItem, LexicalRetriever, RetrievalConfig, RetrievalError,
    RetrievalOutcome, RetrievedHit, Retriever,
};
pub use types::{NodeMs, TraceItem, TurnDecision, TurnRequest, STAGES};
pub use usage::{InMemoryUsageStore, UsageCount, UsageStore};
