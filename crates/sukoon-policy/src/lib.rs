//! Sukoon Policy: deterministic safety routing for English, Urdu and Roman-Urdu
//!
//! Nothing in this crate calls a model. Every decision is a pure function of
//! the input text and configuration loaded once at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         POLICY GATE                                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │   text ──► TermGate ──► crisis | assist | abstain                    │
//! │              │                                                       │
//! │              │ (non-crisis)                                          │
//! │              ▼                                                       │
//! │         RiskDetector ── self-harm ──► crisis (risk-detector)         │
//! │                                                                      │
//! │   text + topic ──► infer_tags ──► PolicyTagSet                       │
//! │                                        │                             │
//! │                                        ▼                             │
//! │                                   SafetyNode                         │
//! │                      ┌─────────────────┼──────────────┐              │
//! │                      ▼                 ▼              ▼              │
//! │                   Refuse          CrisisFlow     PassThrough         │
//! │              (RefusalTemplates)  (CrisisDecision,                    │
//! │                                   schema-checked)                    │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Precedence
//! crisis > brand allowlist > wellness allowlist > finance abstain > assist.
//! Crisis always wins, including over the brand allowlist.
//!
//! ## Failure model
//! Missing or malformed config never fails a request: loaders return
//! [`PolicyError`] and callers substitute the documented defaults. The one
//! error that must reach the caller is [`PolicyError::SchemaViolation`].

pub mod crisis;
pub mod error;
pub mod risk;
pub mod route;
pub mod safety;
pub mod tags;
pub mod templates;
pub mod term_match;
pub mod topic;

pub use crisis::{
    crisis_voice_line, CrisisActions, CrisisDecision, CrisisFlowConfig, CrisisSignals,
    MAX_ESCALATE_DEADLINE_SECONDS,
};
pub use error::{PolicyError, Result};
pub use risk::{assess_severity, RiskAssessment, RiskCategory, RiskDetector, SeverityLevel};
pub use route::{Route, RouteDecision, RouteReason, TermGate};
pub use safety::{
    CrisisFlowOutcome, PolicyMap, Refusal, SafetyAction, SafetyInput, SafetyNode, SafetyOutcome,
    SafetyRule, SayAction,
};
pub use tags::{infer_tags, PolicyTag, PolicyTagSet};
pub use templates::{RefusalTemplates, ResolvedTemplate};
pub use term_match::{match_terms, TermList};
pub use topic::{classify_topic, Topic};
