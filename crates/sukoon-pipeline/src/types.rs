//! Per-turn request and decision records.

use serde::{Deserialize, Serialize};
use sukoon_ckg::{EvidenceCandidate, RerankMetrics};
use sukoon_policy::{CrisisDecision, CrisisSignals, Route, RouteReason, SayAction, Topic};
use sukoon_text::Lang;
use uuid::Uuid;

/// Pipeline stage names, in execution order.
pub const STAGES: [&str; 4] = ["input", "policy_gate", "retrieve", "respond"];

/// One user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub text: String,
    /// Language hint; detected from the script when absent.
    pub lang: Option<Lang>,
    /// Topic hint; classified from the text when absent.
    pub topic: Option<Topic>,
    /// Route already decided by the caller. The term gate is skipped.
    pub predecided_route: Option<Route>,
    pub user_id: Option<String>,
    /// Structured crisis signals from an upstream extractor; severity cues
    /// from the text are used when absent.
    pub crisis_signals: Option<CrisisSignals>,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn with_predecided_route(mut self, route: Route) -> Self {
        self.predecided_route = Some(route);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_crisis_signals(mut self, signals: CrisisSignals) -> Self {
        self.crisis_signals = Some(signals);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceItem {
    pub node: String,
    pub ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub trace: Vec<TraceItem>,
}

/// Milliseconds per stage; every entry is at least 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMs {
    pub input: u64,
    pub policy_gate: u64,
    pub retrieve: u64,
    pub respond: u64,
}

impl NodeMs {
    pub fn total(&self) -> u64 {
        self.input + self.policy_gate + self.retrieve + self.respond
    }

    pub fn get(&self, stage: &str) -> Option<u64> {
        match stage {
            "input" => Some(self.input),
            "policy_gate" => Some(self.policy_gate),
            "retrieve" => Some(self.retrieve),
            "respond" => Some(self.respond),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    /// Evidence items surfaced.
    pub k: usize,
    /// Lowest blended score among surfaced items (0 when none).
    pub min_score: f64,
    pub unique_sources: usize,
    /// `ok | empty | timeout | failed`.
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_ms: u64,
    pub node_ms: NodeMs,
    /// Absent when retrieval was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalMetrics>,
    pub ckg: RerankMetrics,
}

/// The single record produced for every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDecision {
    pub turn_id: Uuid,
    pub timestamp_ms: i64,
    pub route: Route,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RouteReason>,
    pub lang: Lang,
    pub topic: Topic,
    pub answer: String,
    pub policy_tags: Vec<String>,
    #[serde(default)]
    pub matched_terms: Vec<String>,
    /// Flat `say` actions for external handoff; empty on a normal reply.
    pub actions: Vec<SayAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis_decision: Option<CrisisDecision>,
    pub evidence: Vec<EvidenceCandidate>,
    pub graph: Graph,
    pub metrics: Metrics,
    pub config_digest: String,
}

impl TurnDecision {
    /// True when the answer came from a fixed safety path.
    pub fn halted(&self) -> bool {
        !self.actions.is_empty()
    }
}
