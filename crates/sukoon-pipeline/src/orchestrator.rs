//! Four-stage turn orchestrator: `input → policy_gate → retrieve → respond`.
//!
//! Stages run sequentially on the caller's thread. The only blocking call is
//! retrieval, which goes through [`BoundedRetriever`]. Every stage is timed
//! and appears in the trace, including stages that were skipped.

use crate::config::{ConfigHandle, SukoonConfig};
use crate::error::Result;
use crate::respond::compose_answer;
use crate::retrieval::{BoundedRetriever, InFlight, Retriever};
use crate::types::{
    Graph, Metrics, NodeMs, RetrievalMetrics, TraceItem, TurnDecision, TurnRequest,
};
use crate::usage::UsageStore;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use sukoon_ckg::{rerank, EvidenceCandidate, RerankMetrics};
use sukoon_policy::{
    assess_severity, classify_topic, infer_tags, route::MAX_MATCHED_TERMS, PolicyTag,
    PolicyTagSet, Route, RouteDecision, RouteReason, SafetyInput, SafetyOutcome, SayAction, Topic,
};
use sukoon_text::{normalize_input, Lang};

/// Template rendered for a finance-abstain turn.
pub const FINANCE_TIP_TEMPLATE: &str = "finance.tip";

/// Stage duration in whole milliseconds, rounded up, never below 1.
fn stage_ms(start: Instant) -> u64 {
    let ns = start.elapsed().as_nanos();
    let ms = ns.div_ceil(1_000_000).max(1);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

/// Term gate plus the regex risk net. The net only escalates self-harm,
/// and only when the term gate did not already say `crisis`.
pub fn classify_route(config: &SukoonConfig, text: &str) -> RouteDecision {
    let decision = config.gate.detect_route(text);
    if decision.is_crisis() {
        return decision;
    }
    let risk = config.risk.detect(text);
    if risk.is_self_harm() {
        let mut matched = risk.matched_terms;
        matched.truncate(MAX_MATCHED_TERMS);
        tracing::debug!(matched = ?matched, "risk detector escalated to crisis");
        return RouteDecision {
            route: Route::Crisis,
            reason: Some(RouteReason::RiskDetector),
            matched_terms: matched,
        };
    }
    decision
}

/// Result of the policy gate stage.
struct GateResult {
    route: RouteDecision,
    tags: PolicyTagSet,
    safety: SafetyOutcome,
    /// Fixed answer for a gate-level abstain.
    abstain_answer: Option<String>,
}

impl GateResult {
    fn halted(&self) -> bool {
        self.safety.halts() || self.abstain_answer.is_some()
    }

    fn fixed_answer(&self) -> Option<&str> {
        self.safety
            .final_text()
            .or(self.abstain_answer.as_deref())
    }
}

pub struct Pipeline {
    config: Arc<ConfigHandle>,
    /// Overrides the config's lexical knowledge base when set.
    retriever: Option<Arc<dyn Retriever>>,
    usage: Option<Arc<dyn UsageStore>>,
    in_flight: InFlight,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config_digest", &self.config.snapshot().digest)
            .field("retriever", &self.retriever.as_ref().map(|r| r.name().to_string()))
            .field("usage_store", &self.usage.is_some())
            .field("retrievals_in_flight", &self.in_flight.current())
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            config,
            retriever: None,
            usage: None,
            in_flight: InFlight::new(),
        }
    }

    /// Pipeline over a fixed config with no reload sources.
    pub fn from_config(config: SukoonConfig) -> Self {
        Self::new(Arc::new(ConfigHandle::from_config(
            Default::default(),
            config,
        )))
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_usage_store(mut self, usage: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Run one turn against the current config snapshot.
    ///
    /// The only error is a crisis decision that fails its schema; every
    /// other failure degrades inside the stage that hit it.
    pub fn run(&self, request: &TurnRequest) -> Result<TurnDecision> {
        let config = self.config.snapshot();
        let mut trace = Vec::with_capacity(4);
        let mut node_ms = NodeMs::default();

        // input
        let started = Instant::now();
        let text = normalize_input(&request.text);
        let lang = request.lang.unwrap_or_else(|| Lang::detect(&text));
        let topic = request.topic.unwrap_or_else(|| classify_topic(&text));
        node_ms.input = stage_ms(started);
        trace.push(TraceItem {
            node: "input".to_string(),
            ms: node_ms.input,
            out: Some(json!({ "lang": lang, "topic": topic, "chars": text.chars().count() })),
        });

        // policy_gate
        let started = Instant::now();
        let gate = self.policy_gate(&config, request, &text, lang, topic)?;
        node_ms.policy_gate = stage_ms(started);
        tracing::debug!(
            route = %gate.route.route,
            reason = ?gate.route.reason,
            safety = gate.safety.label(),
            "policy gate decided"
        );
        trace.push(TraceItem {
            node: "policy_gate".to_string(),
            ms: node_ms.policy_gate,
            out: Some(json!({
                "route": gate.route.route,
                "reason": gate.route.reason,
                "matched_terms": gate.route.matched_terms,
                "policy_tags": gate.tags.as_strings(),
                "safety": gate.safety.label(),
            })),
        });

        // retrieve
        let started = Instant::now();
        let should_retrieve = gate.route.route == Route::Assist && !gate.halted();
        let (evidence, retrieval_metrics, ckg_metrics, retrieve_out) = if should_retrieve {
            self.retrieve(&config, &text)
        } else {
            let reason = if gate.halted() { "halted" } else { "route" };
            (
                Vec::new(),
                None,
                RerankMetrics {
                    used: false,
                    lambda: config.concepts.lambda(),
                    syn_terms: 0,
                    min_score_used: 0.0,
                },
                json!({ "skipped": true, "reason": reason }),
            )
        };
        node_ms.retrieve = stage_ms(started);
        trace.push(TraceItem {
            node: "retrieve".to_string(),
            ms: node_ms.retrieve,
            out: Some(retrieve_out),
        });

        // respond
        let started = Instant::now();
        let answer = match gate.fixed_answer() {
            Some(fixed) => fixed.to_string(),
            None => compose_answer(lang, &evidence),
        };
        let actions = match (&gate.safety, &gate.abstain_answer) {
            (SafetyOutcome::PassThrough, Some(tip)) => vec![SayAction::Say {
                text: tip.clone(),
            }],
            (outcome, _) => outcome.say_actions(),
        };
        node_ms.respond = stage_ms(started);
        trace.push(TraceItem {
            node: "respond".to_string(),
            ms: node_ms.respond,
            out: Some(json!({ "chars": answer.chars().count(), "evidence": evidence.len() })),
        });

        if let Some(user_id) = request.user_id.as_deref() {
            if let Some(usage) = &self.usage {
                usage.record(user_id, chrono::Utc::now().date_naive(), gate.route.route);
            }
        }

        let total_ms = node_ms.total();
        tracing::debug!(
            route = %gate.route.route,
            total_ms,
            evidence = evidence.len(),
            "turn complete"
        );

        Ok(TurnDecision {
            turn_id: uuid::Uuid::new_v4(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            route: gate.route.route,
            reason: gate.route.reason,
            lang,
            topic,
            answer,
            policy_tags: gate.tags.as_strings(),
            matched_terms: gate.route.matched_terms,
            actions,
            crisis_decision: gate.safety.crisis_decision().cloned(),
            evidence,
            graph: Graph { trace },
            metrics: Metrics {
                total_ms,
                node_ms,
                retrieval: retrieval_metrics,
                ckg: ckg_metrics,
            },
            config_digest: config.digest.clone(),
        })
    }

    fn policy_gate(
        &self,
        config: &SukoonConfig,
        request: &TurnRequest,
        text: &str,
        lang: Lang,
        topic: Topic,
    ) -> Result<GateResult> {
        let route = match request.predecided_route {
            Some(r) => RouteDecision::predecided(r),
            None => classify_route(config, text),
        };
        let mut tags = infer_tags(text, topic);
        if route.reason.is_some_and(RouteReason::is_allowlist)
            && tags.remove(PolicyTag::ScopeOutOfScope)
        {
            tracing::debug!(reason = ?route.reason, "allowlisted turn kept in scope");
        }
        let signals = request
            .crisis_signals
            .clone()
            .unwrap_or_else(|| assess_severity(text).crisis_signals());

        match route.route {
            Route::Crisis => {
                let crisis_tag = tags.iter().find(|t| t.is_crisis());
                let flow = config.safety.crisis_flow(crisis_tag, lang, signals)?;
                Ok(GateResult {
                    route,
                    tags,
                    safety: SafetyOutcome::CrisisFlow(flow),
                    abstain_answer: None,
                })
            }
            Route::Abstain => {
                let tip = config
                    .safety
                    .templates()
                    .render(FINANCE_TIP_TEMPLATE, lang.as_str(), false);
                Ok(GateResult {
                    route,
                    tags,
                    safety: SafetyOutcome::PassThrough,
                    abstain_answer: Some(tip),
                })
            }
            Route::Assist => {
                let input = SafetyInput {
                    policy_tags: tags.clone(),
                    lang,
                    crisis_signals: signals,
                };
                let safety = config.safety.evaluate(&input)?;
                let route = match &safety {
                    SafetyOutcome::Refuse(_) => RouteDecision {
                        route: Route::Abstain,
                        reason: Some(RouteReason::SafetyNode),
                        matched_terms: route.matched_terms,
                    },
                    SafetyOutcome::CrisisFlow(_) => RouteDecision {
                        route: Route::Crisis,
                        reason: Some(RouteReason::SafetyNode),
                        matched_terms: route.matched_terms,
                    },
                    SafetyOutcome::PassThrough => route,
                };
                Ok(GateResult {
                    route,
                    tags,
                    safety,
                    abstain_answer: None,
                })
            }
        }
    }

    fn retrieve(
        &self,
        config: &SukoonConfig,
        text: &str,
    ) -> (
        Vec<EvidenceCandidate>,
        Option<RetrievalMetrics>,
        RerankMetrics,
        serde_json::Value,
    ) {
        let backend: Arc<dyn Retriever> = match &self.retriever {
            Some(r) => Arc::clone(r),
            None => Arc::clone(&config.knowledge_base) as Arc<dyn Retriever>,
        };
        let bounded = BoundedRetriever::new(backend)
            .with_in_flight(self.in_flight.clone())
            .retrieve(text, &config.retrieval);
        let outcome = bounded.outcome;

        let candidates: Vec<EvidenceCandidate> =
            bounded.hits.into_iter().map(EvidenceCandidate::from).collect();
        let candidate_count = candidates.len();
        let expansion = config.concepts.expand(text);
        let top_k = config.retrieval.top_k;
        let mut reranked = rerank(
            candidates,
            &expansion.syn_terms,
            config.concepts.lambda(),
            top_k,
        );
        reranked.candidates.truncate(top_k);
        let evidence = reranked.candidates;

        let unique_sources = evidence
            .iter()
            .map(|c| c.source.as_str())
            .collect::<HashSet<_>>()
            .len();
        let min_score = evidence
            .iter()
            .map(|c| c.blended_score)
            .reduce(f64::min)
            .unwrap_or(0.0);

        let out = json!({
            "outcome": outcome.as_str(),
            "candidates": candidate_count,
            "kept": evidence.len(),
            "syn_terms": expansion.syn_terms.len(),
            "ckg_used": reranked.metrics.used,
        });
        let metrics = RetrievalMetrics {
            k: evidence.len(),
            min_score,
            unique_sources,
            outcome: outcome.as_str().to_string(),
        };
        (evidence, Some(metrics), reranked.metrics, out)
    }
}
