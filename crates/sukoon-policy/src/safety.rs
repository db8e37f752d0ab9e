//! Safety node: policy tags in, refusal / crisis flow / pass-through out.
//!
//! ```text
//!   tags ──► rule 1 ──► rule 2 ──► ... ──► PassThrough
//!              │          │
//!              ▼          ▼
//!          Refuse     CrisisFlow        (first matching rule halts)
//! ```
//!
//! Rule order is priority. The default table lists both crisis rules before
//! any refusal.

use crate::crisis::{crisis_voice_line, CrisisDecision, CrisisFlowConfig, CrisisSignals};
use crate::error::{read_config, PolicyError, Result};
use crate::tags::{PolicyTag, PolicyTagSet};
use crate::templates::RefusalTemplates;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sukoon_text::Lang;

/// What a rule does when its tag is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyAction {
    Refuse { template: String },
    CrisisFlow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyRule {
    pub tag: PolicyTag,
    pub action: SafetyAction,
}

impl SafetyRule {
    pub fn refuse(tag: PolicyTag, template: impl Into<String>) -> Self {
        Self {
            tag,
            action: SafetyAction::Refuse {
                template: template.into(),
            },
        }
    }

    pub fn crisis_flow(tag: PolicyTag) -> Self {
        Self {
            tag,
            action: SafetyAction::CrisisFlow,
        }
    }
}

/// Ordered rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMap {
    rules: Vec<SafetyRule>,
}

impl Default for PolicyMap {
    fn default() -> Self {
        Self {
            rules: vec![
                SafetyRule::crisis_flow(PolicyTag::CrisisSelfHarm),
                SafetyRule::crisis_flow(PolicyTag::CrisisHarmToOthers),
                SafetyRule::refuse(PolicyTag::ClinicalAskMedication, "medical.medication"),
                SafetyRule::refuse(PolicyTag::ClinicalAskDiagnosis, "medical.diagnosis"),
                SafetyRule::refuse(PolicyTag::LegalRequest, "legal.generic"),
                SafetyRule::refuse(PolicyTag::ScopeOutOfScope, "scope.out_of_scope"),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct PolicyMapFile {
    #[serde(default)]
    rules: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    tag: String,
    action: String,
    #[serde(default)]
    template: Option<String>,
}

impl PolicyMap {
    pub fn new(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    /// Parse `{rules: [{tag, action, template?}]}`.
    ///
    /// Rules with an unknown tag or action are skipped with a warning. A file
    /// with no usable rule is an error so the loader falls back to the
    /// default table instead of silently disabling every refusal.
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, String> {
        let file: PolicyMapFile = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
        let mut rules = Vec::new();
        for raw in file.rules {
            let raw: RawRule = match serde_yaml::from_value(raw) {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed policy rule");
                    continue;
                }
            };
            let tag: PolicyTag = match raw.tag.parse() {
                Ok(t) => t,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping policy rule");
                    continue;
                }
            };
            let action = match raw.action.trim() {
                "refuse" => SafetyAction::Refuse {
                    template: raw.template.unwrap_or_else(|| "generic.generic".to_string()),
                },
                "crisis_flow" => SafetyAction::CrisisFlow,
                other => {
                    tracing::warn!(tag = %tag, action = %other, "skipping policy rule with unknown action");
                    continue;
                }
            };
            rules.push(SafetyRule { tag, action });
        }
        if rules.is_empty() {
            return Err("policy map has no usable rules".to_string());
        }
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_config(path)?;
        Self::from_yaml_str(&text).map_err(|e| PolicyError::malformed(path, e))
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// The first rule whose tag is in `tags`.
    pub fn first_match(&self, tags: &PolicyTagSet) -> Option<&SafetyRule> {
        self.rules.iter().find(|r| tags.contains(r.tag))
    }
}

/// Everything the safety node looks at for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyInput {
    pub policy_tags: PolicyTagSet,
    pub lang: Lang,
    pub crisis_signals: CrisisSignals,
}

/// Flat action record for external handoff and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SayAction {
    Say { text: String },
}

impl SayAction {
    pub fn text(&self) -> &str {
        match self {
            SayAction::Say { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refusal {
    pub tag: PolicyTag,
    pub template: String,
    pub final_text: String,
    /// Refusals always offer a WhatsApp follow-up.
    pub whatsapp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrisisFlowOutcome {
    /// `None` when the flow was entered from the route gate rather than a tag.
    pub tag: Option<PolicyTag>,
    pub final_text: String,
    pub decision: CrisisDecision,
    pub connect_human: bool,
    pub whatsapp: bool,
    pub escalate_deadline_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyOutcome {
    Refuse(Refusal),
    CrisisFlow(CrisisFlowOutcome),
    PassThrough,
}

impl SafetyOutcome {
    pub fn halts(&self) -> bool {
        match self {
            SafetyOutcome::Refuse(_) | SafetyOutcome::CrisisFlow(_) => true,
            SafetyOutcome::PassThrough => false,
        }
    }

    pub fn final_text(&self) -> Option<&str> {
        match self {
            SafetyOutcome::Refuse(r) => Some(&r.final_text),
            SafetyOutcome::CrisisFlow(c) => Some(&c.final_text),
            SafetyOutcome::PassThrough => None,
        }
    }

    pub fn crisis_decision(&self) -> Option<&CrisisDecision> {
        match self {
            SafetyOutcome::CrisisFlow(c) => Some(&c.decision),
            SafetyOutcome::Refuse(_) | SafetyOutcome::PassThrough => None,
        }
    }

    /// `[{type: "say", text}]` for halting outcomes, empty otherwise.
    pub fn say_actions(&self) -> Vec<SayAction> {
        self.final_text()
            .map(|text| {
                vec![SayAction::Say {
                    text: text.to_string(),
                }]
            })
            .unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SafetyOutcome::Refuse(_) => "refuse",
            SafetyOutcome::CrisisFlow(_) => "crisis_flow",
            SafetyOutcome::PassThrough => "pass_through",
        }
    }
}

/// Deterministic guardrail over a rule table, refusal templates and the
/// crisis-flow config. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct SafetyNode {
    policy_map: PolicyMap,
    templates: RefusalTemplates,
    crisis_flow: CrisisFlowConfig,
}

impl SafetyNode {
    pub fn new(
        policy_map: PolicyMap,
        templates: RefusalTemplates,
        crisis_flow: CrisisFlowConfig,
    ) -> Self {
        Self {
            policy_map,
            templates,
            crisis_flow,
        }
    }

    pub fn policy_map(&self) -> &PolicyMap {
        &self.policy_map
    }

    pub fn templates(&self) -> &RefusalTemplates {
        &self.templates
    }

    pub fn crisis_flow_config(&self) -> &CrisisFlowConfig {
        &self.crisis_flow
    }

    /// Run the rule table. Only a crisis decision that fails schema
    /// validation produces an error.
    pub fn evaluate(&self, input: &SafetyInput) -> Result<SafetyOutcome> {
        let Some(rule) = self.policy_map.first_match(&input.policy_tags) else {
            return Ok(SafetyOutcome::PassThrough);
        };
        tracing::debug!(tag = %rule.tag, "safety rule fired");

        match &rule.action {
            SafetyAction::Refuse { template } => Ok(SafetyOutcome::Refuse(Refusal {
                tag: rule.tag,
                template: template.clone(),
                final_text: self.templates.render(template, input.lang.as_str(), true),
                whatsapp: true,
            })),
            SafetyAction::CrisisFlow => self
                .crisis_flow(Some(rule.tag), input.lang, input.crisis_signals.clone())
                .map(SafetyOutcome::CrisisFlow),
        }
    }

    /// Build the crisis flow directly, e.g. when the route gate already
    /// decided `crisis`.
    pub fn crisis_flow(
        &self,
        tag: Option<PolicyTag>,
        lang: Lang,
        signals: CrisisSignals,
    ) -> Result<CrisisFlowOutcome> {
        let decision = self.crisis_flow.build_decision(signals)?;
        Ok(CrisisFlowOutcome {
            tag,
            final_text: crisis_voice_line(lang).to_string(),
            decision,
            connect_human: true,
            whatsapp: true,
            escalate_deadline_seconds: self.crisis_flow.escalate_deadline_seconds(),
        })
    }
}
