//! Crisis decision object, crisis-flow config and the decision schema check.
//!
//! The crisis decision is the one structured artefact this crate hands to an
//! external escalation path, so it is validated against the configured
//! schema every time it is built. A violation is returned to the caller as
//! [`PolicyError::SchemaViolation`]; it is never patched up or dropped.

use crate::error::{read_config, PolicyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use sukoon_text::Lang;

/// Upper bound for `escalate_deadline_seconds`.
pub const MAX_ESCALATE_DEADLINE_SECONDS: u64 = 5;

pub const DEFAULT_RESOURCES: &[&str] = &["national_hotline", "nearest_hospital"];

pub const CRISIS_VOICE_EN: &str =
    "I’m here with you. I will connect you to a trained helper now and send support options to your WhatsApp.";
pub const CRISIS_VOICE_UR: &str = "میں آپ کے ساتھ ہوں۔ میں ابھی آپ کو تربیت یافتہ مدد سے ملا رہا/رہی ہوں اور واٹس ایپ پر مدد کے آپشنز بھیج رہا/رہی ہوں۔";

/// Short neutral line spoken on the crisis path. It never echoes user text.
pub fn crisis_voice_line(lang: Lang) -> &'static str {
    match lang {
        Lang::En => CRISIS_VOICE_EN,
        Lang::Ur => CRISIS_VOICE_UR,
    }
}

/// Free-text crisis signal fields. Empty strings mean "not known".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrisisSignals {
    pub intent: String,
    pub plan: String,
    pub means: String,
    pub timeframe: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisActions {
    pub connect_human: bool,
    pub send_whatsapp: bool,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisDecision {
    pub crisis: bool,
    pub signals: CrisisSignals,
    pub actions: CrisisActions,
}

impl CrisisDecision {
    /// The fixed crisis decision: always escalate to a human and WhatsApp.
    pub fn escalate(signals: CrisisSignals, resources: &[String]) -> Self {
        Self {
            crisis: true,
            signals,
            actions: CrisisActions {
                connect_human: true,
                send_whatsapp: true,
                resources: resources.to_vec(),
            },
        }
    }
}

/// Schema the crisis decision is checked against when no config overrides it.
pub fn default_decision_schema() -> Value {
    let signal = json!({ "type": "string" });
    json!({
        "type": "object",
        "required": ["crisis", "signals", "actions"],
        "properties": {
            "crisis": { "type": "boolean", "const": true },
            "signals": {
                "type": "object",
                "required": ["intent", "plan", "means", "timeframe", "location"],
                "properties": {
                    "intent": signal,
                    "plan": signal,
                    "means": signal,
                    "timeframe": signal,
                    "location": signal
                }
            },
            "actions": {
                "type": "object",
                "required": ["connect_human", "send_whatsapp", "resources"],
                "properties": {
                    "connect_human": { "type": "boolean", "const": true },
                    "send_whatsapp": { "type": "boolean", "const": true },
                    "resources": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string", "minLength": 1 }
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct CrisisFlowFile {
    #[serde(default)]
    decision_schema: Option<Value>,
    #[serde(default)]
    escalate_deadline_seconds: Option<u64>,
    #[serde(default)]
    resources: Option<Vec<String>>,
}

/// Loaded crisis-flow configuration.
///
/// Fields are private so a value with `escalate_deadline_seconds > 5` cannot
/// be constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct CrisisFlowConfig {
    decision_schema: Value,
    escalate_deadline_seconds: u64,
    resources: Vec<String>,
}

impl Default for CrisisFlowConfig {
    fn default() -> Self {
        Self {
            decision_schema: default_decision_schema(),
            escalate_deadline_seconds: MAX_ESCALATE_DEADLINE_SECONDS,
            resources: DEFAULT_RESOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CrisisFlowConfig {
    /// Parse crisis-flow JSON. `origin` is only used in error messages.
    pub fn parse(json: &str, origin: &Path) -> Result<Self> {
        let file: CrisisFlowFile =
            serde_json::from_str(json).map_err(|e| PolicyError::malformed(origin, e))?;

        let deadline = file
            .escalate_deadline_seconds
            .unwrap_or(MAX_ESCALATE_DEADLINE_SECONDS);
        if deadline > MAX_ESCALATE_DEADLINE_SECONDS {
            return Err(PolicyError::DeadlineExceeded {
                seconds: deadline,
                max: MAX_ESCALATE_DEADLINE_SECONDS,
            });
        }

        let decision_schema = match file.decision_schema {
            None => default_decision_schema(),
            Some(schema @ Value::Object(_)) => schema,
            Some(_) => {
                return Err(PolicyError::malformed(
                    origin,
                    "decision_schema must be a JSON object",
                ))
            }
        };

        let resources: Vec<String> = file
            .resources
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let resources = if resources.is_empty() {
            Self::default().resources
        } else {
            resources
        };

        Ok(Self {
            decision_schema,
            escalate_deadline_seconds: deadline,
            resources,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_config(path)?;
        Self::parse(&text, path)
    }

    pub fn decision_schema(&self) -> &Value {
        &self.decision_schema
    }

    pub fn escalate_deadline_seconds(&self) -> u64 {
        self.escalate_deadline_seconds
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Build the crisis decision for `signals` and validate it.
    pub fn build_decision(&self, signals: CrisisSignals) -> Result<CrisisDecision> {
        let decision = CrisisDecision::escalate(signals, &self.resources);
        let value = serde_json::to_value(&decision).map_err(|e| PolicyError::SchemaViolation {
            path: "$".to_string(),
            message: e.to_string(),
        })?;
        validate_against_schema(&value, &self.decision_schema)?;
        Ok(decision)
    }
}

/// Check `value` against a JSON-Schema subset: `type`, `const`, `enum`,
/// `required`, `properties`, `items`, `minItems`, `minLength`.
/// Unknown keywords are ignored.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<()> {
    check(value, schema, "$")
}

fn violation(path: &str, message: impl Into<String>) -> PolicyError {
    PolicyError::SchemaViolation {
        path: path.to_string(),
        message: message.into(),
    }
}

fn type_matches(value: &Value, ty: &str) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn check(value: &Value, schema: &Value, path: &str) -> Result<()> {
    let Some(schema) = schema.as_object() else {
        // `true` / `{}`-like schemas accept everything.
        return Ok(());
    };

    if let Some(ty) = schema.get("type") {
        let ok = match ty {
            Value::String(t) => type_matches(value, t),
            Value::Array(ts) => ts
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(value, t)),
            _ => true,
        };
        if !ok {
            return Err(violation(path, format!("expected type {ty}, found {value}")));
        }
    }

    if let Some(expected) = schema.get("const") {
        if value != expected {
            return Err(violation(path, format!("expected {expected}, found {value}")));
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            return Err(violation(path, format!("{value} is not one of the allowed values")));
        }
    }

    if let (Some(min), Some(s)) = (schema.get("minLength").and_then(Value::as_u64), value.as_str()) {
        if (s.chars().count() as u64) < min {
            return Err(violation(path, format!("string shorter than {min}")));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(name) {
                    return Err(violation(path, format!("missing required field `{name}`")));
                }
            }
        }
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (name, sub) in props {
                if let Some(field) = obj.get(name) {
                    check(field, sub, &format!("{path}.{name}"))?;
                }
            }
        }
    }

    if let Some(items) = value.as_array() {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                return Err(violation(path, format!("expected at least {min} items, found {}", items.len())));
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                check(item, item_schema, &format!("{path}[{i}]"))?;
            }
        }
    }

    Ok(())
}
