//! Regex risk detector and self-harm severity.
//!
//! This is a second opinion next to the term gate, not a replacement for it.
//! Categories are evaluated in a fixed order and the first hit wins:
//! self-harm, harm to others, abuse/assault, medical emergency.

use crate::crisis::CrisisSignals;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Confidence reported for any category hit.
pub const HIT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "self-harm")]
    SelfHarm,
    #[serde(rename = "harm-others")]
    HarmOthers,
    #[serde(rename = "abuse/assault")]
    AbuseAssault,
    #[serde(rename = "medical-emergency")]
    MedicalEmergency,
}

impl RiskCategory {
    pub const ORDERED: [RiskCategory; 4] = [
        RiskCategory::SelfHarm,
        RiskCategory::HarmOthers,
        RiskCategory::AbuseAssault,
        RiskCategory::MedicalEmergency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::SelfHarm => "self-harm",
            RiskCategory::HarmOthers => "harm-others",
            RiskCategory::AbuseAssault => "abuse/assault",
            RiskCategory::MedicalEmergency => "medical-emergency",
        }
    }

    fn patterns(self) -> &'static [&'static str] {
        match self {
            RiskCategory::SelfHarm => SELF_HARM,
            RiskCategory::HarmOthers => HARM_OTHERS,
            RiskCategory::AbuseAssault => ABUSE,
            RiskCategory::MedicalEmergency => MEDICAL,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SELF_HARM: &[&str] = &[
    r"suicide",
    r"self[\s-]?harm",
    r"end\s*my\s*life",
    r"kill\s*myself",
    r"take my own life",
    r"hurt myself",
    r"khud\s?kushi",
    r"apni\s+jaan\s+le(na)?",
    r"apne\s+aap\s+ko\s+maar(na)?",
    r"apne\s+aap\s+ko\s+nuksan",
    r"خود\s*ک[وْ]\s*نقصان",
    r"خود\s*کو\s*تکلیف",
    r"اپنی\s*زندگی\s*ختم",
    r"اپنی\s*جان\s*لین(ا|ے)",
    r"جان\s*لے\s*(لوں|لینا)",
    r"خودکشی",
];

const HARM_OTHERS: &[&str] = &[
    r"kill (him|her|them|someone)",
    r"murder",
    r"shoot",
    r"stab",
    r"bomb",
    r"harm others",
    r"attack",
    r"qatal",
    r"maar\s+d(o|u)nga",
    r"hamla",
];

const ABUSE: &[&str] = &[
    r"rape",
    r"sexual assault",
    r"molest",
    r"abuse",
    r"harass(ment)?",
    r"z(i|e)ad(a|aa)ti",
    r"jinsi\s+tashaddud",
    r"tashaddud",
];

const MEDICAL: &[&str] = &[
    r"overdose",
    r"poison",
    r"bleeding",
    r"emergency",
    r"panic attack",
    r"heart attack",
    r"choking",
    r"stroke",
    r"zehar",
];

/// Result of one [`RiskDetector::detect`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub category: Option<RiskCategory>,
    pub matched_terms: Vec<String>,
    pub confidence: f64,
}

impl RiskAssessment {
    pub fn is_crisis(&self) -> bool {
        self.category.is_some()
    }

    pub fn is_self_harm(&self) -> bool {
        self.category == Some(RiskCategory::SelfHarm)
    }
}

/// One compiled case-insensitive alternation per category.
#[derive(Debug, Clone)]
pub struct RiskDetector {
    compiled: Vec<(RiskCategory, Regex)>,
}

impl Default for RiskDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskDetector {
    pub fn new() -> Self {
        let compiled = RiskCategory::ORDERED
            .into_iter()
            .filter_map(|cat| {
                let source = format!("(?i)({})", cat.patterns().join("|"));
                match Regex::new(&source) {
                    Ok(rx) => Some((cat, rx)),
                    Err(err) => {
                        tracing::warn!(category = %cat, error = %err, "risk pattern failed to compile");
                        None
                    }
                }
            })
            .collect();
        Self { compiled }
    }

    pub fn detect(&self, text: &str) -> RiskAssessment {
        for (cat, rx) in &self.compiled {
            if let Some(m) = rx.find(text) {
                return RiskAssessment {
                    category: Some(*cat),
                    matched_terms: vec![m.as_str().to_string()],
                    confidence: HIT_CONFIDENCE,
                };
            }
        }
        RiskAssessment {
            category: None,
            matched_terms: Vec::new(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityLevel {
    /// No self-harm signal.
    S0,
    /// Distress or explicit denial.
    S2,
    /// Intent, means or timeframe present.
    S3,
}

/// Self-harm severity with the cues that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityAssessment {
    pub level: SeverityLevel,
    pub cues: Vec<&'static str>,
    #[serde(skip)]
    intent: bool,
    #[serde(skip)]
    means: Option<String>,
    #[serde(skip)]
    timeframe: Option<String>,
}

impl SeverityAssessment {
    /// Signal fields for a crisis decision. Unknown fields stay `"unknown"`.
    pub fn crisis_signals(&self) -> CrisisSignals {
        let unknown = || "unknown".to_string();
        CrisisSignals {
            intent: if self.intent { "yes".to_string() } else { unknown() },
            plan: unknown(),
            means: self.means.clone().unwrap_or_else(unknown),
            timeframe: self.timeframe.clone().unwrap_or_else(unknown),
            location: unknown(),
        }
    }
}

struct SeverityPatterns {
    intent: Regex,
    means: Regex,
    time: Regex,
    distress: Regex,
    denial: Regex,
}

fn severity_patterns() -> Option<&'static SeverityPatterns> {
    static PATTERNS: OnceLock<Option<SeverityPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let build = || -> Result<SeverityPatterns, regex::Error> {
                Ok(SeverityPatterns {
                    intent: Regex::new(
                        r"(?i)\b(i (want|plan|intend) to|mujhe|main)\b.*\b(end my life|khudkushi|kill myself)\b",
                    )?,
                    means: Regex::new(r"(?i)\b(hang|rope|poison|overdose|zeher|phanda|blades?)\b")?,
                    time: Regex::new(r"(?i)\b(tonight|tomorrow|abhi|aaj raat|kal subah)\b")?,
                    distress: Regex::new(
                        r"(?i)\b(i feel (empty|worthless|hopeless|numb)|mujhe (umeed( kam)?|afsurdgi)|main bechain)\b",
                    )?,
                    denial: Regex::new(
                        r"(?i)\b(i (won't|will not) (hurt|harm) myself|nahi karna (apne aap ko|khud ko) nuksan)\b",
                    )?,
                })
            };
            match build() {
                Ok(p) => Some(p),
                Err(err) => {
                    tracing::warn!(error = %err, "severity patterns failed to compile");
                    None
                }
            }
        })
        .as_ref()
}

/// Grade self-harm severity of `text`.
pub fn assess_severity(text: &str) -> SeverityAssessment {
    let mut out = SeverityAssessment {
        level: SeverityLevel::S0,
        cues: Vec::new(),
        intent: false,
        means: None,
        timeframe: None,
    };
    let Some(p) = severity_patterns() else {
        return out;
    };

    out.intent = p.intent.is_match(text);
    out.means = p.means.find(text).map(|m| m.as_str().to_lowercase());
    out.timeframe = p.time.find(text).map(|m| m.as_str().to_lowercase());

    if out.intent {
        out.cues.push("intent");
    }
    if out.means.is_some() {
        out.cues.push("means");
    }
    if out.timeframe.is_some() {
        out.cues.push("timeframe");
    }
    if !out.cues.is_empty() {
        out.level = SeverityLevel::S3;
        return out;
    }

    if p.distress.is_match(text) {
        out.cues.push("distress");
    }
    if p.denial.is_match(text) {
        out.cues.push("denial");
    }
    if !out.cues.is_empty() {
        out.level = SeverityLevel::S2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_category_wins() {
        let d = RiskDetector::new();
        // "kill myself" (self-harm) is checked before "murder" (harm-others).
        let a = d.detect("I could murder someone or kill myself");
        assert_eq!(a.category, Some(RiskCategory::SelfHarm));
        assert_eq!(a.matched_terms, vec!["kill myself"]);
        assert!((a.confidence - HIT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn roman_and_urdu_self_harm() {
        let d = RiskDetector::new();
        assert!(d.detect("main khudkushi ka soch raha hoon").is_self_harm());
        assert!(d.detect("میں اپنی زندگی ختم کرنا چاہتا ہوں").is_self_harm());
        assert!(d.detect("Self-Harm thoughts").is_self_harm());
    }

    #[test]
    fn panic_attack_is_not_self_harm() {
        let a = RiskDetector::new().detect("I had a panic attack");
        // "attack" belongs to harm-others, which is checked first.
        assert_eq!(a.category, Some(RiskCategory::HarmOthers));
        assert!(!a.is_self_harm());
    }

    #[test]
    fn quiet_text_has_no_category() {
        let a = RiskDetector::new().detect("how do I sleep better");
        assert!(!a.is_crisis());
        assert!(a.matched_terms.is_empty());
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn severity_levels() {
        let s3 = assess_severity("I want to end my life tonight");
        assert_eq!(s3.level, SeverityLevel::S3);
        assert_eq!(s3.cues, vec!["intent", "timeframe"]);

        let s2 = assess_severity("I feel empty all the time");
        assert_eq!(s2.level, SeverityLevel::S2);

        let denial = assess_severity("I won't hurt myself, promise");
        assert_eq!(denial.level, SeverityLevel::S2);
        assert_eq!(denial.cues, vec!["denial"]);

        assert_eq!(assess_severity("good morning").level, SeverityLevel::S0);
    }

    #[test]
    fn severity_populates_crisis_signals() {
        let signals = assess_severity("I have a rope and will do it tonight").crisis_signals();
        assert_eq!(signals.means, "rope");
        assert_eq!(signals.timeframe, "tonight");
        assert_eq!(signals.intent, "unknown");
        assert_eq!(signals.location, "unknown");
    }

    #[test]
    fn category_labels() {
        assert_eq!(
            serde_json::to_string(&RiskCategory::AbuseAssault).unwrap(),
            "\"abuse/assault\""
        );
    }
}
