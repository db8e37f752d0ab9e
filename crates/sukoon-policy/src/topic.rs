//! Cheap deterministic topic gate.
//!
//! Maps text to anxiety / depression / other. Errs on `Other` when unsure;
//! `Other` is what makes the policy tagger emit `scope.out_of_scope`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Anxiety,
    Depression,
    Other,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Anxiety => "anxiety",
            Topic::Depression => "depression",
            Topic::Other => "other",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anxiety" => Ok(Topic::Anxiety),
            "depression" => Ok(Topic::Depression),
            "other" => Ok(Topic::Other),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

const ANXIETY_PATTERNS: &[&str] = &[
    r"\banx(ious|iety)?\b",
    r"\bpani(c|ky)\b",
    r"\bworry(ing)?\b",
    r"\bstress(ed)?\b",
    r"\bfikar\b",
    r"\bdar\b",
];

const DEPRESSION_PATTERNS: &[&str] = &[
    r"\bdepress(ion|ed)?\b",
    r"\blow mood\b",
    r"\bhopeless\b",
    r"\bgham\b",
    r"\budaas(i)?\b",
];

// Substring cues for the second pass. Depression is checked first.
const DEPRESSION_CUES: &[&str] = &[
    "depress",
    "sad",
    "low mood",
    "hopeless",
    "unmotivated",
    "anhedonia",
    "افسردگی",
    "مایوسی",
    "دل اداس",
    "حوصلہ نہیں",
];

const ANXIETY_CUES: &[&str] = &[
    "anxiety",
    "worry",
    "worried",
    "restless",
    "panic",
    "grounding",
    "5-4-3-2-1",
    "54321",
    "breath",
    "breathe",
    "breathing",
    "سانس",
    "گراؤنڈ",
    "گراؤنڈنگ",
    "پریشانی",
    "گھبراہٹ",
];

struct TopicPatterns {
    anxiety: Vec<Regex>,
    depression: Vec<Regex>,
}

fn patterns() -> &'static TopicPatterns {
    static PATTERNS: OnceLock<TopicPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TopicPatterns {
        anxiety: compile_all(ANXIETY_PATTERNS),
        depression: compile_all(DEPRESSION_PATTERNS),
    })
}

fn compile_all(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|src| match Regex::new(src) {
            Ok(rx) => Some(rx),
            Err(err) => {
                tracing::warn!(pattern = %src, error = %err, "skipping invalid topic pattern");
                None
            }
        })
        .collect()
}

/// Classify the topic of `text`.
pub fn classify_topic(text: &str) -> Topic {
    let t = text.to_lowercase();
    let p = patterns();

    if p.anxiety.iter().any(|rx| rx.is_match(&t)) {
        return Topic::Anxiety;
    }
    if p.depression.iter().any(|rx| rx.is_match(&t)) {
        return Topic::Depression;
    }

    if DEPRESSION_CUES.iter().any(|c| t.contains(c)) {
        return Topic::Depression;
    }
    if ANXIETY_CUES.iter().any(|c| t.contains(c)) {
        return Topic::Anxiety;
    }
    Topic::Other
}
