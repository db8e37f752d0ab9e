//! Policy tag inference.
//!
//! A second deterministic tagger, independent of the route classifier. The
//! safety node selects refusal templates by tag, so this needs finer labels
//! (medication vs diagnosis) than the three-way route does.

use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyTag {
    #[serde(rename = "crisis.self_harm")]
    CrisisSelfHarm,
    #[serde(rename = "crisis.harm_to_others")]
    CrisisHarmToOthers,
    #[serde(rename = "clinical.ask_diagnosis")]
    ClinicalAskDiagnosis,
    #[serde(rename = "clinical.ask_medication")]
    ClinicalAskMedication,
    #[serde(rename = "legal.request")]
    LegalRequest,
    #[serde(rename = "scope.out_of_scope")]
    ScopeOutOfScope,
}

impl PolicyTag {
    pub const ALL: [PolicyTag; 6] = [
        PolicyTag::CrisisSelfHarm,
        PolicyTag::CrisisHarmToOthers,
        PolicyTag::ClinicalAskDiagnosis,
        PolicyTag::ClinicalAskMedication,
        PolicyTag::LegalRequest,
        PolicyTag::ScopeOutOfScope,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyTag::CrisisSelfHarm => "crisis.self_harm",
            PolicyTag::CrisisHarmToOthers => "crisis.harm_to_others",
            PolicyTag::ClinicalAskDiagnosis => "clinical.ask_diagnosis",
            PolicyTag::ClinicalAskMedication => "clinical.ask_medication",
            PolicyTag::LegalRequest => "legal.request",
            PolicyTag::ScopeOutOfScope => "scope.out_of_scope",
        }
    }

    pub fn is_crisis(self) -> bool {
        matches!(self, PolicyTag::CrisisSelfHarm | PolicyTag::CrisisHarmToOthers)
    }
}

impl fmt::Display for PolicyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyTag::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown policy tag: {s}"))
    }
}

/// Ordered set of tags; insertion keeps the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTagSet(Vec<PolicyTag>);

impl PolicyTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `tag` was already present.
    pub fn insert(&mut self, tag: PolicyTag) -> bool {
        if self.0.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: PolicyTag) -> bool {
        self.0.contains(&tag)
    }

    /// Returns false when `tag` was not present.
    pub fn remove(&mut self, tag: PolicyTag) -> bool {
        let before = self.0.len();
        self.0.retain(|t| *t != tag);
        self.0.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = PolicyTag> + '_ {
        self.0.iter().copied()
    }

    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl FromIterator<PolicyTag> for PolicyTagSet {
    fn from_iter<I: IntoIterator<Item = PolicyTag>>(iter: I) -> Self {
        let mut set = PolicyTagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

const EN_SELF_HARM: &[&str] = &[
    "hurt myself",
    "hurting myself",
    "kill myself",
    "suicide",
    "self-harm",
];
const UR_SELF_HARM: &[&str] = &[
    "خودکشی",
    "خود کشی",
    "اپنے آپ کو نقصان",
    "خود کو نقصان",
    "خود کو مار",
    "جان لینا",
];
const EN_OTHER_HARM: &[&str] = &["harm someone", "harming someone"];
const UR_OTHER_HARM: &[&str] = &["کسی کو نقصان", "جان سے مار", "قتل", "تشدد کرنا"];

const UR_DIAGNOSIS: &[&str] = &["تشخیص", "علامات کی بنیاد پر تشخیص", "تشخیص کریں"];
const EN_DIAGNOSIS_QUESTIONS: &[&str] = &[
    "do i have depression",
    "do i have anxiety",
    "am i depressed",
    "am i anxious",
    "tell me if i have depression",
    "tell me if i have anxiety",
];
const UR_QUESTION: &str = "کیا";
const UR_DEPRESSION: &str = "افسردگی";
const UR_ANXIETY: &str = "اضطراب";

const EN_MEDICATION: &[&str] = &["medicine", "medication", "dose", "dosing"];
const UR_MEDICATION: &[&str] = &["دوائی", "دوائ", "ادویات", "دوا", "خوراک"];

const UR_LEGAL: &[&str] = &["قانونی"];
const UR_OUT_OF_SCOPE: &str = "دائرہ کار";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Derive policy tags for one `(text, topic)` pair. Each rule is checked
/// independently, so a message can carry several tags.
pub fn infer_tags(text: &str, topic: Topic) -> PolicyTagSet {
    let t = text.to_lowercase();
    let mut tags = PolicyTagSet::new();

    if contains_any(&t, EN_SELF_HARM) || contains_any(&t, UR_SELF_HARM) {
        tags.insert(PolicyTag::CrisisSelfHarm);
    }
    if contains_any(&t, EN_OTHER_HARM) || contains_any(&t, UR_OTHER_HARM) {
        tags.insert(PolicyTag::CrisisHarmToOthers);
    }

    let ur_diagnosis_question =
        t.contains(UR_QUESTION) && (t.contains(UR_DEPRESSION) || t.contains(UR_ANXIETY));
    if t.contains("diagnos")
        || contains_any(&t, UR_DIAGNOSIS)
        || contains_any(&t, EN_DIAGNOSIS_QUESTIONS)
        || ur_diagnosis_question
    {
        tags.insert(PolicyTag::ClinicalAskDiagnosis);
    }

    if contains_any(&t, EN_MEDICATION) || contains_any(&t, UR_MEDICATION) {
        tags.insert(PolicyTag::ClinicalAskMedication);
    }

    if t.contains("legal") || contains_any(&t, UR_LEGAL) {
        tags.insert(PolicyTag::LegalRequest);
    }

    if topic == Topic::Other || t.contains("outside") || t.contains(UR_OUT_OF_SCOPE) {
        tags.insert(PolicyTag::ScopeOutOfScope);
    }

    tags
}
