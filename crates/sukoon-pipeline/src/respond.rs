//! Answer composition for turns that reach the respond stage without a
//! fixed safety answer.

use sukoon_ckg::EvidenceCandidate;
use sukoon_text::Lang;

pub const LEAD_EN: &str = "Here are a few things that may help:";
pub const LEAD_UR: &str = "یہ چند باتیں مدد کر سکتی ہیں:";

/// Evidence-free reply used when retrieval came back empty.
pub const GENERIC_ANSWER_EN: &str =
    "Here to help. Let’s slow your breathing together—inhale 4, exhale 6, three times.";
pub const GENERIC_ANSWER_UR: &str =
    "میں مدد کے لیے حاضر ہوں۔ آئیے مل کر سانس آہستہ کریں: 4 تک سانس اندر، 6 تک باہر، تین بار۔";

pub fn generic_answer(lang: Lang) -> &'static str {
    match lang {
        Lang::En => GENERIC_ANSWER_EN,
        Lang::Ur => GENERIC_ANSWER_UR,
    }
}

fn lead(lang: Lang) -> &'static str {
    match lang {
        Lang::En => LEAD_EN,
        Lang::Ur => LEAD_UR,
    }
}

/// Lead line plus one `- title: snippet` line per item, or the generic
/// answer when there is no evidence.
pub fn compose_answer(lang: Lang, evidence: &[EvidenceCandidate]) -> String {
    if evidence.is_empty() {
        return generic_answer(lang).to_string();
    }
    let mut out = String::from(lead(lang));
    for item in evidence {
        out.push_str("\n- ");
        out.push_str(item.title.trim());
        let snippet = item.snippet.trim();
        if !snippet.is_empty() {
            out.push_str(": ");
            out.push_str(snippet);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_evidence_gets_generic_answer() {
        assert_eq!(compose_answer(Lang::En, &[]), GENERIC_ANSWER_EN);
        assert_eq!(compose_answer(Lang::Ur, &[]), GENERIC_ANSWER_UR);
    }

    #[test]
    fn evidence_lines_follow_lead() {
        let ev = vec![
            EvidenceCandidate::new("a", "Box breathing", "In 4, hold 4, out 6.", "seed", 1.0),
            EvidenceCandidate::new("b", "Walk", "", "seed", 0.5),
        ];
        let answer = compose_answer(Lang::En, &ev);
        let lines: Vec<&str> = answer.lines().collect();
        assert_eq!(lines[0], LEAD_EN);
        assert_eq!(lines[1], "- Box breathing: In 4, hold 4, out 6.");
        assert_eq!(lines[2], "- Walk");
    }
}
