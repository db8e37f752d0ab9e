//! Route classifier (term gate).
//!
//! Coarse three-way routing that runs before anything else touches the text.
//! The checks form a fixed precedence chain; each one only runs when every
//! earlier check missed:
//!
//! ```text
//!   empty ──────────────────────────────► assist
//!   crisis terms / inline phrases ──────► crisis   (matched terms, max 5)
//!   brand / meta allowlist ─────────────► assist   neutral-allowlist
//!   wellness phrases / terms ───────────► assist   wellness-allowlist
//!   roman-urdu wellness (no urdu script)► assist   wellness-allowlist-roman
//!   finance context AND tip intent ─────► abstain  finance-tip
//!   otherwise ──────────────────────────► assist
//! ```
//!
//! Crisis must dominate every later rule, including the brand allowlist.

use crate::term_match::TermList;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use sukoon_text::{has_arabic, is_word_char, tokenize};

/// Cap on `matched_terms` for crisis and finance decisions.
pub const MAX_MATCHED_TERMS: usize = 5;

/// Self-harm intent phrases (Urdu script and English), matched as substrings.
pub const CRISIS_INLINE: &[&str] = &[
    "مجھے فوری مدد",
    "مجھے فوری مدد کی ضرورت",
    "خودکشی",
    "جان لینے",
    "مرنا چاہتا",
    "نقصان پہنچانا",
    "suicide",
    "kill myself",
    "end my life",
    "self harm",
    "hurt myself",
    "emergency help",
    "need urgent help",
];

/// Brand and meta questions that should always reach the assistant.
pub const NEUTRAL_ALLOWLIST: &[&str] = &[
    "what is sukoonai",
    "sukoonai",
    "who are you",
    "about you",
    "about sukoonai",
    "privacy",
    "status",
];

/// Named wellness exercises.
pub const WELLNESS_INLINE: &[&str] = &[
    "grounding exercise",
    "breathing exercise",
    "box breathing",
    "mindfulness exercise",
    "relaxation exercise",
    "progressive muscle relaxation",
    "pmr",
];

/// Broader wellness vocabulary, including Urdu script.
pub const WELLNESS_TERMS: &[&str] = &[
    "grounding",
    "grounding exercise",
    "breathing",
    "box breathing",
    "mindfulness",
    "meditation",
    "anxiety",
    "panic",
    "relax",
    "سانس",
    "گراؤنڈنگ",
    "مدیتیشن",
    "پرسکون",
    "ریلیکس",
];

/// Roman-Urdu wellness tokens. Only consulted when no Urdu script is present.
pub const ROMAN_WELLNESS: &[&str] = &[
    "saans",
    "gehri saans",
    "saans ki",
    "mashq",
    "ghabrahat",
    "bechaini",
    "sakoon",
    "sukoon",
    "tawajjo",
    "tawajjoh",
    "tawajju",
    "5-4-3-2-1",
    "54321",
];

/// Market vocabulary. Matched as substrings that begin a word, so inflected
/// forms (`cryptocurrency`, `dividends`) count while short tickers like `eth`
/// do not fire inside ordinary words (`something`).
pub const FINANCE_INLINE: &[&str] = &[
    "stock",
    "stocks",
    "price target",
    "buy",
    "sell",
    "crypto",
    "ticker",
    "return",
    "yield",
    "forex",
    "investment",
    "trading",
    "day trade",
    "bitcoin",
    "eth",
    "bond",
    "mutual fund",
    "portfolio",
    "roi",
    "dividend",
    "nifty",
    "s&p",
    "nasdaq",
    "kse",
    "psx",
    "option",
    "options",
    "futures",
];

/// Phrases signalling that the user wants a tip or prediction.
pub const TIP_LIKE: &[&str] = &[
    "which",
    "should i",
    "recommend",
    "prediction",
    "target",
    "price",
    "buy now",
    "sell now",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Crisis,
    Assist,
    Abstain,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Crisis => "crisis",
            Route::Assist => "assist",
            Route::Abstain => "abstain",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crisis" => Ok(Route::Crisis),
            "assist" => Ok(Route::Assist),
            "abstain" => Ok(Route::Abstain),
            other => Err(format!("unknown route: {other}")),
        }
    }
}

/// Why a route was chosen when it was not the plain default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteReason {
    NeutralAllowlist,
    WellnessAllowlist,
    WellnessAllowlistRoman,
    FinanceTip,
    /// Escalated by the regex risk detector after the term gate missed.
    RiskDetector,
    /// Overridden by the safety node (refusal or crisis flow).
    SafetyNode,
    /// Supplied by the caller; the term gate was not run.
    Predecided,
}

impl RouteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteReason::NeutralAllowlist => "neutral-allowlist",
            RouteReason::WellnessAllowlist => "wellness-allowlist",
            RouteReason::WellnessAllowlistRoman => "wellness-allowlist-roman",
            RouteReason::FinanceTip => "finance-tip",
            RouteReason::RiskDetector => "risk-detector",
            RouteReason::SafetyNode => "safety-node",
            RouteReason::Predecided => "predecided",
        }
    }

    /// Brand and wellness allowlist hits. These turns are in scope no matter
    /// what the topic gate says.
    pub fn is_allowlist(self) -> bool {
        matches!(
            self,
            RouteReason::NeutralAllowlist
                | RouteReason::WellnessAllowlist
                | RouteReason::WellnessAllowlistRoman
        )
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub route: Route,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RouteReason>,
    pub matched_terms: Vec<String>,
}

impl RouteDecision {
    pub fn assist() -> Self {
        Self {
            route: Route::Assist,
            reason: None,
            matched_terms: Vec::new(),
        }
    }

    fn assist_because(reason: RouteReason) -> Self {
        Self {
            route: Route::Assist,
            reason: Some(reason),
            matched_terms: Vec::new(),
        }
    }

    /// A caller-supplied route; no matching was performed.
    pub fn predecided(route: Route) -> Self {
        Self {
            route,
            reason: Some(RouteReason::Predecided),
            matched_terms: Vec::new(),
        }
    }

    pub fn is_crisis(&self) -> bool {
        self.route == Route::Crisis
    }
}

/// Term gate over the configured crisis and finance-abstain lists.
#[derive(Debug, Clone)]
pub struct TermGate {
    crisis: TermList,
    finance: TermList,
}

impl Default for TermGate {
    fn default() -> Self {
        Self::new(TermList::empty("crisis"), TermList::empty("finance"))
    }
}

impl TermGate {
    pub fn new(crisis: TermList, finance: TermList) -> Self {
        Self { crisis, finance }
    }

    pub fn crisis_terms(&self) -> &TermList {
        &self.crisis
    }

    pub fn finance_terms(&self) -> &TermList {
        &self.finance
    }

    /// Classify `text`. Total: every input, including empty text, gets a route.
    pub fn detect_route(&self, text: &str) -> RouteDecision {
        let low = text.to_lowercase();
        let low = low.trim();
        if low.is_empty() {
            return RouteDecision::assist();
        }
        let tokens = tokenize(low);

        // Crisis: configured terms first, then inline phrases.
        let mut crisis_hits = self.crisis.matches_tokens(&tokens);
        crisis_hits.extend(
            CRISIS_INLINE
                .iter()
                .filter(|kw| low.contains(*kw))
                .map(|kw| kw.to_string()),
        );
        if !crisis_hits.is_empty() {
            crisis_hits.truncate(MAX_MATCHED_TERMS);
            tracing::debug!(matched = ?crisis_hits, "term gate: crisis");
            return RouteDecision {
                route: Route::Crisis,
                reason: None,
                matched_terms: crisis_hits,
            };
        }

        if contains_any(low, NEUTRAL_ALLOWLIST) {
            return RouteDecision::assist_because(RouteReason::NeutralAllowlist);
        }

        if contains_any(low, WELLNESS_INLINE) || contains_any(low, WELLNESS_TERMS) {
            return RouteDecision::assist_because(RouteReason::WellnessAllowlist);
        }

        if contains_any(low, ROMAN_WELLNESS) && !has_arabic(text) {
            return RouteDecision::assist_because(RouteReason::WellnessAllowlistRoman);
        }

        let finance_hits = self.finance.matches_tokens(&tokens);
        let finance_context = !finance_hits.is_empty()
            || FINANCE_INLINE
                .iter()
                .any(|term| contains_at_word_start(low, term));
        let tip_intent = contains_any(low, TIP_LIKE);
        if finance_context && tip_intent {
            let mut matched = finance_hits;
            matched.truncate(MAX_MATCHED_TERMS);
            tracing::debug!(matched = ?matched, "term gate: finance abstain");
            return RouteDecision {
                route: Route::Abstain,
                reason: Some(RouteReason::FinanceTip),
                matched_terms: matched,
            };
        }

        RouteDecision::assist()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// True when `needle` occurs in `haystack` at a position not preceded by a
/// word character.
fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> TermGate {
        TermGate::new(
            TermList::new("crisis", ["want die", "end it all"]),
            TermList::new("finance", ["penny stock", "price target"]),
        )
    }

    #[test]
    fn empty_and_whitespace_are_assist() {
        assert_eq!(gate().detect_route(""), RouteDecision::assist());
        assert_eq!(gate().detect_route("   \n\t"), RouteDecision::assist());
    }

    #[test]
    fn empty_term_lists_do_not_match_everything() {
        let d = TermGate::default().detect_route("hello there");
        assert_eq!(d, RouteDecision::assist());
    }

    #[test]
    fn urdu_suicide_is_crisis() {
        let d = gate().detect_route("خودکشی");
        assert_eq!(d.route, Route::Crisis);
        assert_eq!(d.matched_terms, vec!["خودکشی"]);
    }

    #[test]
    fn configured_crisis_terms_match_out_of_order_gaps() {
        let d = gate().detect_route("I want to just die");
        assert_eq!(d.route, Route::Crisis);
        assert_eq!(d.matched_terms, vec!["want die"]);
    }

    #[test]
    fn crisis_beats_brand_allowlist() {
        let d = gate().detect_route("Tell me about SukoonAI, I want to kill myself");
        assert_eq!(d.route, Route::Crisis);
    }

    #[test]
    fn crisis_beats_finance_tip() {
        let d = gate().detect_route("which stock should i buy now before I end my life");
        assert_eq!(d.route, Route::Crisis);
        assert_eq!(d.reason, None);
    }

    #[test]
    fn crisis_matches_capped_at_five() {
        let text = "suicide kill myself end my life self harm hurt myself emergency help";
        let d = gate().detect_route(text);
        assert_eq!(d.matched_terms.len(), MAX_MATCHED_TERMS);
    }

    #[test]
    fn brand_questions_are_neutral() {
        let d = gate().detect_route("Who are you?");
        assert_eq!(d.reason, Some(RouteReason::NeutralAllowlist));
        assert_eq!(d.route, Route::Assist);
    }

    #[test]
    fn grounding_exercise_is_wellness() {
        let d = gate().detect_route("grounding exercise");
        assert_eq!(d.route, Route::Assist);
        assert_eq!(d.reason, Some(RouteReason::WellnessAllowlist));
        assert!(d.matched_terms.is_empty());
    }

    #[test]
    fn urdu_wellness_term_is_wellness() {
        let d = gate().detect_route("مجھے سانس کی مشق بتائیں");
        assert_eq!(d.reason, Some(RouteReason::WellnessAllowlist));
    }

    #[test]
    fn roman_wellness_needs_latin_only_text() {
        let d = gate().detect_route("mujhe ghabrahat ho rahi hai");
        assert_eq!(d.reason, Some(RouteReason::WellnessAllowlistRoman));

        let mixed = gate().detect_route("ghabrahat ہے");
        assert_eq!(mixed, RouteDecision::assist());
    }

    #[test]
    fn roman_wellness_beats_english_finance_tip() {
        // Both a Roman-Urdu wellness token and a finance tip request are
        // present; the wellness layer runs first.
        let d = gate().detect_route("bechaini hai, which stock should i buy now");
        assert_eq!(d.route, Route::Assist);
        assert_eq!(d.reason, Some(RouteReason::WellnessAllowlistRoman));
    }

    #[test]
    fn urdu_script_disables_roman_wellness_so_finance_applies() {
        let d = gate().detect_route("bechaini ہے، which stock should i buy now");
        assert_eq!(d.route, Route::Abstain);
        assert_eq!(d.reason, Some(RouteReason::FinanceTip));
    }

    #[test]
    fn finance_tip_needs_both_signals() {
        let d = gate().detect_route("which stock should i buy now");
        assert_eq!(d.route, Route::Abstain);
        assert_eq!(d.reason, Some(RouteReason::FinanceTip));

        assert_eq!(gate().detect_route("I own a stock").route, Route::Assist);
        assert_eq!(gate().detect_route("which way to the park").route, Route::Assist);
    }

    #[test]
    fn finance_matched_terms_come_from_configured_list() {
        let d = gate().detect_route("what is the price target for this penny stock");
        assert_eq!(d.route, Route::Abstain);
        assert_eq!(d.matched_terms, vec!["penny stock", "price target"]);
    }

    #[test]
    fn finance_tickers_do_not_fire_inside_words() {
        // "eth" inside "something" is not a finance signal.
        assert_eq!(
            gate().detect_route("which is something I should do").route,
            Route::Assist
        );
    }

    #[test]
    fn inflected_finance_words_still_count() {
        for text in [
            "which cryptocurrency is best",
            "should i invest in dividends",
            "which investments should i make",
            "which stocks should i buy",
        ] {
            let d = gate().detect_route(text);
            assert_eq!(d.route, Route::Abstain, "{text}");
            assert_eq!(d.reason, Some(RouteReason::FinanceTip), "{text}");
        }
    }

    #[test]
    fn word_start_matching() {
        assert!(contains_at_word_start("which cryptocurrency", "crypto"));
        assert!(contains_at_word_start("s&p 500?", "s&p"));
        assert!(!contains_at_word_start("a method", "eth"));
        assert!(!contains_at_word_start("", "eth"));
    }

    #[test]
    fn only_gate_allowlists_count_as_allowlist() {
        assert!(RouteReason::NeutralAllowlist.is_allowlist());
        assert!(RouteReason::WellnessAllowlistRoman.is_allowlist());
        assert!(!RouteReason::FinanceTip.is_allowlist());
        assert!(!RouteReason::Predecided.is_allowlist());
    }

    #[test]
    fn route_round_trips_through_strings() {
        assert_eq!("CRISIS".parse::<Route>().unwrap(), Route::Crisis);
        assert!("maybe".parse::<Route>().is_err());
        assert_eq!(
            serde_json::to_string(&RouteReason::WellnessAllowlistRoman).unwrap(),
            "\"wellness-allowlist-roman\""
        );
    }
}
