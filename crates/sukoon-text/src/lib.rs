//! Sukoon text primitives
//!
//! Every deterministic component in the workspace (term gates, policy tags,
//! concept expansion, lexical retrieval) agrees on one notion of a "word":
//!
//! - ASCII letters and digits (`[A-Za-z0-9]`), and
//! - any character in the Arabic Unicode block (U+0600–U+06FF), which covers
//!   Urdu script.
//!
//! Everything else is a separator. Keeping this in one crate means a term that
//! matches in the gate also tokenizes identically in the reranker.

pub mod digest;

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// First code point of the Arabic block.
pub const ARABIC_BLOCK_START: char = '\u{0600}';
/// Last code point of the Arabic block.
pub const ARABIC_BLOCK_END: char = '\u{06FF}';

/// True for characters in the Arabic Unicode block (U+0600–U+06FF).
pub fn is_arabic(c: char) -> bool {
    (ARABIC_BLOCK_START..=ARABIC_BLOCK_END).contains(&c)
}

/// True for characters that belong to a token.
pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_arabic(c)
}

/// True when any character of `text` is in the Arabic block.
pub fn has_arabic(text: &str) -> bool {
    text.chars().any(is_arabic)
}

/// Lowercase and split `text` into word tokens.
///
/// ```
/// assert_eq!(
///     sukoon_text::tokenize("PHQ-9, خودکشی!"),
///     vec!["phq", "9", "خودکشی"]
/// );
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !is_word_char(c))
        .filter(|tok| !tok.is_empty())
        .map(String::from)
        .collect()
}

/// Lowercase and drop every non-word character.
///
/// `"PHQ-9"` and `"phq 9"` both normalize to `"phq9"`, which lets phrase-level
/// lookups ignore spacing and punctuation differences.
pub fn normalize_compact(text: &str) -> String {
    text.to_lowercase().chars().filter(|c| is_word_char(*c)).collect()
}

/// Canonical composition (NFC) so Urdu forms typed with combining marks
/// compare equal to their precomposed spellings.
pub fn normalize_input(text: &str) -> String {
    text.nfc().collect()
}

/// Response language. Only English and Urdu are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ur,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ur => "ur",
        }
    }

    /// Parse a language code. Accepts `en`/`ur` plus the common long forms.
    pub fn from_code(code: &str) -> Option<Lang> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "eng" | "english" => Some(Lang::En),
            "ur" | "urd" | "urdu" => Some(Lang::Ur),
            _ => None,
        }
    }

    /// Urdu when the text carries Arabic-block characters, English otherwise.
    pub fn detect(text: &str) -> Lang {
        if has_arabic(text) {
            Lang::Ur
        } else {
            Lang::En
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tokenize_splits_on_non_word_characters() {
        assert_eq!(
            tokenize("I want to hurt-myself, badly!"),
            vec!["i", "want", "to", "hurt", "myself", "badly"]
        );
    }

    #[test]
    fn tokenize_keeps_urdu_script_words() {
        assert_eq!(tokenize("مجھے فوری مدد"), vec!["مجھے", "فوری", "مدد"]);
    }

    #[test]
    fn tokenize_treats_non_ascii_latin_as_separator() {
        // Only [A-Za-z0-9] count on the Latin side.
        assert_eq!(tokenize("café"), vec!["caf"]);
    }

    #[test]
    fn normalize_compact_strips_punctuation_and_spaces() {
        assert_eq!(normalize_compact("PHQ-9"), "phq9");
        assert_eq!(
            normalize_compact("Patient Health Questionnaire"),
            "patienthealthquestionnaire"
        );
    }

    #[test]
    fn lang_detection_follows_script() {
        assert_eq!(Lang::detect("kya haal hai"), Lang::En);
        assert_eq!(Lang::detect("کیا حال ہے"), Lang::Ur);
        assert_eq!(Lang::from_code("UR"), Some(Lang::Ur));
        assert_eq!(Lang::from_code("fr"), None);
    }

    proptest! {
        #[test]
        fn tokens_never_contain_separators(s in "\\PC{0,40}") {
            for tok in tokenize(&s) {
                prop_assert!(!tok.is_empty());
                prop_assert!(tok.chars().all(is_word_char));
            }
        }
    }
}
