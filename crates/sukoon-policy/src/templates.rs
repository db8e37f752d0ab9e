//! Localized refusal templates.
//!
//! File layout (YAML), optionally wrapped in a top-level `templates:` key:
//!
//! ```yaml
//! medical:
//!   medication:
//!     en: "I can’t advise on medicines or doses."
//!     ur: "..."
//!     whatsapp_followup_en: "I can send a clinic list to your WhatsApp."
//! ```
//!
//! Resolution never fails. On a miss it walks:
//! section → `generic`; key → `generic` → `fallback` → first key in section;
//! language → `en` → first text in the entry; and finally the hardcoded
//! [`DEFAULT_REFUSAL_EN`] / [`DEFAULT_REFUSAL_UR`].

use crate::error::{read_config, PolicyError, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::path::Path;
use sukoon_text::Lang;

pub const DEFAULT_REFUSAL_EN: &str =
    "I can’t answer that safely. I focus on anxiety and depression self-help and referrals.";
pub const DEFAULT_REFUSAL_UR: &str = "میں اس کا محفوظ جواب نہیں دے سکتا/سکتی۔ میرا دائرہ کار اضطراب اور افسردگی کی خود مدد اور ریفرلز تک محدود ہے۔";

const GENERIC: &str = "generic";
const FALLBACK: &str = "fallback";
const FOLLOWUP_PREFIX: &str = "whatsapp_followup_";

/// The hardcoded refusal for a language code (`ur` or anything else → `en`).
pub fn default_refusal(lang: &str) -> &'static str {
    match Lang::from_code(lang) {
        Some(Lang::Ur) => DEFAULT_REFUSAL_UR,
        _ => DEFAULT_REFUSAL_EN,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TemplateEntry {
    /// `(lang, text)` in document order.
    texts: Vec<(String, String)>,
    /// `(lang, follow-up)` in document order.
    followups: Vec<(String, String)>,
}

impl TemplateEntry {
    fn text_for(&self, lang: &str) -> Option<(&str, &str)> {
        let lookup = |l: &str| {
            self.texts
                .iter()
                .find(|(k, v)| k == l && !v.trim().is_empty())
                .map(|(k, v)| (k.as_str(), v.as_str()))
        };
        lookup(lang).or_else(|| lookup("en")).or_else(|| {
            self.texts
                .iter()
                .find(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k.as_str(), v.as_str()))
        })
    }

    fn followup_for(&self, lang: &str) -> Option<&str> {
        let lookup = |l: &str| {
            self.followups
                .iter()
                .find(|(k, v)| k == l && !v.trim().is_empty())
                .map(|(_, v)| v.as_str())
        };
        lookup(lang).or_else(|| lookup("en"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TemplateSection {
    name: String,
    entries: Vec<(String, TemplateEntry)>,
}

impl TemplateSection {
    fn entry(&self, key: &str) -> Option<(&str, &TemplateEntry)> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(k, e)| (k.as_str(), e))
    }

    fn entry_with_fallback(&self, key: &str) -> Option<(&str, &TemplateEntry)> {
        self.entry(key)
            .or_else(|| self.entry(GENERIC))
            .or_else(|| self.entry(FALLBACK))
            .or_else(|| self.entries.first().map(|(k, e)| (k.as_str(), e)))
    }
}

/// A template after fallback resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTemplate {
    pub section: String,
    pub key: String,
    pub lang: String,
    pub text: String,
    pub followup: Option<String>,
}

impl ResolvedTemplate {
    /// Text with the follow-up line appended when present.
    pub fn render(&self, with_followup: bool) -> String {
        match (&self.followup, with_followup) {
            (Some(f), true) => format!("{} {}", self.text.trim_end(), f.trim()),
            _ => self.text.clone(),
        }
    }
}

/// Static refusal templates keyed by `(section, key, lang)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefusalTemplates {
    sections: Vec<TemplateSection>,
}

impl RefusalTemplates {
    /// No templates: every lookup renders the hardcoded default.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty());
        }
        let root: Value = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
        let root = match root.get("templates") {
            Some(inner) => inner.clone(),
            None => root,
        };
        let mapping = root
            .as_mapping()
            .ok_or_else(|| "refusal templates must be a mapping".to_string())?;

        let mut sections = Vec::new();
        for (name, body) in mapping {
            let Some(name) = name.as_str() else { continue };
            let Some(body) = body.as_mapping() else {
                tracing::warn!(section = %name, "ignoring non-mapping template section");
                continue;
            };
            let mut entries = Vec::new();
            for (key, entry) in body {
                let (Some(key), Some(entry)) = (key.as_str(), entry.as_mapping()) else {
                    continue;
                };
                let mut parsed = TemplateEntry::default();
                for (field, text) in entry {
                    let (Some(field), Some(text)) = (field.as_str(), text.as_str()) else {
                        continue;
                    };
                    match field.strip_prefix(FOLLOWUP_PREFIX) {
                        Some(lang) => parsed.followups.push((lang.to_string(), text.to_string())),
                        None => parsed.texts.push((field.to_string(), text.to_string())),
                    }
                }
                entries.push((key.to_string(), parsed));
            }
            sections.push(TemplateSection {
                name: name.to_string(),
                entries,
            });
        }
        Ok(Self { sections })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = read_config(path)?;
        Self::from_yaml_str(&text).map_err(|e| PolicyError::malformed(path, e))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn section(&self, name: &str) -> Option<&TemplateSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Resolve `(section, key, lang)` through the fallback chain. `None` means
    /// nothing usable was configured and the hardcoded default applies.
    pub fn resolve(&self, section: &str, key: &str, lang: &str) -> Option<ResolvedTemplate> {
        let sect = self.section(section).or_else(|| self.section(GENERIC))?;
        let (key, entry) = sect.entry_with_fallback(key)?;
        let (lang_found, text) = entry.text_for(lang)?;
        Some(ResolvedTemplate {
            section: sect.name.clone(),
            key: key.to_string(),
            lang: lang_found.to_string(),
            text: text.to_string(),
            followup: entry.followup_for(lang).map(str::to_string),
        })
    }

    /// Resolve a dotted `section.key`. A bare key resolves as `generic.generic`.
    pub fn resolve_key(&self, template_key: &str, lang: &str) -> Option<ResolvedTemplate> {
        let (section, key) = split_template_key(template_key);
        self.resolve(section, key, lang)
    }

    /// Render a dotted template key, falling back to the default refusal.
    pub fn render(&self, template_key: &str, lang: &str, with_followup: bool) -> String {
        match self.resolve_key(template_key, lang) {
            Some(t) => t.render(with_followup),
            None => default_refusal(lang).to_string(),
        }
    }
}

/// Split `section.key`; bare keys map to `generic.generic`.
pub fn split_template_key(template_key: &str) -> (&str, &str) {
    match template_key.split_once('.') {
        Some((section, key)) => (section, key),
        None => (GENERIC, GENERIC),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
templates:
  medical:
    medication:
      en: "I can’t advise on medicines or doses."
      ur: "میں ادویات یا خوراک کے بارے میں مشورہ نہیں دے سکتا/سکتی۔"
      whatsapp_followup_en: "I can send verified clinic contacts to your WhatsApp."
    diagnosis:
      en: "I can’t diagnose conditions."
  scope:
    out_of_scope:
      en: "That is outside what I can help with."
      ur: "یہ میرے دائرہ کار سے باہر ہے۔"
  generic:
    generic:
      en: "I can’t help with that request."
      ur: "میں اس درخواست میں مدد نہیں کر سکتا/سکتی۔"
  empty_section: {}
  only_first:
    zeta:
      ur: "صرف اردو"
"#;

    fn templates() -> RefusalTemplates {
        RefusalTemplates::from_yaml_str(YAML).unwrap()
    }

    #[test]
    fn exact_lookup() {
        let t = templates().resolve("medical", "medication", "ur").unwrap();
        assert_eq!(t.lang, "ur");
        assert!(t.text.contains("ادویات"));
        // Urdu follow-up missing → English follow-up.
        assert_eq!(
            t.followup.as_deref(),
            Some("I can send verified clinic contacts to your WhatsApp.")
        );
    }

    #[test]
    fn unknown_section_key_and_lang_resolve_to_generic_english() {
        let t = templates().resolve("foo", "bar", "fr").unwrap();
        assert_eq!((t.section.as_str(), t.key.as_str(), t.lang.as_str()), ("generic", "generic", "en"));
    }

    #[test]
    fn missing_language_falls_back_to_english() {
        let t = templates().resolve("medical", "diagnosis", "ur").unwrap();
        assert_eq!(t.lang, "en");
        assert_eq!(t.text, "I can’t diagnose conditions.");
    }

    #[test]
    fn missing_key_takes_first_in_section_then_first_language() {
        let t = templates().resolve("only_first", "nope", "en").unwrap();
        assert_eq!(t.key, "zeta");
        assert_eq!(t.lang, "ur");
    }

    #[test]
    fn empty_section_resolves_to_nothing() {
        assert!(templates().resolve("empty_section", "x", "en").is_none());
        assert_eq!(templates().render("empty_section.x", "ur", true), DEFAULT_REFUSAL_UR);
    }

    #[test]
    fn bare_key_is_generic() {
        assert_eq!(split_template_key("out_of_scope"), ("generic", "generic"));
        assert_eq!(
            templates().render("out_of_scope", "en", false),
            "I can’t help with that request."
        );
    }

    #[test]
    fn render_appends_followup() {
        assert_eq!(
            templates().render("medical.medication", "en", true),
            "I can’t advise on medicines or doses. I can send verified clinic contacts to your WhatsApp."
        );
    }

    #[test]
    fn empty_templates_use_default() {
        let t = RefusalTemplates::empty();
        assert_eq!(t.render("foo.bar", "fr", true), DEFAULT_REFUSAL_EN);
        assert_eq!(t.render("scope.out_of_scope", "ur", true), DEFAULT_REFUSAL_UR);
    }

    #[test]
    fn flat_root_without_templates_key_is_accepted() {
        let t = RefusalTemplates::from_yaml_str("legal:\n  generic:\n    en: no legal advice\n").unwrap();
        assert_eq!(t.render("legal.generic", "en", false), "no legal advice");
    }

    #[test]
    fn non_mapping_root_is_malformed() {
        assert!(RefusalTemplates::from_yaml_str("- a\n- b\n").is_err());
    }
}
