//! Layered configuration and hot reload.
//!
//! `ConfigSources` is an ordered list of directories. For every named file
//! the first directory that contains it wins, so a deployment directory can
//! override a handful of files and inherit the rest from the shipped
//! defaults.
//!
//! Loading never fails. A missing or malformed file is logged and replaced
//! by its documented default:
//!
//! | file                                  | default                         |
//! |---------------------------------------|---------------------------------|
//! | `policies/crisis_terms.yaml`          | empty term list                 |
//! | `policies/abstain_finance_terms.yaml` | empty term list                 |
//! | `policies/refusals_ur_en.yaml`        | none (hardcoded refusal)        |
//! | `policies/policy_map.yaml`            | built-in rule table             |
//! | `policies/crisis_flow.json`           | built-in schema, 5 s deadline   |
//! | `ckg.yaml`                            | concept expansion off (`λ = 0`) |
//! | `retrieval.yaml`                      | `RetrievalConfig::default()`    |
//! | `kb.json`                             | seed knowledge base             |

use crate::retrieval::{parse_knowledge_base, seed_knowledge_base, KbItem, LexicalRetriever, RetrievalConfig};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sukoon_ckg::ConceptTable;
use sukoon_policy::{
    CrisisFlowConfig, PolicyMap, RefusalTemplates, RiskDetector, SafetyNode, TermGate, TermList,
};
use sukoon_text::digest::Fnv1a64;

pub const CRISIS_TERMS_FILE: &str = "policies/crisis_terms.yaml";
pub const FINANCE_TERMS_FILE: &str = "policies/abstain_finance_terms.yaml";
pub const REFUSALS_FILE: &str = "policies/refusals_ur_en.yaml";
pub const POLICY_MAP_FILE: &str = "policies/policy_map.yaml";
pub const CRISIS_FLOW_FILE: &str = "policies/crisis_flow.json";
pub const CKG_FILE: &str = "ckg.yaml";
pub const RETRIEVAL_FILE: &str = "retrieval.yaml";
pub const KB_FILE: &str = "kb.json";

/// Ordered config directories; earlier entries take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    dirs: Vec<PathBuf>,
}

impl ConfigSources {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a lower-precedence directory.
    pub fn push(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First existing `dir/name`.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|d| d.join(name))
            .find(|p| p.is_file())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Loaded { path: PathBuf },
    Missing,
    Fallback { path: PathBuf, error: String },
}

/// Where one config file came from, for `sukoon config` and audit logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub name: &'static str,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Immutable config snapshot shared by every in-flight turn.
#[derive(Debug, Clone)]
pub struct SukoonConfig {
    pub gate: TermGate,
    pub safety: SafetyNode,
    pub risk: RiskDetector,
    pub concepts: ConceptTable,
    pub retrieval: RetrievalConfig,
    pub knowledge_base: Arc<LexicalRetriever>,
    /// FNV-1a digest over every file that was actually loaded.
    pub digest: String,
    pub files: Vec<FileReport>,
}

impl Default for SukoonConfig {
    fn default() -> Self {
        Self::load(&ConfigSources::default())
    }
}

struct Loader<'a> {
    sources: &'a ConfigSources,
    hasher: Fnv1a64,
    files: Vec<FileReport>,
}

impl Loader<'_> {
    /// Resolve, read and parse one file, falling back to `default` on any
    /// problem.
    fn layer<T>(
        &mut self,
        name: &'static str,
        parse: impl FnOnce(&str, &Path) -> Result<T, String>,
        default: impl FnOnce() -> T,
    ) -> T {
        let Some(path) = self.sources.resolve(name) else {
            tracing::warn!(file = name, "config file not found, using default");
            self.files.push(FileReport {
                name,
                status: FileStatus::Missing,
            });
            return default();
        };

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse(&text, &path).map(|v| (v, text)));

        match parsed {
            Ok((value, text)) => {
                self.hasher.update_section(name, text.as_bytes());
                tracing::debug!(file = name, path = %path.display(), "loaded config file");
                self.files.push(FileReport {
                    name,
                    status: FileStatus::Loaded { path },
                });
                value
            }
            Err(error) => {
                tracing::warn!(file = name, path = %path.display(), error = %error, "bad config file, using default");
                self.files.push(FileReport {
                    name,
                    status: FileStatus::Fallback { path, error },
                });
                default()
            }
        }
    }
}

impl SukoonConfig {
    pub fn load(sources: &ConfigSources) -> Self {
        let mut loader = Loader {
            sources,
            hasher: Fnv1a64::new(),
            files: Vec::new(),
        };

        let crisis = loader.layer(
            CRISIS_TERMS_FILE,
            |s, _| TermList::from_yaml_str("crisis", s),
            || TermList::empty("crisis"),
        );
        let finance = loader.layer(
            FINANCE_TERMS_FILE,
            |s, _| TermList::from_yaml_str("finance", s),
            || TermList::empty("finance"),
        );
        let templates = loader.layer(
            REFUSALS_FILE,
            |s, _| RefusalTemplates::from_yaml_str(s),
            RefusalTemplates::empty,
        );
        let policy_map = loader.layer(
            POLICY_MAP_FILE,
            |s, _| PolicyMap::from_yaml_str(s),
            PolicyMap::default,
        );
        let crisis_flow = loader.layer(
            CRISIS_FLOW_FILE,
            |s, p| CrisisFlowConfig::parse(s, p).map_err(|e| e.to_string()),
            CrisisFlowConfig::default,
        );
        let concepts = loader.layer(
            CKG_FILE,
            |s, _| ConceptTable::from_yaml_str(s),
            ConceptTable::disabled,
        );
        let retrieval = loader.layer(
            RETRIEVAL_FILE,
            |s, _| RetrievalConfig::from_yaml_str(s),
            RetrievalConfig::default,
        );
        let kb: Vec<KbItem> = loader.layer(
            KB_FILE,
            |s, _| parse_knowledge_base(s),
            seed_knowledge_base,
        );

        let digest = loader.hasher.finish();
        tracing::info!(
            digest = %digest,
            crisis_terms = crisis.len(),
            finance_terms = finance.len(),
            concepts = concepts.concept_count(),
            kb_items = kb.len(),
            "configuration loaded"
        );

        Self {
            gate: TermGate::new(crisis, finance),
            safety: SafetyNode::new(policy_map, templates, crisis_flow),
            risk: RiskDetector::new(),
            concepts,
            retrieval,
            knowledge_base: Arc::new(LexicalRetriever::new(kb)),
            digest,
            files: loader.files,
        }
    }
}

/// Hot-reloadable handle. Readers take an `Arc` snapshot and keep it for the
/// whole turn; `reload` builds a new snapshot off to the side and swaps the
/// pointer.
#[derive(Debug)]
pub struct ConfigHandle {
    sources: ConfigSources,
    current: RwLock<Arc<SukoonConfig>>,
}

impl ConfigHandle {
    pub fn load(sources: ConfigSources) -> Self {
        let config = SukoonConfig::load(&sources);
        Self {
            sources,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Wrap an already-built config. `reload` will read from `sources`.
    pub fn from_config(sources: ConfigSources, config: SukoonConfig) -> Self {
        Self {
            sources,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn sources(&self) -> &ConfigSources {
        &self.sources
    }

    pub fn snapshot(&self) -> Arc<SukoonConfig> {
        Arc::clone(&self.current.read())
    }

    /// Re-read every file and publish the result. Returns the new snapshot.
    pub fn reload(&self) -> Arc<SukoonConfig> {
        let next = Arc::new(SukoonConfig::load(&self.sources));
        let previous = {
            let mut guard = self.current.write();
            std::mem::replace(&mut *guard, Arc::clone(&next))
        };
        tracing::info!(
            previous = %previous.digest,
            current = %next.digest,
            changed = previous.digest != next.digest,
            "configuration reloaded"
        );
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    #[test]
    fn empty_sources_use_defaults() {
        let cfg = SukoonConfig::load(&ConfigSources::default());
        assert!(cfg.gate.crisis_terms().is_empty());
        assert!(!cfg.concepts.is_enabled());
        assert_eq!(cfg.retrieval, RetrievalConfig::default());
        assert_eq!(cfg.knowledge_base.len(), seed_knowledge_base().len());
        assert!(cfg.files.iter().all(|f| f.status == FileStatus::Missing));
        assert_eq!(cfg.safety.crisis_flow_config().escalate_deadline_seconds(), 5);
    }

    #[test]
    fn first_directory_wins_per_file() {
        let base = TempDir::new().unwrap();
        let overlay = TempDir::new().unwrap();
        write(base.path(), CRISIS_TERMS_FILE, "terms: [base term]\n");
        write(base.path(), RETRIEVAL_FILE, "top_k: 2\n");
        write(overlay.path(), CRISIS_TERMS_FILE, "terms: [overlay term]\n");

        let cfg = SukoonConfig::load(&ConfigSources::new([overlay.path(), base.path()]));
        let terms: Vec<_> = cfg.gate.crisis_terms().terms().map(|t| t.text().to_string()).collect();
        assert_eq!(terms, vec!["overlay term"]);
        assert_eq!(cfg.retrieval.top_k, 2);
    }

    #[test]
    fn bad_files_fall_back_and_are_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), CRISIS_FLOW_FILE, r#"{"escalate_deadline_seconds": 12}"#);
        write(dir.path(), CKG_FILE, "lambda: [");

        let cfg = SukoonConfig::load(&ConfigSources::new([dir.path()]));
        assert_eq!(cfg.safety.crisis_flow_config().escalate_deadline_seconds(), 5);
        assert!(!cfg.concepts.is_enabled());

        let flow = cfg.files.iter().find(|f| f.name == CRISIS_FLOW_FILE).unwrap();
        assert!(matches!(flow.status, FileStatus::Fallback { .. }));
    }

    #[test]
    fn digest_tracks_loaded_bytes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), CRISIS_TERMS_FILE, "terms: [a b]\n");
        let sources = ConfigSources::new([dir.path()]);
        let d1 = SukoonConfig::load(&sources).digest;
        let d1_again = SukoonConfig::load(&sources).digest;
        assert_eq!(d1, d1_again);

        write(dir.path(), CRISIS_TERMS_FILE, "terms: [a c]\n");
        assert_ne!(SukoonConfig::load(&sources).digest, d1);
    }

    #[test]
    fn reload_swaps_without_touching_old_snapshots() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), RETRIEVAL_FILE, "top_k: 1\n");
        let handle = ConfigHandle::load(ConfigSources::new([dir.path()]));
        let before = handle.snapshot();

        write(dir.path(), RETRIEVAL_FILE, "top_k: 4\n");
        let after = handle.reload();

        assert_eq!(before.retrieval.top_k, 1);
        assert_eq!(after.retrieval.top_k, 4);
        assert_eq!(handle.snapshot().retrieval.top_k, 4);

        // Reloading unchanged files is idempotent.
        let again = handle.reload();
        assert_eq!(again.digest, after.digest);
    }
}
