//! Evidence retrieval boundary.
//!
//! The pipeline treats retrieval as an opaque, possibly blocking call. It is
//! made through [`BoundedRetriever`], which runs a single attempt on a worker
//! thread and gives up after `timeout_ms`. Timeouts, errors and panics all
//! degrade to an empty hit list; they never fail the turn.
//!
//! A worker that outlives its deadline keeps running until the backend
//! returns. Such workers are counted in an [`InFlight`] shared by every turn
//! of a pipeline, and once `max_in_flight` are running new turns skip
//! retrieval (outcome `saturated`) instead of starting another thread.
//!
//! [`LexicalRetriever`] is the in-process fallback: IDF-weighted token
//! overlap over a small knowledge base.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use sukoon_ckg::EvidenceCandidate;
use sukoon_text::{normalize_input, tokenize};

/// Max characters of body text carried as a snippet.
pub const SNIPPET_CHARS: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("retrieval backend failed: {0}")]
    Backend(String),

    #[error("knowledge base not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("malformed retrieval input {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Retrieval knobs (`retrieval.yaml`). Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Evidence items kept in the response.
    pub top_k: usize,
    /// Candidates requested from the retriever for reranking.
    pub candidate_k: usize,
    /// Max hits per source; 0 disables the cap.
    pub per_source_cap: usize,
    /// Hits scoring below this are dropped.
    pub min_score: f64,
    pub timeout_ms: u64,
    /// Cap on retrieval workers running at once, late ones included.
    pub max_in_flight: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            candidate_k: 8,
            per_source_cap: 2,
            min_score: 0.0,
            timeout_ms: 800,
            max_in_flight: 4,
        }
    }
}

impl RetrievalConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
        if !cfg.min_score.is_finite() {
            return Err("min_score must be finite".to_string());
        }
        Ok(cfg)
    }
}

/// One ranked hit as returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedHit {
    pub id: String,
    pub title: String,
    pub source: String,
    pub snippet: String,
    pub score: f64,
}

impl From<RetrievedHit> for EvidenceCandidate {
    fn from(hit: RetrievedHit) -> Self {
        EvidenceCandidate::new(hit.id, hit.title, hit.snippet, hit.source, hit.score)
    }
}

/// A similarity / lexical search backend.
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str {
        "retriever"
    }

    fn retrieve(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<RetrievedHit>, RetrievalError>;
}

/// How the bounded call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalOutcome {
    Ok,
    Empty,
    Timeout,
    Failed,
    /// Too many workers still running; no attempt was made.
    Saturated,
}

impl RetrievalOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalOutcome::Ok => "ok",
            RetrievalOutcome::Empty => "empty",
            RetrievalOutcome::Timeout => "timeout",
            RetrievalOutcome::Failed => "failed",
            RetrievalOutcome::Saturated => "saturated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRetrieval {
    pub hits: Vec<RetrievedHit>,
    pub outcome: RetrievalOutcome,
}

impl BoundedRetrieval {
    fn degraded(outcome: RetrievalOutcome) -> Self {
        Self {
            hits: Vec::new(),
            outcome,
        }
    }
}

/// Number of retrieval workers currently running. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn try_acquire(&self, max: usize) -> Option<InFlightSlot> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| InFlightSlot(Arc::clone(&self.0)))
    }
}

/// Released when the worker holding it finishes, returns early or panics.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs one retrieval attempt with a deadline.
#[derive(Clone)]
pub struct BoundedRetriever {
    inner: Arc<dyn Retriever>,
    in_flight: InFlight,
}

impl std::fmt::Debug for BoundedRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRetriever")
            .field("inner", &self.inner.name())
            .field("in_flight", &self.in_flight.current())
            .finish()
    }
}

impl BoundedRetriever {
    pub fn new(inner: Arc<dyn Retriever>) -> Self {
        Self {
            inner,
            in_flight: InFlight::new(),
        }
    }

    /// Count workers against a shared budget instead of a private one.
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Single attempt, no retries. A worker that outlives the deadline is
    /// left to finish on its own and keeps its in-flight slot until then; its
    /// result is discarded.
    pub fn retrieve(&self, query: &str, config: &RetrievalConfig) -> BoundedRetrieval {
        let Some(slot) = self.in_flight.try_acquire(config.max_in_flight.max(1)) else {
            tracing::warn!(
                retriever = %self.inner.name(),
                in_flight = self.in_flight.current(),
                "retrieval workers saturated, continuing without evidence"
            );
            return BoundedRetrieval::degraded(RetrievalOutcome::Saturated);
        };
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let query_owned = query.to_string();
        let cfg = config.clone();

        let spawned = std::thread::Builder::new()
            .name("sukoon_retrieve".to_string())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(inner.retrieve(&query_owned, &cfg));
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "could not start retrieval worker");
            return BoundedRetrieval::degraded(RetrievalOutcome::Failed);
        }

        let deadline = Duration::from_millis(config.timeout_ms.max(1));
        match rx.recv_timeout(deadline) {
            Ok(Ok(hits)) if hits.is_empty() => BoundedRetrieval::degraded(RetrievalOutcome::Empty),
            Ok(Ok(hits)) => BoundedRetrieval {
                hits,
                outcome: RetrievalOutcome::Ok,
            },
            Ok(Err(err)) => {
                tracing::warn!(retriever = %self.inner.name(), error = %err, "retrieval failed, continuing without evidence");
                BoundedRetrieval::degraded(RetrievalOutcome::Failed)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    retriever = %self.inner.name(),
                    timeout_ms = config.timeout_ms,
                    "retrieval timed out, continuing without evidence"
                );
                BoundedRetrieval::degraded(RetrievalOutcome::Timeout)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!(retriever = %self.inner.name(), "retrieval worker exited without a result");
                BoundedRetrieval::degraded(RetrievalOutcome::Failed)
            }
        }
    }
}

// ============================================================================
// Lexical fallback retriever
// ============================================================================

fn default_source() -> String {
    "kb".to_string()
}

/// One knowledge-base entry (`kb.json` is a JSON array of these).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbItem {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default = "default_source")]
    pub source: String,
}

impl KbItem {
    fn new(id: &str, title: &str, body: &str, source: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            source: source.to_string(),
        }
    }
}

/// Built-in knowledge base used when `kb.json` is missing or unusable.
pub fn seed_knowledge_base() -> Vec<KbItem> {
    vec![
        KbItem::new("seed-001", "گہری سانس لینا", "2-3 منٹ ناک سے سانس، منہ سے خارج؛ رفتار آہستہ رکھیں۔", "seed"),
        KbItem::new("seed-002", "زمین سے ربط (گراؤنڈنگ)", "5 چیزیں دیکھیں، 4 چھوئیں، 3 سنیں، 2 سونگھیں، 1 چکھیں۔", "seed"),
        KbItem::new("seed-003", "پانی پینا", "آہستہ سے ایک گلاس پانی؛ دل کی دھڑکن نرم پڑتی ہے۔", "seed"),
        KbItem::new("seed-004", "چلنا", "3–5 منٹ تیز قدم؛ سانس اور قدم ہم آہنگ کریں۔", "seed"),
        KbItem::new("seed-005", "نیند حفظانِ صحت", "سونے سے 1 گھنٹہ پہلے اسکرین بند، روشنی مدھم، کمرہ ٹھنڈا۔", "seed"),
        KbItem::new("seed-006", "PHQ-9 تعارف", "ڈپریشن کی شدت سمجھنے کے لیے 9 سوالات۔", "phq9"),
        KbItem::new("seed-007", "GAD-7 تعارف", "پریشانی کی پیمائش کے 7 سوالات۔", "gad7"),
        KbItem::new("seed-008", "PHQ-2 تعارف", "مختصر اسکرین: موڈ + دلچسپی۔", "phq9"),
        KbItem::new("seed-009", "پینک ایٹیک کیا ہے؟", "یہ جان لیوا نہیں؛ جسم کا الارم سسٹم اوور ایکٹو ہو جاتا ہے۔", "seed"),
        KbItem::new("seed-010", "سیفٹی پلان", "ایک شخص/نمبر، ایک جگہ، ایک سرگرمی پہلے سے طے کریں۔", "seed"),
        KbItem::new("seed-011", "Box breathing", "Breathe in through the nose for 4, hold for 4, breathe out slowly for 6. Repeat for 2-3 minutes.", "seed"),
        KbItem::new("seed-012", "Grounding 5-4-3-2-1", "Name 5 things you see, 4 you can touch, 3 you hear, 2 you smell and 1 you taste.", "seed"),
        KbItem::new("seed-013", "Sleep hygiene", "Screens off an hour before bed, dim lights, keep the room cool.", "seed"),
    ]
}

/// Parse a `kb.json` document. An empty array is rejected.
pub fn parse_knowledge_base(json: &str) -> Result<Vec<KbItem>, String> {
    let items: Vec<KbItem> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if items.is_empty() {
        return Err("knowledge base is empty".to_string());
    }
    Ok(items)
}

pub fn load_knowledge_base(path: &Path) -> Result<Vec<KbItem>, RetrievalError> {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RetrievalError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(RetrievalError::Io(e)),
    };
    parse_knowledge_base(&text).map_err(|message| RetrievalError::Malformed {
        path: path.to_path_buf(),
        message,
    })
}

/// Tokens of at least two characters.
fn kb_tokens(text: &str) -> HashSet<String> {
    tokenize(&normalize_input(text))
        .into_iter()
        .filter(|t| t.chars().count() > 1)
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedItem {
    item: KbItem,
    tokens: HashSet<String>,
}

/// IDF overlap scorer: `Σ idf(t ∈ overlap) + 0.01·|overlap|` with
/// `idf = ln((N + 1) / (df + 0.5))`.
#[derive(Debug, Clone)]
pub struct LexicalRetriever {
    items: Vec<IndexedItem>,
    idf: HashMap<String, f64>,
}

impl LexicalRetriever {
    pub fn new(kb: Vec<KbItem>) -> Self {
        let items: Vec<IndexedItem> = kb
            .into_iter()
            .map(|item| IndexedItem {
                tokens: kb_tokens(&format!("{} {}", item.title, item.body)),
                item,
            })
            .collect();

        let n = items.len() as f64;
        let mut df: HashMap<&str, usize> = HashMap::new();
        for it in &items {
            for tok in &it.tokens {
                *df.entry(tok.as_str()).or_default() += 1;
            }
        }
        let idf = df
            .into_iter()
            .map(|(tok, d)| (tok.to_string(), ((n + 1.0) / (d as f64 + 0.5)).ln()))
            .collect();

        Self { items, idf }
    }

    pub fn seeded() -> Self {
        Self::new(seed_knowledge_base())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn score(&self, query: &HashSet<String>, item: &IndexedItem) -> f64 {
        let overlap: Vec<&String> = query.intersection(&item.tokens).collect();
        let idf_sum: f64 = overlap
            .iter()
            .map(|t| self.idf.get(t.as_str()).copied().unwrap_or(0.0))
            .sum();
        idf_sum + 0.01 * overlap.len() as f64
    }
}

impl Retriever for LexicalRetriever {
    fn name(&self) -> &str {
        "lexical"
    }

    fn retrieve(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<RetrievedHit>, RetrievalError> {
        let q = kb_tokens(query);
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, &IndexedItem)> = self
            .items
            .iter()
            .map(|it| (self.score(&q, it), it))
            .filter(|(s, _)| *s > 0.0 && *s >= config.min_score)
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.item.id.cmp(&b.item.id)));

        let mut per_source: HashMap<&str, usize> = HashMap::new();
        let mut hits = Vec::new();
        for (score, it) in scored {
            if hits.len() >= config.candidate_k {
                break;
            }
            let used = per_source.entry(it.item.source.as_str()).or_default();
            if config.per_source_cap > 0 && *used >= config.per_source_cap {
                continue;
            }
            *used += 1;
            hits.push(RetrievedHit {
                id: it.item.id.clone(),
                title: it.item.title.clone(),
                source: it.item.source.clone(),
                snippet: it.item.body.chars().take(SNIPPET_CHARS).collect(),
                score,
            });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow(Duration);

    impl Retriever for Slow {
        fn retrieve(&self, _: &str, _: &RetrievalConfig) -> Result<Vec<RetrievedHit>, RetrievalError> {
            std::thread::sleep(self.0);
            Ok(vec![RetrievedHit {
                id: "late".into(),
                title: "t".into(),
                source: "s".into(),
                snippet: "x".into(),
                score: 1.0,
            }])
        }
    }

    struct Failing;

    impl Retriever for Failing {
        fn retrieve(&self, _: &str, _: &RetrievalConfig) -> Result<Vec<RetrievedHit>, RetrievalError> {
            Err(RetrievalError::Backend("index offline".into()))
        }
    }

    struct Panicking;

    impl Retriever for Panicking {
        fn retrieve(&self, _: &str, _: &RetrievalConfig) -> Result<Vec<RetrievedHit>, RetrievalError> {
            panic!("boom")
        }
    }

    struct Counting(AtomicUsize);

    impl Retriever for Counting {
        fn retrieve(&self, _: &str, _: &RetrievalConfig) -> Result<Vec<RetrievedHit>, RetrievalError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RetrievalError::Backend("nope".into()))
        }
    }

    fn cfg(timeout_ms: u64) -> RetrievalConfig {
        RetrievalConfig {
            timeout_ms,
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn timeout_degrades_to_empty() {
        let r = BoundedRetriever::new(Arc::new(Slow(Duration::from_millis(500))));
        let out = r.retrieve("q", &cfg(20));
        assert_eq!(out.outcome, RetrievalOutcome::Timeout);
        assert!(out.hits.is_empty());
    }

    #[test]
    fn late_workers_hold_slots_until_they_finish() {
        let in_flight = InFlight::new();
        let r = BoundedRetriever::new(Arc::new(Slow(Duration::from_millis(300))))
            .with_in_flight(in_flight.clone());
        let config = RetrievalConfig {
            max_in_flight: 2,
            ..cfg(10)
        };

        assert_eq!(r.retrieve("q", &config).outcome, RetrievalOutcome::Timeout);
        assert_eq!(r.retrieve("q", &config).outcome, RetrievalOutcome::Timeout);
        assert_eq!(in_flight.current(), 2);
        let out = r.retrieve("q", &config);
        assert_eq!(out.outcome, RetrievalOutcome::Saturated);
        assert!(out.hits.is_empty());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while in_flight.current() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(in_flight.current(), 0);
        let fast = BoundedRetriever::new(Arc::new(Slow(Duration::ZERO))).with_in_flight(in_flight);
        assert_eq!(fast.retrieve("q", &config).outcome, RetrievalOutcome::Ok);
    }

    #[test]
    fn panicking_worker_releases_its_slot() {
        let in_flight = InFlight::new();
        let r = BoundedRetriever::new(Arc::new(Panicking)).with_in_flight(in_flight.clone());
        assert_eq!(r.retrieve("q", &cfg(1_000)).outcome, RetrievalOutcome::Failed);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while in_flight.current() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(in_flight.current(), 0);
    }

    #[test]
    fn fast_backend_returns_hits() {
        let r = BoundedRetriever::new(Arc::new(Slow(Duration::from_millis(0))));
        let out = r.retrieve("q", &cfg(2_000));
        assert_eq!(out.outcome, RetrievalOutcome::Ok);
        assert_eq!(out.hits.len(), 1);
    }

    #[test]
    fn errors_and_panics_degrade() {
        let failing = BoundedRetriever::new(Arc::new(Failing)).retrieve("q", &cfg(1_000));
        assert_eq!(failing.outcome, RetrievalOutcome::Failed);
        let panicking = BoundedRetriever::new(Arc::new(Panicking)).retrieve("q", &cfg(1_000));
        assert_eq!(panicking.outcome, RetrievalOutcome::Failed);
        assert!(panicking.hits.is_empty());
    }

    #[test]
    fn single_attempt_only() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let r = BoundedRetriever::new(counting.clone());
        r.retrieve("q", &cfg(1_000));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lexical_scores_rare_overlap_higher() {
        let lex = LexicalRetriever::seeded();
        let hits = lex.retrieve("box breathing for panic", &RetrievalConfig::default()).unwrap();
        assert_eq!(hits[0].id, "seed-011");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn lexical_urdu_query() {
        let lex = LexicalRetriever::seeded();
        let hits = lex.retrieve("سانس", &RetrievalConfig::default()).unwrap();
        assert!(hits.iter().any(|h| h.id == "seed-001"));
    }

    #[test]
    fn lexical_respects_caps_and_limits() {
        let kb = vec![
            KbItem::new("a", "calm breathing", "one", "s1"),
            KbItem::new("b", "calm walking", "two", "s1"),
            KbItem::new("c", "calm tea", "three", "s2"),
        ];
        let lex = LexicalRetriever::new(kb);
        let cfg = RetrievalConfig {
            per_source_cap: 1,
            candidate_k: 5,
            ..RetrievalConfig::default()
        };
        let hits = lex.retrieve("calm", &cfg).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits.iter().filter(|h| h.source == "s1").count(), 1);

        let one = RetrievalConfig {
            candidate_k: 1,
            per_source_cap: 0,
            ..RetrievalConfig::default()
        };
        assert_eq!(lex.retrieve("calm", &one).unwrap().len(), 1);
    }

    #[test]
    fn short_or_empty_queries_return_nothing() {
        let lex = LexicalRetriever::seeded();
        assert!(lex.retrieve("a", &RetrievalConfig::default()).unwrap().is_empty());
        assert!(lex.retrieve("", &RetrievalConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn snippets_are_bounded() {
        let long = "word ".repeat(100);
        let lex = LexicalRetriever::new(vec![KbItem::new("x", "long entry", &long, "kb")]);
        let hits = lex.retrieve("long", &RetrievalConfig::default()).unwrap();
        assert_eq!(hits[0].snippet.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn config_parsing() {
        let c = RetrievalConfig::from_yaml_str("top_k: 2\nk1: 1.5\n").unwrap();
        assert_eq!(c.top_k, 2);
        assert_eq!(c.candidate_k, RetrievalConfig::default().candidate_k);
        assert!(RetrievalConfig::from_yaml_str("top_k: [").is_err());
        assert!(parse_knowledge_base("[]").is_err());
    }
}
