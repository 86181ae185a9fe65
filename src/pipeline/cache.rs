//! Score cache shared across in-flight requests.
//!
//! Keyed by a SHA-256 hash of everything the scorer reads. Concurrent
//! get/set with no ordering guarantee; the last write wins and every entry
//! expires after its own TTL.

use std::time::{Duration, Instant};

use base64::Engine;
use moka::sync::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};

use super::types::{QualityScore, RefinementMode, SourceDocument};
use crate::config::CacheSettings;

/// Thread-safe score cache injected into the orchestrator.
pub trait ScoreCache: Send + Sync {
    fn get(&self, key: &str) -> Option<QualityScore>;
    fn set(&self, key: &str, score: QualityScore, ttl: Duration);
}

/// Cache key over the question, the scored text, the mode, the expected
/// language and the source ids.
pub fn cache_key(
    question: &str,
    response: &str,
    mode: RefinementMode,
    language: &str,
    sources: &[SourceDocument],
) -> String {
    let mut hasher = Sha256::new();
    for part in [question, response, mode.as_str(), language] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update((sources.len() as u64).to_le_bytes());
    for source in sources {
        hasher.update(source.id.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CachedScore {
    score: QualityScore,
    ttl: Duration,
}

/// Per-entry TTL taken from the stored value.
struct PerEntryTtl;

impl Expiry<String, CachedScore> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedScore,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedScore,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory score cache with bounded capacity and per-entry TTL.
pub struct MokaScoreCache {
    entries: Cache<String, CachedScore>,
}

impl MokaScoreCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_capacity(settings.capacity)
    }

    /// Creates a cache with a max entry capacity.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    /// Number of cached entries (approximate until pending tasks run).
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl ScoreCache for MokaScoreCache {
    fn get(&self, key: &str) -> Option<QualityScore> {
        self.entries.get(key).map(|cached| cached.score)
    }

    fn set(&self, key: &str, score: QualityScore, ttl: Duration) {
        self.entries
            .insert(key.to_string(), CachedScore { score, ttl });
    }
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScoreCache;

impl ScoreCache for NoopScoreCache {
    fn get(&self, _key: &str) -> Option<QualityScore> {
        None
    }

    fn set(&self, _key: &str, _score: QualityScore, _ttl: Duration) {}
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::types::{Dimension, IssueTag};

    fn sample_score(overall: f64) -> QualityScore {
        QualityScore {
            overall_score: overall,
            dimension_scores: Dimension::ALL.iter().map(|d| (*d, 1.0)).collect::<BTreeMap<_, _>>(),
            issues: vec![IssueTag::WeakStructure],
            is_critical: false,
        }
    }

    // =================================================================
    // KEY
    // =================================================================

    #[test]
    fn key_is_deterministic() {
        let sources = vec![SourceDocument::new(1, "a")];
        let a = cache_key("q", "r", RefinementMode::Light, "en", &sources);
        let b = cache_key("q", "r", RefinementMode::Light, "en", &sources);
        assert_eq!(a, b);
        // SHA-256 in standard base64 is 44 chars.
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn key_changes_with_each_input() {
        let base = cache_key("q", "r", RefinementMode::Light, "en", &[]);
        assert_ne!(base, cache_key("q2", "r", RefinementMode::Light, "en", &[]));
        assert_ne!(base, cache_key("q", "r2", RefinementMode::Light, "en", &[]));
        assert_ne!(base, cache_key("q", "r", RefinementMode::Aggressive, "en", &[]));
        assert_ne!(base, cache_key("q", "r", RefinementMode::Light, "fr", &[]));
        let with_source = [SourceDocument::new(1, "a")];
        assert_ne!(
            base,
            cache_key("q", "r", RefinementMode::Light, "en", &with_source)
        );
    }

    #[test]
    fn key_is_not_ambiguous_across_fields() {
        let a = cache_key("ab", "c", RefinementMode::Light, "en", &[]);
        let b = cache_key("a", "bc", RefinementMode::Light, "en", &[]);
        assert_ne!(a, b);
    }

    // =================================================================
    // MOKA CACHE
    // =================================================================

    #[test]
    fn get_after_set() {
        let cache = MokaScoreCache::with_capacity(100);
        cache.set("k", sample_score(0.7), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(sample_score(0.7)));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn last_write_wins() {
        let cache = MokaScoreCache::with_capacity(100);
        cache.set("k", sample_score(0.2), Duration::from_secs(60));
        cache.set("k", sample_score(0.9), Duration::from_secs(60));
        assert_eq!(cache.get("k").map(|s| s.overall_score), Some(0.9));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = MokaScoreCache::with_capacity(100);
        cache.set("k", sample_score(0.7), Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clear_removes_everything() {
        let cache = MokaScoreCache::with_capacity(100);
        cache.set("a", sample_score(0.1), Duration::from_secs(60));
        cache.set("b", sample_score(0.2), Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn concurrent_access_from_threads() {
        let cache = Arc::new(MokaScoreCache::with_capacity(1_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("{t}-{i}");
                        cache.set(&key, sample_score(0.5), Duration::from_secs(60));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn noop_cache_stores_nothing() {
        let cache = NoopScoreCache;
        cache.set("k", sample_score(0.7), Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
    }
}
