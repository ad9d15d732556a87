//! Adapter trigger-word resolution with a 24h positive cache.
//!
//! The cache stores both real word lists and definitive empties. Transient
//! failures are surfaced as empty lists for the current interaction but
//! never written, so the next interaction retries.

use async_trait::async_trait;
use easel_renderer::{CivitaiClient, RendererClient, TriggerWordsOutcome};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

struct CacheEntry {
    words: Vec<String>,
    cached_at: Instant,
}

pub struct MetadataCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached words for an adapter, if fresh. A cached empty list is a
    /// valid answer ("known to have no trigger words").
    pub fn cached_words(&self, filename: &str) -> Option<Vec<String>> {
        let map = self.inner.lock().ok()?;
        let entry = map.get(filename)?;
        if entry.cached_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.words.clone())
    }

    fn store(&self, filename: &str, words: Vec<String>) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(
                filename.to_string(),
                CacheEntry {
                    words,
                    cached_at: Instant::now(),
                },
            );
        }
    }
}

/// Renderer-side metadata: the optional local plugin and the embedded hash.
#[async_trait]
pub trait AdapterMetadataSource: Send + Sync {
    async fn local_trigger_words(&self, stem: &str) -> Option<Vec<String>>;
    async fn file_hash(&self, filename: &str) -> Option<String>;
}

/// The remote trigger-word service.
#[async_trait]
pub trait TriggerWordsService: Send + Sync {
    async fn by_hash(&self, hash: &str) -> TriggerWordsOutcome;
    async fn by_search(&self, term: &str) -> TriggerWordsOutcome;
}

#[async_trait]
impl AdapterMetadataSource for RendererClient {
    async fn local_trigger_words(&self, stem: &str) -> Option<Vec<String>> {
        self.adapter_trigger_words_local(stem).await
    }

    async fn file_hash(&self, filename: &str) -> Option<String> {
        self.adapter_metadata(filename).await
    }
}

#[async_trait]
impl TriggerWordsService for CivitaiClient {
    async fn by_hash(&self, hash: &str) -> TriggerWordsOutcome {
        self.trigger_words_by_hash(hash).await
    }

    async fn by_search(&self, term: &str) -> TriggerWordsOutcome {
        self.trigger_words_by_search(term).await
    }
}

/// Resolve trigger words for an adapter file, consulting in order: the
/// cache, the renderer-local plugin, the remote service by embedded hash,
/// and finally remote text search (raw stem, then normalised stem).
pub async fn resolve_trigger_words(
    cache: &MetadataCache,
    source: &dyn AdapterMetadataSource,
    service: &dyn TriggerWordsService,
    filename: &str,
) -> Vec<String> {
    if let Some(words) = cache.cached_words(filename) {
        return words;
    }

    let stem = file_stem(filename);

    // Local plugin. An empty or failed answer falls through uncached.
    if let Some(words) = source.local_trigger_words(stem).await {
        if !words.is_empty() {
            cache.store(filename, words.clone());
            return words;
        }
    }

    // Remote lookup by embedded hash. A 404 is authoritative.
    if let Some(hash) = source.file_hash(filename).await {
        return match service.by_hash(&hash).await {
            TriggerWordsOutcome::Words(words) => {
                cache.store(filename, words.clone());
                words
            }
            TriggerWordsOutcome::DefinitelyEmpty => {
                cache.store(filename, Vec::new());
                Vec::new()
            }
            TriggerWordsOutcome::TransientFailure => {
                debug!("Transient metadata failure for {filename}; not cached");
                Vec::new()
            }
        };
    }

    // No hash available: text search, raw stem first.
    match service.by_search(stem).await {
        TriggerWordsOutcome::Words(words) => {
            cache.store(filename, words.clone());
            return words;
        }
        TriggerWordsOutcome::TransientFailure => {
            debug!("Transient metadata failure for {filename}; not cached");
            return Vec::new();
        }
        TriggerWordsOutcome::DefinitelyEmpty => {}
    }

    let normalised = easel_renderer::civitai::normalise_stem(stem);
    if normalised != stem {
        match service.by_search(&normalised).await {
            TriggerWordsOutcome::Words(words) => {
                cache.store(filename, words.clone());
                return words;
            }
            TriggerWordsOutcome::TransientFailure => {
                debug!("Transient metadata failure for {filename}; not cached");
                return Vec::new();
            }
            TriggerWordsOutcome::DefinitelyEmpty => {}
        }
    }

    cache.store(filename, Vec::new());
    Vec::new()
}

fn file_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        local: Option<Vec<String>>,
        hash: Option<String>,
    }

    #[async_trait]
    impl AdapterMetadataSource for FakeSource {
        async fn local_trigger_words(&self, _stem: &str) -> Option<Vec<String>> {
            self.local.clone()
        }

        async fn file_hash(&self, _filename: &str) -> Option<String> {
            self.hash.clone()
        }
    }

    struct FakeService {
        by_hash: TriggerWordsOutcome,
        searches: Vec<TriggerWordsOutcome>,
        search_calls: AtomicUsize,
    }

    impl FakeService {
        fn new(by_hash: TriggerWordsOutcome, searches: Vec<TriggerWordsOutcome>) -> Self {
            Self {
                by_hash,
                searches,
                search_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TriggerWordsService for FakeService {
        async fn by_hash(&self, _hash: &str) -> TriggerWordsOutcome {
            self.by_hash.clone()
        }

        async fn by_search(&self, _term: &str) -> TriggerWordsOutcome {
            let call = self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.searches
                .get(call)
                .cloned()
                .unwrap_or(TriggerWordsOutcome::DefinitelyEmpty)
        }
    }

    fn no_source() -> FakeSource {
        FakeSource {
            local: None,
            hash: None,
        }
    }

    #[tokio::test]
    async fn local_plugin_wins_and_caches() {
        let cache = MetadataCache::new();
        let source = FakeSource {
            local: Some(vec!["glow".into()]),
            hash: Some("abc".into()),
        };
        let service = FakeService::new(TriggerWordsOutcome::TransientFailure, vec![]);

        let words =
            resolve_trigger_words(&cache, &source, &service, "style-v1.safetensors").await;
        assert_eq!(words, vec!["glow"]);
        assert_eq!(
            cache.cached_words("style-v1.safetensors"),
            Some(vec!["glow".to_string()])
        );
    }

    #[tokio::test]
    async fn empty_local_answer_falls_through_to_hash() {
        let cache = MetadataCache::new();
        let source = FakeSource {
            local: Some(vec![]),
            hash: Some("abc".into()),
        };
        let service = FakeService::new(
            TriggerWordsOutcome::Words(vec!["neon".into()]),
            vec![],
        );

        let words = resolve_trigger_words(&cache, &source, &service, "a.safetensors").await;
        assert_eq!(words, vec!["neon"]);
    }

    #[tokio::test]
    async fn definitive_404_caches_the_empty() {
        let cache = MetadataCache::new();
        let source = FakeSource {
            local: None,
            hash: Some("abc".into()),
        };
        let service = FakeService::new(TriggerWordsOutcome::DefinitelyEmpty, vec![]);

        let words = resolve_trigger_words(&cache, &source, &service, "a.safetensors").await;
        assert!(words.is_empty());
        // The empty is a positive cache entry.
        assert_eq!(cache.cached_words("a.safetensors"), Some(vec![]));
    }

    #[tokio::test]
    async fn transient_failure_is_not_cached() {
        let cache = MetadataCache::new();
        let source = FakeSource {
            local: None,
            hash: Some("abc".into()),
        };
        let service = FakeService::new(TriggerWordsOutcome::TransientFailure, vec![]);

        let words = resolve_trigger_words(&cache, &source, &service, "a.safetensors").await;
        assert!(words.is_empty());
        assert_eq!(cache.cached_words("a.safetensors"), None);
    }

    #[tokio::test]
    async fn search_falls_back_to_normalised_stem() {
        let cache = MetadataCache::new();
        let service = FakeService::new(
            TriggerWordsOutcome::DefinitelyEmpty,
            vec![
                TriggerWordsOutcome::DefinitelyEmpty,
                TriggerWordsOutcome::Words(vec!["soft light".into()]),
            ],
        );

        let words =
            resolve_trigger_words(&cache, &no_source(), &service, "cool_style-v1.5.safetensors")
                .await;
        assert_eq!(words, vec!["soft light"]);
        assert_eq!(service.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_search_caches_empty() {
        let cache = MetadataCache::new();
        let service = FakeService::new(TriggerWordsOutcome::DefinitelyEmpty, vec![]);

        let words =
            resolve_trigger_words(&cache, &no_source(), &service, "cool_style.safetensors").await;
        assert!(words.is_empty());
        assert_eq!(cache.cached_words("cool_style.safetensors"), Some(vec![]));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MetadataCache::with_ttl(Duration::from_millis(0));
        cache.store("a", vec!["x".into()]);
        assert_eq!(cache.cached_words("a"), None);
    }
}
