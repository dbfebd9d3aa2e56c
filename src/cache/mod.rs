//! Two-tier answer cache: exact MD5 matching over a semantic
//! nearest-neighbor fallback.
//!
//! The exact tier hashes the question text and answers repeat questions
//! with zero LLM or embedding calls. The semantic tier embeds the
//! question and returns a stored answer only when cosine similarity
//! clears a high threshold. Both tiers are LRU-bounded with per-entry
//! TTLs checked on read; the semantic tier holds half the exact tier's
//! capacity.
//!
//! One instance serves one namespace; tenant isolation is structural.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::AnswerRecord;
use crate::gateway::{LlmGateway, TextType, cosine_similarity};

/// Configuration for one namespace's cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Exact-tier capacity; the semantic tier gets half.
    pub max_size: usize,
    /// Exact-tier entry lifetime.
    pub exact_ttl: Duration,
    /// Semantic-tier entry lifetime.
    pub semantic_ttl: Duration,
    /// Cosine similarity cutoff for semantic hits.
    pub semantic_threshold: f32,
    /// Embedding model for question vectors.
    pub embed_model: String,
}

/// Cache observability counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Exact-tier hits.
    pub exact_hits: u64,
    /// Semantic-tier hits.
    pub semantic_hits: u64,
    /// Lookups that missed both tiers.
    pub misses: u64,
    /// Entries evicted by capacity.
    pub evictions: u64,
    /// Live exact-tier entries.
    pub exact_size: usize,
    /// Live semantic-tier entries.
    pub semantic_size: usize,
    /// Hits over lookups, 0.0 when no lookups happened.
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct ExactEntry {
    record: AnswerRecord,
    inserted_at: Instant,
}

#[derive(Debug, Clone)]
struct SemanticEntry {
    embedding: Vec<f32>,
    record: AnswerRecord,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    exact_hits: u64,
    semantic_hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheInner {
    exact: LruCache<String, ExactEntry>,
    semantic: LruCache<String, SemanticEntry>,
    counters: Counters,
}

/// Two-tier answer cache for one namespace.
pub struct SmartCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl SmartCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let exact_cap = NonZeroUsize::new(config.max_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let semantic_cap = NonZeroUsize::new((config.max_size / 2).max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            inner: Mutex::new(CacheInner {
                exact: LruCache::new(exact_cap),
                semantic: LruCache::new(semantic_cap),
                counters: Counters::default(),
            }),
        }
    }

    /// Looks up an answer for the question.
    ///
    /// The exact tier is consulted first and costs no network calls; the
    /// semantic tier embeds the question once per miss. Expired entries
    /// encountered along the way are removed.
    pub async fn lookup(&self, gateway: &LlmGateway, question: &str) -> Option<AnswerRecord> {
        if question.is_empty() {
            return None;
        }

        let hash = question_hash(question);

        let semantic_is_empty = {
            let Ok(mut inner) = self.inner.lock() else {
                return None;
            };

            let expired = inner
                .exact
                .peek(&hash)
                .is_some_and(|entry| entry.inserted_at.elapsed() > self.config.exact_ttl);
            if expired {
                inner.exact.pop(&hash);
            } else {
                let record = inner.exact.get(&hash).map(|entry| entry.record.clone());
                if let Some(record) = record {
                    inner.counters.exact_hits += 1;
                    debug!("exact cache hit");
                    return Some(record);
                }
            }

            inner.semantic.is_empty()
        };

        if semantic_is_empty {
            self.count_miss();
            return None;
        }

        let query_embedding = match gateway
            .embed_one(&self.config.embed_model, question, TextType::Query)
            .await
        {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("semantic cache lookup skipped, embedding failed: {e}");
                self.count_miss();
                return None;
            }
        };

        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };

        let mut expired_keys = Vec::new();
        let mut best: Option<(String, f32)> = None;
        for (key, entry) in inner.semantic.iter() {
            if entry.inserted_at.elapsed() > self.config.semantic_ttl {
                expired_keys.push(key.clone());
                continue;
            }
            let similarity = cosine_similarity(&query_embedding, &entry.embedding);
            if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                best = Some((key.clone(), similarity));
            }
        }
        for key in expired_keys {
            inner.semantic.pop(&key);
        }

        if let Some((key, similarity)) = best
            && similarity >= self.config.semantic_threshold
        {
            let record = inner.semantic.get(&key).map(|entry| entry.record.clone());
            if let Some(record) = record {
                inner.counters.semantic_hits += 1;
                info!(similarity, "semantic cache hit");
                return Some(record);
            }
        }

        inner.counters.misses += 1;
        None
    }

    /// Stores an answer under the question.
    ///
    /// The exact tier always receives the entry. The semantic write is
    /// best effort: an embedding failure logs a warning and skips only
    /// that tier.
    pub async fn store(
        &self,
        gateway: &LlmGateway,
        question: &str,
        record: &AnswerRecord,
        use_semantic: bool,
    ) {
        if question.is_empty() {
            return;
        }

        let hash = question_hash(question);

        if let Ok(mut inner) = self.inner.lock() {
            let evicted = inner.exact.push(
                hash.clone(),
                ExactEntry {
                    record: record.clone(),
                    inserted_at: Instant::now(),
                },
            );
            if matches!(evicted, Some((ref key, _)) if *key != hash) {
                inner.counters.evictions += 1;
            }
        }

        if !use_semantic {
            return;
        }

        match gateway
            .embed_one(&self.config.embed_model, question, TextType::Query)
            .await
        {
            Ok(embedding) => {
                if let Ok(mut inner) = self.inner.lock() {
                    let evicted = inner.semantic.push(
                        hash.clone(),
                        SemanticEntry {
                            embedding,
                            record: record.clone(),
                            inserted_at: Instant::now(),
                        },
                    );
                    if matches!(evicted, Some((ref key, _)) if *key != hash) {
                        inner.counters.evictions += 1;
                    }
                }
            }
            Err(e) => warn!("semantic cache write skipped, embedding failed: {e}"),
        }
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let Ok(inner) = self.inner.lock() else {
            return CacheStats::default();
        };
        let hits = inner.counters.exact_hits + inner.counters.semantic_hits;
        let lookups = hits + inner.counters.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };
        CacheStats {
            exact_hits: inner.counters.exact_hits,
            semantic_hits: inner.counters.semantic_hits,
            misses: inner.counters.misses,
            evictions: inner.counters.evictions,
            exact_size: inner.exact.len(),
            semantic_size: inner.semantic.len(),
            hit_rate,
        }
    }

    /// Empties both tiers and resets the counters.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.exact.clear();
            inner.semantic.clear();
            inner.counters = Counters::default();
        }
    }

    fn count_miss(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.counters.misses += 1;
        }
    }
}

impl std::fmt::Debug for SmartCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartCache")
            .field("config", &self.config)
            .finish()
    }
}

/// MD5 hex digest of the UTF-8 question text.
#[must_use]
pub fn question_hash(question: &str) -> String {
    format!("{:x}", md5::compute(question.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::core::{AnswerMode, Verification};
    use crate::gateway::{
        ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmProvider, ProviderError,
        TokenUsage,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds questions about deadlines along one axis and everything
    /// else along another, counting calls.
    struct CountingProvider {
        embed_calls: AtomicUsize,
        fail_embeddings: bool,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                embed_calls: AtomicUsize::new(0),
                fail_embeddings: false,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::fatal("unused"))
        }

        async fn embed(
            &self,
            request: &EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_embeddings {
                return Err(ProviderError::fatal("embedding down"));
            }
            let embeddings = request
                .input
                .iter()
                .map(|text| {
                    if text.contains("deadline") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                usage: TokenUsage::default(),
            })
        }
    }

    fn record(answer: &str) -> AnswerRecord {
        AnswerRecord {
            success: true,
            question: "q".to_string(),
            answer: answer.to_string(),
            reasoning: "r".to_string(),
            relevant_pages: vec![1],
            confidence: 0.8,
            processing_time_ms: 10,
            source_chunks: Vec::new(),
            verification: Verification::skipped("test"),
            mode: AnswerMode::Rag,
        }
    }

    fn config() -> CacheConfig {
        CacheConfig {
            max_size: 4,
            exact_ttl: Duration::from_secs(7 * 24 * 3600),
            semantic_ttl: Duration::from_secs(3 * 24 * 3600),
            semantic_threshold: 0.95,
            embed_model: "m".to_string(),
        }
    }

    fn gateway(provider: Arc<CountingProvider>) -> LlmGateway {
        LlmGateway::new(provider, GatewayConfig::immediate())
    }

    #[test]
    fn test_question_hash_is_md5_hex() {
        // Known MD5 of "hello".
        assert_eq!(question_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_exact_hit_uses_no_embedding() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache
            .store(&gw, "What is the deadline?", &record("March 1"), false)
            .await;
        let hit = cache.lookup(&gw, "What is the deadline?").await.unwrap();
        assert_eq!(hit.answer, "March 1");
        assert_eq!(provider.embed_calls.load(Ordering::SeqCst), 0);

        let stats = cache.stats();
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_semantic_hit_above_threshold() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache
            .store(&gw, "What is the deadline?", &record("March 1"), true)
            .await;
        // Different wording, same axis → cosine 1.0 ≥ 0.95.
        let hit = cache.lookup(&gw, "tell me the deadline").await.unwrap();
        assert_eq!(hit.answer, "March 1");
        assert_eq!(cache.stats().semantic_hits, 1);
    }

    #[tokio::test]
    async fn test_semantic_miss_below_threshold() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache
            .store(&gw, "What is the deadline?", &record("March 1"), true)
            .await;
        // Orthogonal axis → similarity 0.0.
        assert!(cache.lookup(&gw, "什么是预算").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_empty_semantic_tier_skips_embedding() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache.store(&gw, "q1", &record("a1"), false).await;
        assert!(cache.lookup(&gw, "unrelated question").await.is_none());
        // Exact miss + empty semantic tier → no embedding spent.
        assert_eq!(provider.embed_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_exact_entry_misses() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let mut cfg = config();
        cfg.exact_ttl = Duration::ZERO;
        let cache = SmartCache::new(cfg);

        cache.store(&gw, "q", &record("a"), false).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.lookup(&gw, "q").await.is_none());
        assert_eq!(cache.stats().exact_size, 0);
    }

    #[tokio::test]
    async fn test_expired_semantic_entries_removed_during_scan() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let mut cfg = config();
        cfg.exact_ttl = Duration::ZERO;
        cfg.semantic_ttl = Duration::ZERO;
        let cache = SmartCache::new(cfg);

        cache.store(&gw, "deadline q", &record("a"), true).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.lookup(&gw, "deadline q again").await.is_none());
        assert_eq!(cache.stats().semantic_size, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_counts() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let mut cfg = config();
        cfg.max_size = 2;
        let cache = SmartCache::new(cfg);

        cache.store(&gw, "q1", &record("a1"), false).await;
        cache.store(&gw, "q2", &record("a2"), false).await;
        cache.store(&gw, "q3", &record("a3"), false).await;

        let stats = cache.stats();
        assert_eq!(stats.exact_size, 2);
        assert_eq!(stats.evictions, 1);
        // Oldest entry evicted.
        assert!(cache.lookup(&gw, "q1").await.is_none());
        assert!(cache.lookup(&gw, "q3").await.is_some());
    }

    #[tokio::test]
    async fn test_store_overwrite_not_counted_as_eviction() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache.store(&gw, "q", &record("a1"), false).await;
        cache.store(&gw, "q", &record("a2"), false).await;
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.lookup(&gw, "q").await.unwrap().answer, "a2");
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_only_semantic_write() {
        let provider = Arc::new(CountingProvider {
            embed_calls: AtomicUsize::new(0),
            fail_embeddings: true,
        });
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache.store(&gw, "q", &record("a"), true).await;
        let stats = cache.stats();
        assert_eq!(stats.exact_size, 1);
        assert_eq!(stats.semantic_size, 0);
        // Exact tier still serves the answer.
        assert!(cache.lookup(&gw, "q").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache.store(&gw, "q", &record("a"), true).await;
        let _ = cache.lookup(&gw, "q").await;
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.exact_size, 0);
        assert_eq!(stats.semantic_size, 0);
        assert_eq!(stats.exact_hits, 0);
        assert!(cache.lookup(&gw, "q").await.is_none());
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let provider = Arc::new(CountingProvider::new());
        let gw = gateway(Arc::clone(&provider));
        let cache = SmartCache::new(config());

        cache.store(&gw, "q", &record("a"), false).await;
        let _ = cache.lookup(&gw, "q").await;
        let _ = cache.lookup(&gw, "other").await;
        let stats = cache.stats();
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }
}
