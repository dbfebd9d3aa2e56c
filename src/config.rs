//! Pipeline configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Default number of context chunks surfaced to the LLM.
const DEFAULT_RETRIEVE_K: usize = 5;
/// Default RRF rank constant.
const DEFAULT_RRF_K: u32 = 60;
/// Default fusion weight for each retriever.
const DEFAULT_FUSION_WEIGHT: f64 = 0.5;
/// Default vector-hit similarity cutoff.
const DEFAULT_MIN_SIMILARITY: f32 = 0.5;
/// Default navigation rounds.
const DEFAULT_NAVIGATOR_MAX_ROUNDS: usize = 3;
/// Default navigation token budget.
const DEFAULT_NAVIGATOR_TARGET_TOKENS: usize = 2000;
/// Default semantic-cache similarity cutoff.
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.95;
/// Default exact-cache TTL (7 days).
const DEFAULT_EXACT_TTL_SECS: u64 = 7 * 24 * 3600;
/// Default semantic-cache TTL (3 days).
const DEFAULT_SEMANTIC_TTL_SECS: u64 = 3 * 24 * 3600;
/// Default per-namespace exact-cache capacity.
const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
/// Default request-wide deadline.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;

/// Retry, batching, and deadline knobs for the LLM gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Retry attempts for chat and embedding calls.
    pub max_attempts: u32,
    /// Base backoff for chat retries.
    pub chat_backoff_base: Duration,
    /// Backoff cap for chat retries.
    pub chat_backoff_cap: Duration,
    /// Base backoff for embedding retries.
    pub embed_backoff_base: Duration,
    /// Backoff cap for embedding retries.
    pub embed_backoff_cap: Duration,
    /// Fixed wait after an explicit throttle signal.
    pub throttle_delay: Duration,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Insert the adaptive delay between embedding batches.
    pub shape_embed_rate: bool,
    /// Per-call deadline for chat completions.
    pub chat_timeout: Duration,
    /// Per-call deadline for embedding requests.
    pub embed_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            chat_backoff_base: Duration::from_secs(2),
            chat_backoff_cap: Duration::from_secs(60),
            embed_backoff_base: Duration::from_secs(3),
            embed_backoff_cap: Duration::from_secs(120),
            throttle_delay: Duration::from_secs(10),
            embed_batch_size: 10,
            shape_embed_rate: true,
            chat_timeout: Duration::from_secs(60),
            embed_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    /// A configuration with zero delays, for tests that exercise the retry
    /// loop without real waiting.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            chat_backoff_base: Duration::ZERO,
            chat_backoff_cap: Duration::ZERO,
            embed_backoff_base: Duration::ZERO,
            embed_backoff_cap: Duration::ZERO,
            throttle_delay: Duration::ZERO,
            shape_embed_rate: false,
            ..Self::default()
        }
    }
}

/// Configuration for the RAG pipeline.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Root directory containing `databases/`.
    pub data_root: PathBuf,
    /// Final number of context chunks surfaced to the LLM.
    pub retrieve_k: usize,
    /// Enable lexical retrieval.
    pub use_bm25: bool,
    /// Enable vector retrieval.
    pub use_vector: bool,
    /// RRF rank constant.
    pub rrf_k: u32,
    /// Fusion weight for BM25 ranks.
    pub bm25_weight: f64,
    /// Fusion weight for vector ranks.
    pub vector_weight: f64,
    /// Vector-hit similarity cutoff.
    pub min_similarity: f32,
    /// Maximum navigation rounds.
    pub navigator_max_rounds: usize,
    /// Navigation token budget.
    pub navigator_target_tokens: usize,
    /// Semantic-cache similarity cutoff.
    pub semantic_threshold: f32,
    /// Exact-cache entry lifetime.
    pub exact_ttl: Duration,
    /// Semantic-cache entry lifetime.
    pub semantic_ttl: Duration,
    /// Per-namespace exact-cache capacity (semantic tier gets half).
    pub cache_max_size: usize,
    /// Request-wide deadline for one question.
    pub request_timeout: Duration,
    /// Fast model for query analysis and routing.
    pub fast_model: String,
    /// Mid-quality model for answer generation.
    pub mid_model: String,
    /// Higher-quality model for answer verification.
    pub verifier_model: String,
    /// Embedding model.
    pub embed_model: String,
    /// Gateway retry/batching/deadline knobs.
    pub gateway: GatewayConfig,
}

impl RagConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Creates a configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an override fails validation.
    pub fn from_env() -> Result<Self, Error> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    data_root: Option<PathBuf>,
    retrieve_k: Option<usize>,
    use_bm25: Option<bool>,
    use_vector: Option<bool>,
    rrf_k: Option<u32>,
    bm25_weight: Option<f64>,
    vector_weight: Option<f64>,
    min_similarity: Option<f32>,
    navigator_max_rounds: Option<usize>,
    navigator_target_tokens: Option<usize>,
    semantic_threshold: Option<f32>,
    exact_ttl: Option<Duration>,
    semantic_ttl: Option<Duration>,
    cache_max_size: Option<usize>,
    request_timeout: Option<Duration>,
    fast_model: Option<String>,
    mid_model: Option<String>,
    verifier_model: Option<String>,
    embed_model: Option<String>,
    gateway: Option<GatewayConfig>,
}

impl RagConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.data_root.is_none() {
            self.data_root = std::env::var("RAGCORE_DATA_ROOT").ok().map(PathBuf::from);
        }
        if self.retrieve_k.is_none() {
            self.retrieve_k = std::env::var("RAGCORE_RETRIEVE_K")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.fast_model.is_none() {
            self.fast_model = std::env::var("RAGCORE_FAST_MODEL").ok();
        }
        if self.mid_model.is_none() {
            self.mid_model = std::env::var("RAGCORE_MID_MODEL").ok();
        }
        if self.verifier_model.is_none() {
            self.verifier_model = std::env::var("RAGCORE_VERIFIER_MODEL").ok();
        }
        if self.embed_model.is_none() {
            self.embed_model = std::env::var("RAGCORE_EMBED_MODEL").ok();
        }
        self
    }

    /// Sets the data root directory.
    #[must_use]
    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    /// Sets the number of context chunks surfaced to the LLM.
    #[must_use]
    pub const fn retrieve_k(mut self, k: usize) -> Self {
        self.retrieve_k = Some(k);
        self
    }

    /// Enables or disables lexical retrieval.
    #[must_use]
    pub const fn use_bm25(mut self, enabled: bool) -> Self {
        self.use_bm25 = Some(enabled);
        self
    }

    /// Enables or disables vector retrieval.
    #[must_use]
    pub const fn use_vector(mut self, enabled: bool) -> Self {
        self.use_vector = Some(enabled);
        self
    }

    /// Sets the RRF rank constant.
    #[must_use]
    pub const fn rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = Some(k);
        self
    }

    /// Sets the fusion weights.
    #[must_use]
    pub const fn fusion_weights(mut self, bm25: f64, vector: f64) -> Self {
        self.bm25_weight = Some(bm25);
        self.vector_weight = Some(vector);
        self
    }

    /// Sets the vector-hit similarity cutoff.
    #[must_use]
    pub const fn min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = Some(threshold);
        self
    }

    /// Sets the maximum navigation rounds.
    #[must_use]
    pub const fn navigator_max_rounds(mut self, rounds: usize) -> Self {
        self.navigator_max_rounds = Some(rounds);
        self
    }

    /// Sets the navigation token budget.
    #[must_use]
    pub const fn navigator_target_tokens(mut self, tokens: usize) -> Self {
        self.navigator_target_tokens = Some(tokens);
        self
    }

    /// Sets the semantic-cache similarity cutoff.
    #[must_use]
    pub const fn semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = Some(threshold);
        self
    }

    /// Sets the cache TTLs.
    #[must_use]
    pub const fn cache_ttls(mut self, exact: Duration, semantic: Duration) -> Self {
        self.exact_ttl = Some(exact);
        self.semantic_ttl = Some(semantic);
        self
    }

    /// Sets the per-namespace exact-cache capacity.
    #[must_use]
    pub const fn cache_max_size(mut self, size: usize) -> Self {
        self.cache_max_size = Some(size);
        self
    }

    /// Sets the request-wide deadline.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the fast (analysis/routing) model.
    #[must_use]
    pub fn fast_model(mut self, model: impl Into<String>) -> Self {
        self.fast_model = Some(model.into());
        self
    }

    /// Sets the mid-quality (generation) model.
    #[must_use]
    pub fn mid_model(mut self, model: impl Into<String>) -> Self {
        self.mid_model = Some(model.into());
        self
    }

    /// Sets the verifier model.
    #[must_use]
    pub fn verifier_model(mut self, model: impl Into<String>) -> Self {
        self.verifier_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    /// Sets the gateway configuration.
    #[must_use]
    pub fn gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Builds the [`RagConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when weights or thresholds are out of
    /// range.
    pub fn build(self) -> Result<RagConfig, Error> {
        let bm25_weight = self.bm25_weight.unwrap_or(DEFAULT_FUSION_WEIGHT);
        let vector_weight = self.vector_weight.unwrap_or(DEFAULT_FUSION_WEIGHT);
        if bm25_weight < 0.0 || vector_weight < 0.0 {
            return Err(Error::Validation {
                message: "fusion weights must be non-negative".to_string(),
            });
        }

        let semantic_threshold = self.semantic_threshold.unwrap_or(DEFAULT_SEMANTIC_THRESHOLD);
        if !(0.0..=1.0).contains(&semantic_threshold) {
            return Err(Error::Validation {
                message: format!("semantic_threshold {semantic_threshold} outside [0, 1]"),
            });
        }

        let retrieve_k = self.retrieve_k.unwrap_or(DEFAULT_RETRIEVE_K);
        if retrieve_k == 0 {
            return Err(Error::Validation {
                message: "retrieve_k must be at least 1".to_string(),
            });
        }

        Ok(RagConfig {
            data_root: self.data_root.unwrap_or_else(|| PathBuf::from(".")),
            retrieve_k,
            use_bm25: self.use_bm25.unwrap_or(true),
            use_vector: self.use_vector.unwrap_or(true),
            rrf_k: self.rrf_k.unwrap_or(DEFAULT_RRF_K),
            bm25_weight,
            vector_weight,
            min_similarity: self.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY),
            navigator_max_rounds: self
                .navigator_max_rounds
                .unwrap_or(DEFAULT_NAVIGATOR_MAX_ROUNDS),
            navigator_target_tokens: self
                .navigator_target_tokens
                .unwrap_or(DEFAULT_NAVIGATOR_TARGET_TOKENS),
            semantic_threshold,
            exact_ttl: self
                .exact_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_EXACT_TTL_SECS)),
            semantic_ttl: self
                .semantic_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_SEMANTIC_TTL_SECS)),
            cache_max_size: self.cache_max_size.unwrap_or(DEFAULT_CACHE_MAX_SIZE),
            request_timeout: self
                .request_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            fast_model: self.fast_model.unwrap_or_else(|| "qwen-turbo".to_string()),
            mid_model: self.mid_model.unwrap_or_else(|| "qwen-plus".to_string()),
            verifier_model: self.verifier_model.unwrap_or_else(|| "qwen-plus".to_string()),
            embed_model: self.embed_model.unwrap_or_else(|| "text-embedding-v3".to_string()),
            gateway: self.gateway.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.retrieve_k, 5);
        assert!(config.use_bm25);
        assert!(config.use_vector);
        assert_eq!(config.rrf_k, 60);
        assert!((config.bm25_weight - 0.5).abs() < f64::EPSILON);
        assert!((config.min_similarity - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.navigator_max_rounds, 3);
        assert_eq!(config.navigator_target_tokens, 2000);
        assert!((config.semantic_threshold - 0.95).abs() < f32::EPSILON);
        assert_eq!(config.exact_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.semantic_ttl, Duration::from_secs(3 * 24 * 3600));
        assert_eq!(config.cache_max_size, 1000);
        assert_eq!(config.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = RagConfig::builder()
            .retrieve_k(8)
            .use_bm25(false)
            .rrf_k(30)
            .fusion_weights(0.7, 0.3)
            .cache_max_size(50)
            .fast_model("small")
            .build()
            .unwrap();
        assert_eq!(config.retrieve_k, 8);
        assert!(!config.use_bm25);
        assert_eq!(config.rrf_k, 30);
        assert!((config.bm25_weight - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.cache_max_size, 50);
        assert_eq!(config.fast_model, "small");
    }

    #[test]
    fn test_builder_rejects_bad_threshold() {
        let result = RagConfig::builder().semantic_threshold(1.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_retrieve_k() {
        let result = RagConfig::builder().retrieve_k(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_negative_weight() {
        let result = RagConfig::builder().fusion_weights(-0.1, 0.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_gateway_defaults() {
        let gw = GatewayConfig::default();
        assert_eq!(gw.max_attempts, 5);
        assert_eq!(gw.chat_backoff_base, Duration::from_secs(2));
        assert_eq!(gw.chat_backoff_cap, Duration::from_secs(60));
        assert_eq!(gw.embed_backoff_base, Duration::from_secs(3));
        assert_eq!(gw.embed_backoff_cap, Duration::from_secs(120));
        assert_eq!(gw.embed_batch_size, 10);
    }

    #[test]
    fn test_gateway_immediate_has_no_delays() {
        let gw = GatewayConfig::immediate();
        assert_eq!(gw.chat_backoff_base, Duration::ZERO);
        assert_eq!(gw.throttle_delay, Duration::ZERO);
        assert_eq!(gw.max_attempts, 5);
    }
}
