//! LLM gateway: one synchronous-looking interface for chat-completion and
//! embedding requests, with retry, backoff, and rate shaping.
//!
//! The gateway composes retry behavior around the [`LlmProvider`] trait
//! instead of baking it into providers: transient failures back off
//! exponentially, explicit throttle signals wait a fixed delay, and fatal
//! failures stop immediately. Embedding calls are batched with an adaptive
//! inter-batch delay so bulk ingestion stays under provider rate limits.
//!
//! The gateway is stateless aside from its configuration and is safe to
//! share across request tasks behind an `Arc`.

mod message;
mod openai;
mod provider;

pub use message::{
    ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Role, TextType,
    TokenUsage, system_message, user_message,
};
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, ProviderError, ProviderErrorKind};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Unicode range for CJK Unified Ideographs.
const CJK_START: char = '\u{4e00}';
/// End of the CJK Unified Ideographs range.
const CJK_END: char = '\u{9fff}';

/// LLM gateway wrapping a provider with retry and rate shaping.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    config: GatewayConfig,
}

impl LlmGateway {
    /// Creates a gateway over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        Self { provider, config }
    }

    /// Provider name, for logging.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Executes a chat completion with retry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] after exhausting retries or on a
    /// fatal provider error.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, GatewayError> {
        let mut last_message = String::new();
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(
                    self.config.chat_backoff_base,
                    self.config.chat_backoff_cap,
                    attempt - 1,
                );
                tokio::time::sleep(delay).await;
            }

            match self.call_chat_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    debug!(
                        attempt,
                        kind = ?err.kind,
                        provider = self.provider.name(),
                        "chat attempt failed: {err}"
                    );
                    last_message = err.to_string();
                    match err.kind {
                        ProviderErrorKind::Fatal => {
                            return Err(GatewayError::Upstream {
                                attempts: attempt + 1,
                                message: last_message,
                            });
                        }
                        ProviderErrorKind::Throttled => {
                            tokio::time::sleep(self.config.throttle_delay).await;
                        }
                        ProviderErrorKind::Retryable => {}
                    }
                }
            }
        }

        Err(GatewayError::Upstream {
            attempts: self.config.max_attempts,
            message: last_message,
        })
    }

    /// Convenience wrapper with the flat call signature the pipeline uses.
    ///
    /// # Errors
    ///
    /// Same as [`LlmGateway::chat`].
    pub async fn chat_text(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![system_message(system), user_message(user)],
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            json_mode: false,
        };
        Ok(self.chat(&request).await?.content)
    }

    /// Embeds texts, batching requests and normalizing every returned
    /// vector to unit length.
    ///
    /// Batches run sequentially with an adaptive delay between them:
    /// `min(0.5 + 0.2 * batch_number, 3.0)` seconds, so long ingestion
    /// runs self-throttle.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Embedding`] after exhausting retries on any
    /// batch.
    pub async fn embed(
        &self,
        model: &str,
        texts: &[String],
        text_type: TextType,
    ) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.embed_batch_size.max(1);
        let mut all = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            if batch_idx > 0 && self.config.shape_embed_rate {
                let delay = embed_batch_delay(batch_idx);
                debug!(batch = batch_idx + 1, ?delay, "inter-batch embedding delay");
                tokio::time::sleep(delay).await;
            }

            let request = EmbeddingRequest {
                model: model.to_string(),
                input: batch.to_vec(),
                text_type,
            };
            let mut response = self.embed_batch(&request).await?;
            if response.embeddings.len() != batch.len() {
                return Err(GatewayError::Embedding {
                    attempts: 1,
                    message: format!(
                        "provider returned {} embeddings for {} inputs",
                        response.embeddings.len(),
                        batch.len()
                    ),
                });
            }
            for vector in &mut response.embeddings {
                l2_normalize(vector);
            }
            all.extend(response.embeddings);
        }

        Ok(all)
    }

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Embedding`] on failure.
    pub async fn embed_one(
        &self,
        model: &str,
        text: &str,
        text_type: TextType,
    ) -> Result<Vec<f32>, GatewayError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(model, &texts, text_type).await?;
        vectors.pop().ok_or_else(|| GatewayError::Embedding {
            attempts: 1,
            message: "provider returned no embedding".to_string(),
        })
    }

    async fn call_chat_once(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        match tokio::time::timeout(self.config.chat_timeout, self.provider.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::retryable(format!(
                "chat call exceeded {}s deadline",
                self.config.chat_timeout.as_secs()
            ))),
        }
    }

    async fn embed_batch(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, GatewayError> {
        let mut last_message = String::new();
        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(
                    self.config.embed_backoff_base,
                    self.config.embed_backoff_cap,
                    attempt - 1,
                );
                tokio::time::sleep(delay).await;
            }

            let call = tokio::time::timeout(self.config.embed_timeout, self.provider.embed(request));
            match call.await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => {
                    warn!(attempt, kind = ?err.kind, "embedding attempt failed: {err}");
                    last_message = err.to_string();
                    match err.kind {
                        ProviderErrorKind::Fatal => {
                            return Err(GatewayError::Embedding {
                                attempts: attempt + 1,
                                message: last_message,
                            });
                        }
                        ProviderErrorKind::Throttled => {
                            tokio::time::sleep(self.config.throttle_delay).await;
                        }
                        ProviderErrorKind::Retryable => {}
                    }
                }
                Err(_) => {
                    last_message = format!(
                        "embedding call exceeded {}s deadline",
                        self.config.embed_timeout.as_secs()
                    );
                }
            }
        }

        Err(GatewayError::Embedding {
            attempts: self.config.max_attempts,
            message: last_message,
        })
    }
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Exponential backoff with a cap: `base * 2^attempt`, clamped to `cap`.
#[must_use]
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    cap.min(base.saturating_mul(factor))
}

/// Adaptive delay before embedding batch `batch_number` (1-based):
/// `min(0.5 + 0.2 * batch_number, 3.0)` seconds.
#[must_use]
pub fn embed_batch_delay(batch_number: usize) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let secs = (0.2f64.mul_add(batch_number as f64, 0.5)).min(3.0);
    Duration::from_secs_f64(secs)
}

/// Approximate token count used only for budgeting, never billing.
///
/// CJK ideographs count at 1.3 characters per token, everything else at
/// 4 characters per token; the result is rounded up with a floor of 1.
#[must_use]
pub fn count_tokens_approx(text: &str) -> usize {
    let mut cjk: usize = 0;
    let mut other: usize = 0;
    for c in text.chars() {
        if (CJK_START..=CJK_END).contains(&c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let estimate = (cjk as f64 / 1.3 + other as f64 / 4.0).ceil() as usize;
    estimate.max(1)
}

/// Scales a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
