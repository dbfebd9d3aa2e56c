//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic requests into
//! provider-specific SDK calls and normalize failures into the
//! retryable/throttled/fatal classification the gateway's retry loop
//! acts on. Retry and backoff live in the gateway, not in providers.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};

/// How the gateway should treat a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Transient failure; retry with backoff.
    Retryable,
    /// Explicit rate-limit signal; wait the throttle delay, then retry.
    Throttled,
    /// Permanent failure; retrying cannot help.
    Fatal,
}

/// A normalized provider failure.
#[derive(Debug, Clone)]
pub struct ProviderError {
    /// Retry classification.
    pub kind: ProviderErrorKind,
    /// Human-readable message.
    pub message: String,
    /// HTTP-like status code, when one was reported.
    pub status: Option<u16>,
}

impl ProviderError {
    /// Creates a retryable error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Retryable,
            message: message.into(),
            status: None,
        }
    }

    /// Creates a throttled error.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Throttled,
            message: message.into(),
            status: None,
        }
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Fatal,
            message: message.into(),
            status: None,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer for a specific provider
/// while presenting a uniform interface to the gateway.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API failures, classified for retry.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Executes an embedding request for one batch of texts.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on API failures, classified for retry.
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        assert_eq!(
            ProviderError::retryable("x").kind,
            ProviderErrorKind::Retryable
        );
        assert_eq!(
            ProviderError::throttled("x").kind,
            ProviderErrorKind::Throttled
        );
        assert_eq!(ProviderError::fatal("x").kind, ProviderErrorKind::Fatal);
    }

    #[test]
    fn test_error_display_with_status() {
        let mut err = ProviderError::retryable("service unavailable");
        err.status = Some(503);
        assert_eq!(err.to_string(), "service unavailable (status 503)");
    }
}
