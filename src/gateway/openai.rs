//! OpenAI-compatible provider implementation using the `async-openai` crate.
//!
//! Supports any API that follows the OpenAI chat/embedding spec (DashScope
//! compatible mode, Azure, local proxies) via the base URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    CreateEmbeddingRequest, EmbeddingInput, ResponseFormat,
};
use async_trait::async_trait;

use super::message::{
    ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Role, TokenUsage,
};
use super::provider::{LlmProvider, ProviderError};

/// OpenAI-compatible LLM and embedding provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider.
    ///
    /// `base_url` overrides the API endpoint for OpenAI-compatible
    /// services.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Converts our message type to the OpenAI SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    ),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an OpenAI chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            response_format,
            ..Default::default()
        }
    }

    /// Normalizes SDK errors into the retry classification.
    fn classify(err: &OpenAIError) -> ProviderError {
        match err {
            OpenAIError::ApiError(api) => {
                let kind_text = format!(
                    "{} {}",
                    api.r#type.clone().unwrap_or_default(),
                    api.message
                )
                .to_lowercase();
                if kind_text.contains("rate_limit")
                    || kind_text.contains("rate limit")
                    || kind_text.contains("throttl")
                {
                    ProviderError::throttled(api.message.clone())
                } else if kind_text.contains("server_error")
                    || kind_text.contains("overloaded")
                    || kind_text.contains("timeout")
                {
                    ProviderError::retryable(api.message.clone())
                } else {
                    ProviderError::fatal(api.message.clone())
                }
            }
            // Transport-level failures (connection reset, DNS, read timeout)
            // are worth retrying.
            OpenAIError::Reqwest(e) => ProviderError::retryable(e.to_string()),
            other => ProviderError::fatal(other.to_string()),
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| Self::classify(&e))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            request_id: Some(response.id),
        })
    }

    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let openai_request = CreateEmbeddingRequest {
            model: request.model.clone(),
            input: EmbeddingInput::StringArray(request.input.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .embeddings()
            .create(openai_request)
            .await
            .map_err(|e| Self::classify(&e))?;

        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();

        if embeddings.iter().any(Vec::is_empty) {
            return Err(ProviderError::retryable("provider returned an empty embedding"));
        }

        Ok(EmbeddingResponse {
            embeddings,
            usage: TokenUsage {
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: 0,
                total_tokens: response.usage.total_tokens,
            },
        })
    }
}
