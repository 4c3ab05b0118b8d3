//! Chat-completion provider used by the classifier

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failures reported by a completion provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// HTTP 429 or a quota/rate-limit error body
    #[error("Provider rate limit: {0}")]
    RateLimited(String),

    #[error("Provider error: {0}")]
    Api(String),

    #[error("Provider returned an empty completion")]
    EmptyCompletion,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u16,
    ) -> std::result::Result<String, ProviderError>;
}

/// OpenAI chat-completions provider
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: OpenAIConfig, model: impl Into<String>) -> Self {
        // The classifier owns retry and backoff; async-openai would otherwise
        // silently retry 429s for up to 15 minutes
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(config).with_backoff(no_retry),
            model: model.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u16,
    ) -> std::result::Result<String, ProviderError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(map_openai_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(map_openai_error)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .max_tokens(max_tokens)
            .messages(messages)
            .build()
            .map_err(map_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }

        debug!(chars = content.len(), "Completion received");
        Ok(content)
    }
}

/// Map an async-openai error, separating rate-limit signals from the rest
pub fn map_openai_error(error: OpenAIError) -> ProviderError {
    match error {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let code = api
                .code
                .as_ref()
                .map(|c| c.to_string().trim_matches('"').to_string())
                .unwrap_or_default();

            if is_rate_limit_signal(&kind, &code, &api.message) {
                ProviderError::RateLimited(api.message)
            } else {
                ProviderError::Api(api.message)
            }
        }
        OpenAIError::Reqwest(err) => {
            if err.status().map(|s| s.as_u16()) == Some(429) {
                ProviderError::RateLimited(err.to_string())
            } else {
                ProviderError::Api(err.to_string())
            }
        }
        other => ProviderError::Api(other.to_string()),
    }
}

/// OpenAI reports 429s with these error types/codes in the body
fn is_rate_limit_signal(kind: &str, code: &str, message: &str) -> bool {
    const SIGNALS: &[&str] = &["rate_limit_exceeded", "insufficient_quota", "requests", "tokens"];

    SIGNALS.contains(&kind)
        || SIGNALS.contains(&code)
        || message.to_lowercase().contains("rate limit")
}
