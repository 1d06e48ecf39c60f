//! Chat-completion provider.
//!
//! The completion call is a thin wrapper around the OpenAI chat API; the
//! [`CompletionProvider`] trait exists so [`crate::chat`] can be tested
//! against a canned provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::ProviderError;
use crate::http::JsonClient;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete the conversation. `messages` already includes the system prompt.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Build the completion provider named in `config`, or `None` when disabled.
pub fn create_completion_provider(
    config: &LlmConfig,
) -> Result<Option<Arc<dyn CompletionProvider>>, ProviderError> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiCompletion::new(config)?))),
        other => Err(ProviderError::NotConfigured(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}

pub struct OpenAiCompletion {
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: String,
    http: JsonClient,
}

impl OpenAiCompletion {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ProviderError::NotConfigured("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key,
            http: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = self
            .http
            .post(OPENAI_CHAT_URL, Some(&self.api_key), &body)
            .await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String, ProviderError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::invalid("OpenAI", "missing choices[0].message.content"))
}
