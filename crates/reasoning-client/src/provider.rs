use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ReasoningError, ReasoningResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Transport to a reasoning service. Returns the raw assistant text; turning
/// it into a decision is the client's job.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> ReasoningResult<String>;

    fn provider_name(&self) -> &'static str;
}

/// HTTP provider for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> ReasoningResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiProvider {
    async fn complete(&self, request: &ChatRequest) -> ReasoningResult<String> {
        if self.api_key.is_empty() {
            return Err(ReasoningError::NotConfigured);
        }

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Sending chat request to {} (model {})", url, request.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ReasoningError::InvalidResponse(format!("{}: {}", e, body)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ReasoningError::InvalidResponse("no choices in response".into()))?;

        choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .ok_or_else(|| ReasoningError::InvalidResponse("choice has no content".into()))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
