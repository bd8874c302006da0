pub mod error;
pub mod parser;
pub mod provider;

pub use error::{ReasoningError, ReasoningResult};
pub use parser::parse_decision;
pub use provider::{ChatMessage, ChatRequest, OpenAiProvider, ReasoningProvider};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use trade_core::Decision;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a cautious intraday trading assistant. \
Output STRICT JSON only with keys: \
{\"decision\",\"instrument\",\"qty\",\"entry_price\",\"stoploss\",\"rationale\",\"confidence_percent\"}. \
Decision must be exactly one of: BUY, SELL, FLAT. \
Observe the max loss limit and the single-active-trade rule. \
Do NOT assume an order will be placed. If unsure, return FLAT.";

/// Configuration for the reasoning service
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub system_prompt: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("OPENAI_KEY"))
                .unwrap_or_default(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            max_tokens: env_or("OPENAI_MAX_TOKENS", 500),
            temperature: env_or("OPENAI_TEMPERATURE", 0.0),
            timeout: Duration::from_secs(env_or("REASONING_TIMEOUT_SECS", 20)),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Asks the reasoning service for a recommendation. Never fails: every error
/// path degrades to a FLAT decision that says what went wrong.
#[derive(Clone)]
pub struct ReasoningClient {
    provider: Arc<dyn ReasoningProvider>,
    config: ReasoningConfig,
}

impl ReasoningClient {
    pub fn new(provider: Arc<dyn ReasoningProvider>, config: ReasoningConfig) -> Self {
        Self { provider, config }
    }

    /// OpenAI-compatible client built from [`ReasoningConfig::default`].
    pub fn from_env() -> ReasoningResult<Self> {
        let config = ReasoningConfig::default();
        let provider = OpenAiProvider::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.timeout,
        )?;
        Ok(Self::new(Arc::new(provider), config))
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    pub fn build_request(&self, symbol: &str, snapshot: &Value) -> ChatRequest {
        let user = format!(
            "Market snapshot for {} at {}:\n{}\nReturn STRICT JSON.",
            symbol,
            chrono::Utc::now().to_rfc3339(),
            snapshot
        );
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(self.config.system_prompt.clone()),
                ChatMessage::user(user),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    pub async fn get_decision(&self, symbol: &str, snapshot: &Value) -> Decision {
        let request = self.build_request(symbol, snapshot);
        let secs = self.config.timeout.as_secs();

        let result = tokio::time::timeout(self.config.timeout, self.provider.complete(&request))
            .await
            .unwrap_or(Err(ReasoningError::Timeout(secs)));

        match result {
            Ok(text) => {
                let decision = parse_decision(symbol, &text);
                tracing::info!(
                    symbol,
                    decision = %decision.decision,
                    confidence = decision.confidence_percent,
                    "Reasoning decision received"
                );
                decision
            }
            Err(ReasoningError::NotConfigured) => {
                tracing::warn!(symbol, "Reasoning service not configured, returning FLAT");
                Decision::flat(symbol, "reasoning service not configured")
            }
            Err(ReasoningError::Request(e)) if e.is_timeout() => {
                tracing::warn!(symbol, "Reasoning request timed out after {}s", secs);
                Decision::flat(symbol, ReasoningError::Timeout(secs).to_string())
            }
            Err(e) => {
                tracing::warn!(symbol, "Reasoning call failed: {}", e);
                Decision::flat(symbol, format!("reasoning service error: {}", e))
            }
        }
    }
}
