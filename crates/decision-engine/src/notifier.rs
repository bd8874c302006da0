use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use trade_core::{Decision, Outcome};

use crate::config::AppConfig;

/// What gets announced after each pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub decision: Option<Decision>,
    pub outcome: Outcome,
}

impl DecisionEvent {
    pub fn brief(&self) -> String {
        let (kind, qty) = match &self.decision {
            Some(d) => (d.decision.as_str(), d.qty.to_string()),
            None => ("-", "-".to_string()),
        };
        let mut text = format!(
            "[DeepakLab] {} | {} | decision={} | qty={} | outcome={}",
            self.ts.format("%Y-%m-%d %H:%M:%S"),
            self.symbol,
            kind,
            qty,
            self.outcome.status()
        );
        if let Some(reason) = self.outcome.reject_reason() {
            text.push_str(&format!(" ({})", reason));
        }
        if let Some(reference) = self.outcome.order().and_then(|o| o.broker_reference.as_deref()) {
            text.push_str(&format!(" ref={}", reference));
        }
        text
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DecisionEvent) -> Result<()>;

    fn name(&self) -> &'static str;
}

pub fn is_valid_webhook_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(8)).build()?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &DecisionEvent) -> Result<()> {
        if !is_valid_webhook_url(&self.url) {
            tracing::warn!("Webhook URL has no http(s) scheme, skipping: {}", self.url);
            return Ok(());
        }

        let payload = json!({
            "ts": event.ts,
            "symbol": event.symbol,
            "ai": event.decision,
            "outcome": event.outcome,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("webhook returned {}: {}", status, text));
        }

        tracing::debug!("Webhook notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            token,
            chat_id,
            api_base: "https://api.telegram.org".to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &DecisionEvent) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": self.chat_id, "text": event.brief() }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Telegram returned {}: {}", status, text));
        }

        tracing::debug!("Telegram notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// Best-effort fan-out. Failures are logged and swallowed.
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut set = Self::new();
        if let Some(url) = &config.webhook_url {
            set = set.with(Arc::new(WebhookNotifier::new(url.clone())?));
        }
        if let (Some(token), Some(chat_id)) = (&config.telegram_token, &config.telegram_chat_id) {
            set = set.with(Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())?));
        }
        Ok(set)
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub async fn notify_all(&self, event: &DecisionEvent) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event).await {
                tracing::warn!("{} notification failed: {:#}", notifier.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trade_core::{OrderResult, RejectReason};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> DecisionEvent {
        DecisionEvent {
            ts: Utc::now(),
            symbol: "NIFTY".to_string(),
            decision: Some(Decision::flat("NIFTY", "range bound")),
            outcome: Outcome::rejected(RejectReason::FlatDecision),
        }
    }

    #[test]
    fn brief_mentions_decision_and_outcome() {
        let text = event().brief();
        assert!(text.contains("NIFTY"));
        assert!(text.contains("decision=FLAT"));
        assert!(text.contains("outcome=rejected (flat-decision)"));

        let placed = DecisionEvent {
            outcome: Outcome::Placed {
                order: OrderResult::placed("151220000000000", 2500.into()),
            },
            ..event()
        };
        assert!(placed.brief().contains("ref=151220000000000"));
    }

    #[test]
    fn webhook_scheme_check() {
        assert!(is_valid_webhook_url("https://hooks.example.com/x"));
        assert!(is_valid_webhook_url("http://localhost:9000"));
        assert!(!is_valid_webhook_url("hooks.example.com/x"));
    }

    #[tokio::test]
    async fn webhook_posts_decision() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({"symbol": "NIFTY", "ai": {"decision": "FLAT"}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let hook = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        hook.notify(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_webhook_is_skipped() {
        let hook = WebhookNotifier::new("hooks.example.com/x".to_string()).unwrap();
        assert!(hook.notify(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn telegram_failure_is_swallowed_by_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .expect(1)
            .mount(&server)
            .await;

        let telegram = TelegramNotifier::new("TOKEN".into(), "42".into())
            .unwrap()
            .with_api_base(server.uri());
        assert!(telegram.notify(&event()).await.is_err());

        let set = NotifierSet::new().with(Arc::new(
            TelegramNotifier::new("OTHER".into(), "42".into())
                .unwrap()
                .with_api_base(server.uri()),
        ));
        assert_eq!(set.len(), 1);
        set.notify_all(&event()).await;
    }
}
