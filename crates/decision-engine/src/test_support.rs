//! Stub collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broker_trait::{BrokerClient, BrokerOrderAck, BrokerOrderRequest, MarketDataSource};
use reasoning_client::{
    ChatRequest, ReasoningClient, ReasoningConfig, ReasoningProvider, ReasoningResult,
    DEFAULT_SYSTEM_PROMPT,
};
use risk_manager::RiskGate;
use serde_json::{json, Value};
use trade_core::{DecisionLogEntry, TradeIntent};
use trade_store::{DecisionStore, KeyValueStore, MemoryStore, StoreError, StoreResult};

use crate::guard::ActiveTradeGuard;
use crate::order_submitter::OrderSubmitter;
use crate::pipeline::DecisionPipeline;

pub fn intent(entry: &str, stop: &str, qty: u32) -> TradeIntent {
    TradeIntent::from_payload(&payload(entry, stop, qty)).unwrap()
}

pub fn payload(entry: &str, stop: &str, qty: u32) -> Value {
    json!({
        "exchange": "NFO",
        "tradingsymbol": "NIFTY24JUN19500CE",
        "qty": qty,
        "transaction_type": "BUY",
        "entry": entry,
        "stoploss": stop
    })
}

enum BrokerMode {
    Accept,
    Reject(String),
    Hang,
}

/// Broker double that counts every `place_order` call.
pub struct CountingBroker {
    mode: BrokerMode,
    calls: AtomicUsize,
    delay: Duration,
    last: Mutex<Option<BrokerOrderRequest>>,
}

impl CountingBroker {
    fn with_mode(mode: BrokerMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            last: Mutex::new(None),
        }
    }

    pub fn accepting() -> Self {
        Self::with_mode(BrokerMode::Accept)
    }

    pub fn rejecting(message: &str) -> Self {
        Self::with_mode(BrokerMode::Reject(message.to_string()))
    }

    pub fn hanging() -> Self {
        Self::with_mode(BrokerMode::Hang)
    }

    /// Accepts after `delay`, so concurrent callers overlap.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::accepting()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<BrokerOrderRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerClient for CountingBroker {
    async fn place_order(&self, order: BrokerOrderRequest) -> Result<BrokerOrderAck> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last.lock().unwrap() = Some(order);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.mode {
            BrokerMode::Accept => Ok(BrokerOrderAck {
                order_id: format!("ORD-{}", n),
                raw: json!({ "status": "success" }),
            }),
            BrokerMode::Reject(message) => Err(anyhow!("{}", message)),
            BrokerMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("unreachable"))
            }
        }
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "counting"
    }
}

/// Reasoning provider that replays canned replies, then repeats the last.
pub struct Scripted {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl Scripted {
    pub fn always(reply: &str) -> Self {
        Self::sequence(&[reply])
    }

    pub fn sequence(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl ReasoningProvider for Scripted {
    async fn complete(&self, _request: &ChatRequest) -> ReasoningResult<String> {
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = reply;
        }
        Ok(last.clone())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub struct StaticMarket;

#[async_trait]
impl MarketDataSource for StaticMarket {
    async fn get_snapshot(&self, symbol: &str) -> Result<Value> {
        Ok(json!({ "symbol": symbol, "last_price": 19500.0 }))
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

pub struct DownMarket;

#[async_trait]
impl MarketDataSource for DownMarket {
    async fn get_snapshot(&self, _symbol: &str) -> Result<Value> {
        Err(anyhow!("quote endpoint unreachable"))
    }

    fn source_name(&self) -> &str {
        "down"
    }
}

/// Every call fails as if the backing service were down.
pub struct FailingStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }

    async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
        down()
    }

    async fn set_if_absent(&self, _key: &str, _value: &str) -> StoreResult<bool> {
        down()
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        down()
    }

    fn kv_backend(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl DecisionStore for FailingStore {
    async fn append(&self, _entry: &DecisionLogEntry) -> StoreResult<()> {
        down()
    }

    async fn recent(&self, _limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        down()
    }

    fn log_backend(&self) -> &'static str {
        "failing"
    }
}

pub fn reasoning_config() -> ReasoningConfig {
    ReasoningConfig {
        api_key: "test".to_string(),
        base_url: "http://unused".to_string(),
        model: "test-model".to_string(),
        max_tokens: 500,
        temperature: 0.0,
        timeout: Duration::from_secs(5),
        system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

pub fn reasoning(provider: Scripted) -> ReasoningClient {
    ReasoningClient::new(Arc::new(provider), reasoning_config())
}

pub struct Parts {
    pub broker: Arc<CountingBroker>,
    pub kv: Arc<MemoryStore>,
    pub log: Arc<MemoryStore>,
}

pub fn build(
    provider: Scripted,
    market: Arc<dyn MarketDataSource>,
    broker: Arc<CountingBroker>,
    kv: Arc<dyn KeyValueStore>,
    log: Arc<dyn DecisionStore>,
) -> DecisionPipeline {
    DecisionPipeline::new(
        reasoning(provider),
        market,
        RiskGate::default(),
        ActiveTradeGuard::new(kv),
        OrderSubmitter::new(broker, Duration::from_secs(1)),
        log,
    )
}

/// Pipeline over in-memory stores and an accepting broker.
pub fn pipeline_with(provider: Scripted) -> (DecisionPipeline, Parts) {
    pipeline_with_broker(provider, CountingBroker::accepting())
}

pub fn pipeline_with_broker(
    provider: Scripted,
    broker: CountingBroker,
) -> (DecisionPipeline, Parts) {
    let parts = Parts {
        broker: Arc::new(broker),
        kv: Arc::new(MemoryStore::new()),
        log: Arc::new(MemoryStore::new()),
    };
    let pipeline = build(
        provider,
        Arc::new(StaticMarket),
        parts.broker.clone(),
        parts.kv.clone(),
        parts.log.clone(),
    );
    (pipeline, parts)
}
