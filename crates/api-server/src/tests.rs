use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use broker_trait::{BrokerClient, BrokerOrderAck, BrokerOrderRequest, MarketDataSource};
use decision_engine::{ActiveTradeGuard, AppConfig, DecisionPipeline, OrderSubmitter};
use reasoning_client::{
    ChatRequest, ReasoningClient, ReasoningConfig, ReasoningProvider, ReasoningResult,
    DEFAULT_SYSTEM_PROMPT,
};
use risk_manager::RiskGate;
use serde_json::{json, Value};
use tower::ServiceExt;
use trade_store::MemoryStore;

use super::*;

const TOKEN: &str = "s3cret";
const FLAT: &str = r#"{"decision":"FLAT","instrument":"NIFTY","qty":0,"entry_price":null,"stoploss":null,"rationale":"no edge","confidence_percent":35}"#;

struct Reply(&'static str);

#[async_trait]
impl ReasoningProvider for Reply {
    async fn complete(&self, _request: &ChatRequest) -> ReasoningResult<String> {
        Ok(self.0.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "reply"
    }
}

#[derive(Default)]
struct Broker {
    calls: AtomicUsize,
}

#[async_trait]
impl BrokerClient for Broker {
    async fn place_order(&self, _order: BrokerOrderRequest) -> Result<BrokerOrderAck> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BrokerOrderAck {
            order_id: format!("ORD-{}", n),
            raw: json!({ "status": "success" }),
        })
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "test"
    }
}

struct Market;

#[async_trait]
impl MarketDataSource for Market {
    async fn get_snapshot(&self, symbol: &str) -> Result<Value> {
        Ok(json!({ "symbol": symbol, "last_price": 19500.0 }))
    }

    fn source_name(&self) -> &str {
        "test"
    }
}

fn test_app(admin_token: Option<&str>) -> (Router, Arc<Broker>) {
    let config = AppConfig {
        admin_token: admin_token.map(str::to_string),
        ..AppConfig::default()
    };
    let broker = Arc::new(Broker::default());
    let store = Arc::new(MemoryStore::new());
    let reasoning = ReasoningClient::new(
        Arc::new(Reply(FLAT)),
        ReasoningConfig {
            api_key: "test".to_string(),
            base_url: "http://unused".to_string(),
            model: "test-model".to_string(),
            max_tokens: 500,
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        },
    );

    let pipeline = DecisionPipeline::new(
        reasoning,
        Arc::new(Market),
        RiskGate::new(config.max_allowed_loss),
        ActiveTradeGuard::new(store.clone()),
        OrderSubmitter::new(broker.clone(), Duration::from_secs(1)),
        store,
    );

    (app(AppState::new(config, Arc::new(pipeline))), broker)
}

fn trade_body(entry: &str, stop: &str, qty: u32) -> Value {
    json!({
        "exchange": "NFO",
        "tradingsymbol": "NIFTY24JUN19500CE",
        "qty": qty,
        "transaction_type": "BUY",
        "entry": entry,
        "stoploss": stop
    })
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(auth::ADMIN_TOKEN_HEADER, token);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_needs_no_token() {
    let (app, _) = test_app(None);
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn admin_routes_forbidden_without_server_token() {
    let (app, _) = test_app(None);
    let (status, body) = send(&app, Method::GET, "/latest", Some("anything"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "admin token not set on server");
}

#[tokio::test]
async fn missing_and_wrong_tokens_are_refused() {
    let (app, broker) = test_app(Some(TOKEN));

    let (status, _) = send(
        &app,
        Method::POST,
        "/trade",
        None,
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/trade",
        Some("nope"),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    assert_eq!(broker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_accepted_from_query() {
    let (app, _) = test_app(Some(TOKEN));
    let uri = format!("/decisions?token={}", TOKEN);
    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn latest_is_404_until_something_is_logged() {
    let (app, _) = test_app(Some(TOKEN));

    let (status, body) = send(&app, Method::GET, "/latest", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no data");

    send(
        &app,
        Method::POST,
        "/simulate_trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/latest", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["symbol"], "NIFTY24JUN19500CE");
    assert_eq!(body["data"]["outcome"]["status"], "simulated");
}

#[tokio::test]
async fn simulate_trade_never_reaches_broker() {
    let (app, broker) = test_app(Some(TOKEN));

    let (status, body) = send(
        &app,
        Method::POST,
        "/simulate_trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["outcome"]["status"], "simulated");
    assert!(body["data"]["outcome"]["order"]["broker_reference"]
        .as_str()
        .unwrap()
        .starts_with("SIM-"));
    assert_eq!(broker.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn simulate_trade_over_limit_is_rejected() {
    let (app, _) = test_app(Some(TOKEN));

    // 250 points x 50 = 12500 > 11000
    let (status, body) = send(
        &app,
        Method::POST,
        "/simulate_trade",
        Some(TOKEN),
        Some(trade_body("19500", "19250", 50)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let outcome = &body["data"]["outcome"];
    assert_eq!(outcome["status"], "rejected");
    assert_eq!(outcome["reason"]["code"], "worst-case-loss-exceeds-limit");
}

#[tokio::test]
async fn live_trade_sets_flag_and_blocks_until_cleared() {
    let (app, broker) = test_app(Some(TOKEN));

    let (_, body) = send(
        &app,
        Method::POST,
        "/trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(body["data"]["outcome"]["status"], "placed");
    assert_eq!(body["data"]["outcome"]["order"]["broker_reference"], "ORD-1");

    let (_, body) = send(&app, Method::GET, "/admin/active_trade", Some(TOKEN), None).await;
    assert_eq!(body["data"]["active"], true);
    assert_eq!(body["data"]["flag"]["trading_symbol"], "NIFTY24JUN19500CE");

    let (_, body) = send(
        &app,
        Method::POST,
        "/trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(body["data"]["outcome"]["reason"]["code"], "single-active-trade-exists");
    assert_eq!(broker.calls.load(Ordering::SeqCst), 1);

    let (_, body) = send(&app, Method::POST, "/admin/clear_active_trade", Some(TOKEN), None).await;
    assert_eq!(body["data"]["cleared"], true);

    let (_, body) = send(&app, Method::GET, "/admin/active_trade", Some(TOKEN), None).await;
    assert_eq!(body["data"]["active"], false);

    let (_, body) = send(
        &app,
        Method::POST,
        "/trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    assert_eq!(body["data"]["outcome"]["status"], "placed");
    assert_eq!(broker.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn predict_flat_is_logged_without_order() {
    let (app, broker) = test_app(Some(TOKEN));

    let (status, body) = send(
        &app,
        Method::POST,
        "/predict?symbol=banknifty",
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["reason"]["code"], "flat-decision");
    assert_eq!(body["data"]["logged"], true);
    assert_eq!(broker.calls.load(Ordering::SeqCst), 0);

    let (_, body) = send(&app, Method::GET, "/latest", Some(TOKEN), None).await;
    assert_eq!(body["data"]["symbol"], "BANKNIFTY");
}

#[tokio::test]
async fn decisions_are_newest_first_and_limited() {
    let (app, _) = test_app(Some(TOKEN));

    send(
        &app,
        Method::POST,
        "/simulate_trade",
        Some(TOKEN),
        Some(trade_body("19500", "19450", 50)),
    )
    .await;
    send(&app, Method::POST, "/predict?symbol=NIFTY", Some(TOKEN), None).await;

    let (_, body) = send(&app, Method::GET, "/decisions", Some(TOKEN), None).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["symbol"], "NIFTY");

    let (_, body) = send(&app, Method::GET, "/decisions?limit=1", Some(TOKEN), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn scheduler_controls() {
    let (app, _) = test_app(Some(TOKEN));

    let (_, body) = send(&app, Method::POST, "/pause", Some(TOKEN), None).await;
    assert_eq!(body["data"]["paused"], true);

    // run-now still runs while paused
    let (status, body) = send(&app, Method::POST, "/run-now", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["runs"], 1);
    assert_eq!(body["data"]["reports"][0]["outcome"]["reason"]["code"], "flat-decision");

    let (_, body) = send(&app, Method::POST, "/resume", Some(TOKEN), None).await;
    assert_eq!(body["data"]["paused"], false);
}
