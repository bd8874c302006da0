use crate::models::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use broker_trait::{
    BrokerClient, BrokerOrderAck, BrokerOrderRequest, BrokerOrderType, MarketDataSource,
};
use reqwest::{header, Client};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";
const KITE_VERSION: &str = "3";

/// Kite Connect REST client for order placement and quotes.
pub struct KiteClient {
    client: Client,
    base_url: String,
    api_key: String,
    // Kite access tokens expire daily, so they can be swapped without a restart.
    access_token: RwLock<String>,
    quote_exchange: String,
}

impl KiteClient {
    pub fn new(
        api_key: String,
        access_token: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token: RwLock::new(access_token),
            quote_exchange: "NSE".to_string(),
        })
    }

    /// Create client from environment variables.
    /// Accepts KITE_* names with ZERODHA_* as fallbacks. A missing access
    /// token is allowed; it can be set later with [`KiteClient::set_access_token`].
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("KITE_API_KEY")
            .or_else(|_| std::env::var("ZERODHA_API_KEY"))
            .map_err(|_| anyhow!("KITE_API_KEY (or ZERODHA_API_KEY) not set"))?;
        let access_token = std::env::var("KITE_ACCESS_TOKEN")
            .or_else(|_| std::env::var("ZERODHA_ACCESS_TOKEN"))
            .unwrap_or_default();
        let base_url =
            std::env::var("KITE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs: u64 = std::env::var("BROKER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("BROKER_TIMEOUT_SECS must be an integer")?;

        let kite = Self::new(api_key, access_token, base_url, Duration::from_secs(timeout_secs))?;
        Ok(match std::env::var("KITE_QUOTE_EXCHANGE") {
            Ok(exchange) if !exchange.trim().is_empty() => {
                kite.with_quote_exchange(exchange.trim().to_ascii_uppercase())
            }
            _ => kite,
        })
    }

    /// Exchange used for bare index symbols when building quote keys.
    pub fn with_quote_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.quote_exchange = exchange.into();
        self
    }

    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = token.into();
    }

    pub async fn has_access_token(&self) -> bool {
        !self.access_token.read().await.is_empty()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn auth_headers(&self) -> Result<header::HeaderMap> {
        let token = self.access_token.read().await;
        if token.is_empty() {
            return Err(anyhow!("Kite access token not set"));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("token {}:{}", self.api_key, token))
                .context("Kite credentials contain invalid header characters")?,
        );
        headers.insert("X-Kite-Version", header::HeaderValue::from_static(KITE_VERSION));
        Ok(headers)
    }

    /// Quote key for a symbol. `EXCHANGE:SYMBOL` passes through, known index
    /// names map to Kite's index instruments.
    pub fn instrument_key(&self, symbol: &str) -> String {
        let symbol = symbol.trim();
        if symbol.contains(':') {
            return symbol.to_string();
        }
        let name = match symbol.to_ascii_uppercase().as_str() {
            "NIFTY" | "NIFTY50" => "NIFTY 50".to_string(),
            "BANKNIFTY" => "NIFTY BANK".to_string(),
            "FINNIFTY" => "NIFTY FIN SERVICE".to_string(),
            other => other.to_string(),
        };
        format!("{}:{}", self.quote_exchange, name)
    }

    /// Place a regular-variety order.
    pub async fn submit_order(&self, form: &KiteOrderForm) -> Result<String> {
        let url = format!("{}/orders/regular", self.base_url);

        tracing::info!(
            "Submitting order to Kite: {} {} x{} {}",
            form.transaction_type,
            form.tradingsymbol,
            form.quantity,
            form.order_type
        );

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers().await?)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Kite order failed ({}): {}", status, body));
        }

        match serde_json::from_str::<KiteResponse<OrderData>>(&body) {
            Ok(KiteResponse::Success { data }) => {
                tracing::info!("Order placed successfully: {}", data.order_id);
                Ok(data.order_id)
            }
            Ok(KiteResponse::Error {
                message,
                error_type,
            }) => Err(anyhow!(
                "Kite order rejected: {} ({})",
                message,
                error_type.unwrap_or_else(|| "unknown".to_string())
            )),
            Err(e) => Err(anyhow!("Unexpected Kite order response: {} ({})", body, e)),
        }
    }

    /// Full quote for one instrument key.
    pub async fn get_quote(&self, key: &str) -> Result<Value> {
        let url = format!("{}/quote", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers().await?)
            .query(&[("i", key)])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Failed to get quote for {}: {}", key, error_text));
        }

        match response.json::<KiteResponse<QuoteData>>().await? {
            KiteResponse::Success { mut data } => data
                .remove(key)
                .ok_or_else(|| anyhow!("No quote returned for {}", key)),
            KiteResponse::Error { message, .. } => {
                Err(anyhow!("Kite quote error for {}: {}", key, message))
            }
        }
    }
}

/// Keep only the fields worth sending to the reasoning service.
pub fn compact_quote(symbol: &str, instrument: &str, quote: &Value) -> Value {
    let mut out = Map::new();
    out.insert("symbol".to_string(), json!(symbol));
    out.insert("instrument".to_string(), json!(instrument));
    if let Some(obj) = quote.as_object() {
        for field in SNAPSHOT_FIELDS {
            if let Some(v) = obj.get(*field) {
                out.insert((*field).to_string(), v.clone());
            }
        }
    }
    Value::Object(out)
}

fn to_order_form(req: &BrokerOrderRequest) -> Result<KiteOrderForm> {
    let price = match req.order_type {
        BrokerOrderType::Limit => Some(
            req.price
                .ok_or_else(|| anyhow!("LIMIT order for {} has no price", req.trading_symbol))?
                .to_string(),
        ),
        BrokerOrderType::Market => None,
    };

    Ok(KiteOrderForm {
        exchange: req.exchange.clone(),
        tradingsymbol: req.trading_symbol.clone(),
        transaction_type: req.transaction_type.as_str().to_string(),
        quantity: req.quantity,
        product: req.product.clone(),
        order_type: req.order_type.as_str().to_string(),
        validity: "DAY".to_string(),
        price,
    })
}

#[async_trait]
impl BrokerClient for KiteClient {
    async fn place_order(&self, order: BrokerOrderRequest) -> Result<BrokerOrderAck> {
        let form = to_order_form(&order)?;
        let order_id = self.submit_order(&form).await?;
        Ok(BrokerOrderAck {
            raw: json!({ "order_id": order_id }),
            order_id,
        })
    }

    fn is_paper(&self) -> bool {
        false
    }

    fn broker_name(&self) -> &str {
        "kite"
    }
}

#[async_trait]
impl MarketDataSource for KiteClient {
    async fn get_snapshot(&self, symbol: &str) -> Result<Value> {
        let key = self.instrument_key(symbol);
        let quote = self.get_quote(&key).await?;
        Ok(compact_quote(symbol, &key, &quote))
    }

    fn source_name(&self) -> &str {
        "kite"
    }
}
