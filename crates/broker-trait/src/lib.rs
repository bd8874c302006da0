use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Unified broker types (broker-agnostic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrokerOrderSide {
    Buy,
    Sell,
}

impl BrokerOrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerOrderSide::Buy => "BUY",
            BrokerOrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrokerOrderType {
    Market,
    Limit,
}

impl BrokerOrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerOrderType::Market => "MARKET",
            BrokerOrderType::Limit => "LIMIT",
        }
    }
}

/// Normalized order parameters handed to a broker adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderRequest {
    pub exchange: String,
    pub trading_symbol: String,
    pub transaction_type: BrokerOrderSide,
    pub quantity: u32,
    pub product: String,
    pub order_type: BrokerOrderType,
    pub price: Option<Decimal>,
}

impl BrokerOrderRequest {
    pub fn market(
        exchange: impl Into<String>,
        trading_symbol: impl Into<String>,
        side: BrokerOrderSide,
        quantity: u32,
        product: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            trading_symbol: trading_symbol.into(),
            transaction_type: side,
            quantity,
            product: product.into(),
            order_type: BrokerOrderType::Market,
            price: None,
        }
    }

    pub fn limit(mut self, price: Decimal) -> Self {
        self.order_type = BrokerOrderType::Limit;
        self.price = Some(price);
        self
    }
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderAck {
    pub order_id: String,
    /// Untouched broker response body, kept for audit.
    #[serde(default)]
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Place an order. Any broker-side rejection comes back as `Err`.
    async fn place_order(&self, order: BrokerOrderRequest) -> Result<BrokerOrderAck>;

    /// Whether orders go to a paper/sandbox account
    fn is_paper(&self) -> bool;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Market data trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Opaque snapshot (quote, OHLC, option chain...) for one symbol.
    async fn get_snapshot(&self, symbol: &str) -> Result<serde_json::Value>;

    fn source_name(&self) -> &str;
}
