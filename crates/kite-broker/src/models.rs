use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every Kite Connect response is wrapped in a `status` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum KiteResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        #[serde(default)]
        error_type: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub order_id: String,
}

/// Quote payload keyed by instrument (`"NSE:NIFTY 50"`).
pub type QuoteData = Map<String, Value>;

/// Fields kept when a full quote is shrunk into a snapshot.
pub const SNAPSHOT_FIELDS: &[&str] = &[
    "last_price",
    "ohlc",
    "net_change",
    "volume",
    "oi",
    "oi_day_high",
    "oi_day_low",
    "average_price",
    "timestamp",
    "last_trade_time",
];

/// Form body for `POST /orders/regular`.
#[derive(Debug, Clone, Serialize)]
pub struct KiteOrderForm {
    pub exchange: String,
    pub tradingsymbol: String,
    pub transaction_type: String,
    pub quantity: u32,
    pub product: String,
    pub order_type: String,
    pub validity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}
