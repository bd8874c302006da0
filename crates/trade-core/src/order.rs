use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Simulated,
    Placed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Simulated => "simulated",
            OrderStatus::Placed => "placed",
            OrderStatus::Failed => "failed",
        }
    }
}

/// Normalized result of one order attempt, simulated or live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub status: OrderStatus,
    pub broker_reference: Option<String>,
    pub worst_case_loss: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    pub fn simulated(reference: impl Into<String>, worst_case_loss: Decimal) -> Self {
        Self {
            status: OrderStatus::Simulated,
            broker_reference: Some(reference.into()),
            worst_case_loss,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn placed(reference: impl Into<String>, worst_case_loss: Decimal) -> Self {
        Self {
            status: OrderStatus::Placed,
            broker_reference: Some(reference.into()),
            worst_case_loss,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>, worst_case_loss: Decimal) -> Self {
        Self {
            status: OrderStatus::Failed,
            broker_reference: None,
            worst_case_loss,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_placed(&self) -> bool {
        self.status == OrderStatus::Placed
    }
}

/// Payload stored under the active-trade key.
///
/// `order` is `None` while a claim is held for an order that the broker has
/// not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTradeFlag {
    pub trading_symbol: String,
    pub order: Option<OrderResult>,
    pub timestamp: DateTime<Utc>,
}

impl ActiveTradeFlag {
    pub fn pending(trading_symbol: impl Into<String>) -> Self {
        Self {
            trading_symbol: trading_symbol.into(),
            order: None,
            timestamp: Utc::now(),
        }
    }

    pub fn placed(trading_symbol: impl Into<String>, order: OrderResult) -> Self {
        Self {
            trading_symbol: trading_symbol.into(),
            order: Some(order),
            timestamp: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.order.is_none()
    }
}
