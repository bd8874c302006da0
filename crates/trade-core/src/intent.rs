use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::decision::{Decision, DecisionKind};
use crate::error::ValidationError;
use crate::numeric::{decimal_from_value, integer_from_value};

pub const DEFAULT_PRODUCT: &str = "MIS";

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(TradeAction::Buy),
            "SELL" => Some(TradeAction::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

/// A validated, immutable trade proposal.
///
/// Only constructible through [`TradeIntent::from_payload`] or
/// [`TradeIntent::from_decision`], so every instance has passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    exchange: String,
    trading_symbol: String,
    quantity: u32,
    transaction_type: TradeAction,
    entry_price: Decimal,
    stop_loss_price: Decimal,
    lot_size: u32,
    product: String,
    order_type: OrderType,
    price: Option<Decimal>,
}

/// Fallbacks applied when a decision does not carry venue details.
#[derive(Debug, Clone)]
pub struct IntentDefaults {
    pub exchange: String,
    pub product: String,
}

impl Default for IntentDefaults {
    fn default() -> Self {
        Self {
            exchange: "NFO".to_string(),
            product: DEFAULT_PRODUCT.to_string(),
        }
    }
}

impl TradeIntent {
    /// Validate a caller-supplied JSON payload.
    ///
    /// Required keys are checked in a fixed order (`exchange`, `tradingsymbol`,
    /// `qty`, `transaction_type`, `entry`, `stoploss`) so the reported field is
    /// deterministic. Snake and camel case aliases are accepted.
    pub fn from_payload(payload: &Value) -> Result<Self, ValidationError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| ValidationError::invalid("payload", "expected a JSON object"))?;
        let lookup = |names: &[&str]| field(obj, names);

        let exchange = lookup(&["exchange"])
            .ok_or_else(|| ValidationError::MissingField("exchange".into()))?;
        let symbol = lookup(&["tradingsymbol", "trading_symbol", "tradingSymbol"])
            .ok_or_else(|| ValidationError::MissingField("tradingsymbol".into()))?;
        let qty = lookup(&["qty", "quantity"])
            .ok_or_else(|| ValidationError::MissingField("qty".into()))?;
        let side = lookup(&["transaction_type", "transactionType"])
            .ok_or_else(|| ValidationError::MissingField("transaction_type".into()))?;
        let entry = lookup(&["entry", "entry_price", "entryPrice"])
            .ok_or_else(|| ValidationError::MissingField("entry".into()))?;
        let stop = lookup(&["stoploss", "stop_loss_price", "stopLossPrice", "stop_loss"])
            .ok_or_else(|| ValidationError::MissingField("stoploss".into()))?;

        let exchange = non_empty_string("exchange", exchange)?;
        let trading_symbol = non_empty_string("tradingsymbol", symbol)?;
        let quantity = positive_u32("qty", qty)?;
        let transaction_type = side
            .as_str()
            .and_then(TradeAction::parse)
            .ok_or_else(|| ValidationError::invalid("transaction_type", "expected BUY or SELL"))?;
        let entry_price = positive_decimal("entry", entry)?;
        let stop_loss_price = positive_decimal("stoploss", stop)?;

        let lot_size = match lookup(&["lot_size", "lotSize"]) {
            Some(v) => positive_u32("lot_size", v)?,
            None => 1,
        };
        let product = match lookup(&["product"]) {
            Some(v) => non_empty_string("product", v)?,
            None => DEFAULT_PRODUCT.to_string(),
        };
        let order_type = match lookup(&["order_type", "orderType"]) {
            Some(v) => match v.as_str().map(|s| s.trim().to_ascii_uppercase()).as_deref() {
                Some("MARKET") => OrderType::Market,
                Some("LIMIT") => OrderType::Limit,
                _ => {
                    return Err(ValidationError::invalid(
                        "order_type",
                        "expected MARKET or LIMIT",
                    ))
                }
            },
            None => OrderType::Market,
        };
        let price = match lookup(&["price"]) {
            Some(v) => Some(positive_decimal("price", v)?),
            None => None,
        };
        if order_type == OrderType::Limit && price.is_none() {
            return Err(ValidationError::MissingField("price".into()));
        }

        Ok(Self {
            exchange,
            trading_symbol,
            quantity,
            transaction_type,
            entry_price,
            stop_loss_price,
            lot_size,
            product,
            order_type,
            price,
        })
    }

    /// Build a market-order intent from a BUY/SELL decision.
    pub fn from_decision(
        decision: &Decision,
        defaults: &IntentDefaults,
    ) -> Result<Self, ValidationError> {
        let transaction_type = match decision.decision {
            DecisionKind::Buy => TradeAction::Buy,
            DecisionKind::Sell => TradeAction::Sell,
            DecisionKind::Flat => {
                return Err(ValidationError::invalid(
                    "decision",
                    "FLAT carries no trade intent",
                ))
            }
        };
        let trading_symbol = decision.instrument.trim();
        if trading_symbol.is_empty() {
            return Err(ValidationError::MissingField("instrument".into()));
        }
        if decision.qty == 0 {
            return Err(ValidationError::invalid("qty", "must be greater than zero"));
        }
        if decision.lot_size == 0 {
            return Err(ValidationError::invalid("lot_size", "must be at least 1"));
        }
        let entry_price = decision
            .entry_price
            .ok_or_else(|| ValidationError::MissingField("entry_price".into()))?;
        let stop_loss_price = decision
            .stoploss
            .ok_or_else(|| ValidationError::MissingField("stoploss".into()))?;
        if entry_price <= Decimal::ZERO {
            return Err(ValidationError::invalid("entry_price", "must be positive"));
        }
        if stop_loss_price <= Decimal::ZERO {
            return Err(ValidationError::invalid("stoploss", "must be positive"));
        }

        Ok(Self {
            exchange: defaults.exchange.clone(),
            trading_symbol: trading_symbol.to_string(),
            quantity: decision.qty,
            transaction_type,
            entry_price,
            stop_loss_price,
            lot_size: decision.lot_size,
            product: defaults.product.clone(),
            order_type: OrderType::Market,
            price: None,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn trading_symbol(&self) -> &str {
        &self.trading_symbol
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn transaction_type(&self) -> TradeAction {
        self.transaction_type
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn stop_loss_price(&self) -> Decimal {
        self.stop_loss_price
    }

    pub fn lot_size(&self) -> u32 {
        self.lot_size
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|n| obj.get(*n))
        .filter(|v| !v.is_null())
}

fn non_empty_string(field: &str, value: &Value) -> Result<String, ValidationError> {
    match value.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        Some(_) => Err(ValidationError::invalid(field, "must not be empty")),
        None => Err(ValidationError::invalid(field, "expected a string")),
    }
}

fn positive_u32(field: &str, value: &Value) -> Result<u32, ValidationError> {
    let n = integer_from_value(value)
        .ok_or_else(|| ValidationError::invalid(field, "expected an integer"))?;
    if n <= 0 {
        return Err(ValidationError::invalid(field, "must be greater than zero"));
    }
    u32::try_from(n).map_err(|_| ValidationError::invalid(field, "out of range"))
}

fn positive_decimal(field: &str, value: &Value) -> Result<Decimal, ValidationError> {
    let d = decimal_from_value(value)
        .ok_or_else(|| ValidationError::invalid(field, "expected a number"))?;
    if d <= Decimal::ZERO {
        return Err(ValidationError::invalid(field, "must be positive"));
    }
    Ok(d)
}
