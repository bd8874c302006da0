use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only three recommendations the reasoning step may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionKind {
    Buy,
    Sell,
    Flat,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Buy => "BUY",
            DecisionKind::Sell => "SELL",
            DecisionKind::Flat => "FLAT",
        }
    }

    /// Exact literal match, surrounding whitespace ignored. Anything else
    /// (`buy`, `HOLD`, `NO-TRADE`) is a contract violation, not a synonym.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "BUY" => Some(DecisionKind::Buy),
            "SELL" => Some(DecisionKind::Sell),
            "FLAT" => Some(DecisionKind::Flat),
            _ => None,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, DecisionKind::Flat)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_lot_size() -> u32 {
    1
}

/// Normalized output of the reasoning step.
///
/// Field names match the JSON contract given to the reasoning service, so a
/// logged decision reads the same as the service's own answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: DecisionKind,
    pub instrument: String,
    pub qty: u32,
    pub entry_price: Option<Decimal>,
    pub stoploss: Option<Decimal>,
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    pub rationale: String,
    pub confidence_percent: u8,
    /// Verbatim service output, kept whenever it broke the contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Decision {
    /// A safe no-op decision.
    pub fn flat(instrument: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            decision: DecisionKind::Flat,
            instrument: instrument.into(),
            qty: 0,
            entry_price: None,
            stoploss: None,
            lot_size: 1,
            rationale: rationale.into(),
            confidence_percent: 0,
            raw: None,
        }
    }

    /// FLAT decision for a response that violated the output contract. The raw
    /// text is embedded in the rationale and kept separately for audit.
    pub fn flat_unparsed(
        instrument: impl Into<String>,
        problem: &str,
        raw: impl Into<String>,
    ) -> Self {
        let raw = raw.into();
        let mut decision = Self::flat(instrument, format!("{problem}; raw response: {raw}"));
        decision.raw = Some(raw);
        decision
    }

    pub fn is_flat(&self) -> bool {
        self.decision.is_flat()
    }
}
