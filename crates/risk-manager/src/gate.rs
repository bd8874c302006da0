use rust_decimal::Decimal;
use serde_json::Value;
use trade_core::{TradeIntent, ValidationError};

use crate::models::{RiskEvaluation, DEFAULT_MAX_ALLOWED_LOSS};

/// `|entry - stop| x quantity x lot_size`, exact.
///
/// Returns `None` only when the product overflows the decimal range, which
/// callers treat as exceeding any ceiling.
pub fn worst_case_loss(intent: &TradeIntent) -> Option<Decimal> {
    (intent.entry_price() - intent.stop_loss_price())
        .abs()
        .checked_mul(Decimal::from(intent.quantity()))?
        .checked_mul(Decimal::from(intent.lot_size()))
}

/// Check a trade against a rupee ceiling. The ceiling itself is allowed.
pub fn evaluate(intent: &TradeIntent, ceiling: Decimal) -> RiskEvaluation {
    match worst_case_loss(intent) {
        Some(loss) => RiskEvaluation {
            worst_case_loss: loss,
            ceiling,
            within_limit: loss <= ceiling,
        },
        None => RiskEvaluation {
            worst_case_loss: Decimal::MAX,
            ceiling,
            within_limit: false,
        },
    }
}

/// Hard per-trade loss ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RiskGate {
    ceiling: Decimal,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(Decimal::from(DEFAULT_MAX_ALLOWED_LOSS))
    }
}

impl RiskGate {
    pub fn new(ceiling: Decimal) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    pub fn evaluate(&self, intent: &TradeIntent) -> RiskEvaluation {
        let eval = evaluate(intent, self.ceiling);
        if !eval.within_limit {
            tracing::info!(
                symbol = intent.trading_symbol(),
                worst_case_loss = %eval.display_loss(),
                ceiling = %self.ceiling,
                "worst-case loss exceeds limit"
            );
        }
        eval
    }

    /// Validate a raw payload and evaluate it.
    ///
    /// Malformed input comes back as `Err`, a legitimate risk block as
    /// `Ok` with `within_limit == false`.
    pub fn evaluate_payload(&self, payload: &Value) -> Result<RiskEvaluation, ValidationError> {
        let intent = TradeIntent::from_payload(payload)?;
        Ok(self.evaluate(&intent))
    }
}
