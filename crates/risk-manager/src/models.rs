use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Default ceiling on the rupee loss a single trade may risk.
pub const DEFAULT_MAX_ALLOWED_LOSS: i64 = 11_000;

/// Result of checking one trade against the loss ceiling.
///
/// Derived on demand and never stored on its own; the same intent and
/// ceiling always give the same evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    pub worst_case_loss: Decimal,
    pub ceiling: Decimal,
    pub within_limit: bool,
}

impl RiskEvaluation {
    /// Loss rounded to paise for display. Comparisons use the exact value.
    pub fn display_loss(&self) -> Decimal {
        self.worst_case_loss
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Remaining room under the ceiling, negative when exceeded.
    pub fn headroom(&self) -> Decimal {
        self.ceiling - self.worst_case_loss
    }
}
