use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decision::Decision;
use crate::error::ValidationError;
use crate::intent::TradeIntent;
use crate::order::OrderResult;

/// States of one pipeline invocation, recorded in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Received,
    Reasoning,
    RiskCheck,
    GuardCheck,
    Submitting,
    Logged,
}

/// Why an invocation ended without an order attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum RejectReason {
    FlatDecision,
    WorstCaseLossExceedsLimit,
    SingleActiveTradeExists,
    InvalidIntent { field: String, detail: String },
    StoreUnavailable { detail: String },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::FlatDecision => "flat-decision",
            RejectReason::WorstCaseLossExceedsLimit => "worst-case-loss-exceeds-limit",
            RejectReason::SingleActiveTradeExists => "single-active-trade-exists",
            RejectReason::InvalidIntent { .. } => "invalid-intent",
            RejectReason::StoreUnavailable { .. } => "store-unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidIntent { field, detail } => {
                write!(f, "{} ({}: {})", self.code(), field, detail)
            }
            RejectReason::StoreUnavailable { detail } => write!(f, "{} ({})", self.code(), detail),
            _ => f.write_str(self.code()),
        }
    }
}

impl From<ValidationError> for RejectReason {
    fn from(err: ValidationError) -> Self {
        let field = err.field().to_string();
        RejectReason::InvalidIntent {
            field,
            detail: err.to_string(),
        }
    }
}

/// Terminal state of a pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Rejected {
        reason: RejectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worst_case_loss: Option<Decimal>,
    },
    Simulated {
        order: OrderResult,
    },
    Placed {
        order: OrderResult,
    },
    Failed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<OrderResult>,
    },
}

impl Outcome {
    pub fn rejected(reason: RejectReason) -> Self {
        Outcome::Rejected {
            reason,
            worst_case_loss: None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Rejected { .. } => "rejected",
            Outcome::Simulated { .. } => "simulated",
            Outcome::Placed { .. } => "placed",
            Outcome::Failed { .. } => "failed",
        }
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Outcome::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn order(&self) -> Option<&OrderResult> {
        match self {
            Outcome::Simulated { order } | Outcome::Placed { order } => Some(order),
            Outcome::Failed { order, .. } => order.as_ref(),
            Outcome::Rejected { .. } => None,
        }
    }
}

/// One append-only audit record per pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub market_snapshot: serde_json::Value,
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub intent: Option<TradeIntent>,
    pub outcome: Outcome,
    #[serde(default)]
    pub trail: Vec<PipelineStage>,
}

impl DecisionLogEntry {
    pub fn new(
        symbol: impl Into<String>,
        market_snapshot: serde_json::Value,
        decision: Option<Decision>,
        intent: Option<TradeIntent>,
        outcome: Outcome,
        trail: Vec<PipelineStage>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: symbol.into(),
            market_snapshot,
            decision,
            intent,
            outcome,
            trail,
        }
    }
}
