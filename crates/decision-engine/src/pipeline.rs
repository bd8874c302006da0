use std::sync::Arc;

use broker_trait::MarketDataSource;
use reasoning_client::ReasoningClient;
use risk_manager::{RiskEvaluation, RiskGate};
use serde::Serialize;
use serde_json::{json, Value};
use trade_core::{
    Decision, DecisionLogEntry, IntentDefaults, Outcome, PipelineStage, RejectReason, TradeIntent,
};
use trade_store::DecisionStore;
use uuid::Uuid;

use crate::guard::ActiveTradeGuard;
use crate::notifier::{DecisionEvent, NotifierSet};
use crate::order_submitter::OrderSubmitter;

/// Result of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub outcome: Outcome,
    pub decision: Option<Decision>,
    pub intent: Option<TradeIntent>,
    pub risk: Option<RiskEvaluation>,
    pub trail: Vec<PipelineStage>,
    pub log_id: Uuid,
    /// `false` when the decision log write failed. The outcome stands either way.
    pub logged: bool,
}

/// Per-invocation state. Nothing here outlives a single run.
struct Run {
    symbol: String,
    snapshot: Value,
    decision: Option<Decision>,
    intent: Option<TradeIntent>,
    risk: Option<RiskEvaluation>,
    trail: Vec<PipelineStage>,
}

impl Run {
    fn new(symbol: impl Into<String>, snapshot: Value) -> Self {
        Self {
            symbol: symbol.into(),
            snapshot,
            decision: None,
            intent: None,
            risk: None,
            trail: vec![PipelineStage::Received],
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.trail.push(stage);
    }
}

/// Orchestrates reasoning, risk check, guard and submission for one request
/// and writes exactly one decision log entry for it.
pub struct DecisionPipeline {
    reasoning: ReasoningClient,
    market_data: Arc<dyn MarketDataSource>,
    risk_gate: RiskGate,
    guard: ActiveTradeGuard,
    submitter: OrderSubmitter,
    decision_log: Arc<dyn DecisionStore>,
    notifiers: NotifierSet,
    defaults: IntentDefaults,
}

impl DecisionPipeline {
    pub fn new(
        reasoning: ReasoningClient,
        market_data: Arc<dyn MarketDataSource>,
        risk_gate: RiskGate,
        guard: ActiveTradeGuard,
        submitter: OrderSubmitter,
        decision_log: Arc<dyn DecisionStore>,
    ) -> Self {
        Self {
            reasoning,
            market_data,
            risk_gate,
            guard,
            submitter,
            decision_log,
            notifiers: NotifierSet::new(),
            defaults: IntentDefaults::default(),
        }
    }

    pub fn with_notifiers(mut self, notifiers: NotifierSet) -> Self {
        self.notifiers = notifiers;
        self
    }

    pub fn with_defaults(mut self, defaults: IntentDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn risk_gate(&self) -> &RiskGate {
        &self.risk_gate
    }

    pub fn guard(&self) -> &ActiveTradeGuard {
        &self.guard
    }

    pub fn decision_log(&self) -> &Arc<dyn DecisionStore> {
        &self.decision_log
    }

    /// Snapshot, reasoning, then the shared risk/guard/submit path.
    pub async fn run_auto(&self, symbol: &str, simulate: bool) -> PipelineReport {
        let snapshot = match self.market_data.get_snapshot(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(symbol, "Market snapshot failed: {:#}", e);
                json!({ "symbol": symbol, "error": format!("{:#}", e) })
            }
        };

        let mut run = Run::new(symbol, snapshot);
        run.enter(PipelineStage::Reasoning);
        let decision = self.reasoning.get_decision(symbol, &run.snapshot).await;
        run.decision = Some(decision.clone());

        if decision.is_flat() {
            return self
                .finish(run, Outcome::rejected(RejectReason::FlatDecision))
                .await;
        }

        let intent = match TradeIntent::from_decision(&decision, &self.defaults) {
            Ok(intent) => intent,
            Err(e) => {
                run.enter(PipelineStage::RiskCheck);
                tracing::warn!(symbol, "Decision is not a valid trade intent: {}", e);
                return self.finish(run, Outcome::rejected(e.into())).await;
            }
        };

        self.gate_and_submit(run, intent, simulate).await
    }

    /// Caller-supplied intent payload; skips reasoning.
    pub async fn run_manual(&self, payload: &Value, simulate: bool) -> PipelineReport {
        let symbol = payload
            .get("tradingsymbol")
            .or_else(|| payload.get("trading_symbol"))
            .or_else(|| payload.get("tradingSymbol"))
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        let mut run = Run::new(symbol, json!({ "source": "manual", "payload": payload }));

        let intent = match TradeIntent::from_payload(payload) {
            Ok(intent) => {
                run.symbol = intent.trading_symbol().to_string();
                intent
            }
            Err(e) => {
                run.enter(PipelineStage::RiskCheck);
                tracing::warn!(symbol = %run.symbol, "Rejected trade payload: {}", e);
                return self.finish(run, Outcome::rejected(e.into())).await;
            }
        };

        self.gate_and_submit(run, intent, simulate).await
    }

    async fn gate_and_submit(
        &self,
        mut run: Run,
        intent: TradeIntent,
        simulate: bool,
    ) -> PipelineReport {
        run.intent = Some(intent.clone());

        run.enter(PipelineStage::RiskCheck);
        let risk = self.risk_gate.evaluate(&intent);
        run.risk = Some(risk);
        if !risk.within_limit {
            return self
                .finish(
                    run,
                    Outcome::Rejected {
                        reason: RejectReason::WorstCaseLossExceedsLimit,
                        worst_case_loss: Some(risk.worst_case_loss),
                    },
                )
                .await;
        }

        if simulate {
            run.enter(PipelineStage::Submitting);
            let order = self.submitter.submit(&intent, true, &risk).await;
            return self.finish(run, Outcome::Simulated { order }).await;
        }

        run.enter(PipelineStage::GuardCheck);
        if let Some(outcome) = self.admit(&intent).await {
            return self.finish(run, outcome).await;
        }

        run.enter(PipelineStage::Submitting);
        let order = self.submitter.submit(&intent, false, &risk).await;

        let outcome = if order.is_placed() {
            if let Err(e) = self.guard.mark_active(&intent, &order).await {
                // The pending claim is still held, so the slot stays taken.
                tracing::error!("Failed to record active trade: {}", e);
            }
            Outcome::Placed { order }
        } else {
            if let Err(e) = self.guard.release_claim().await {
                tracing::error!("Failed to release active-trade claim: {}", e);
            }
            Outcome::Failed {
                reason: order
                    .message
                    .clone()
                    .unwrap_or_else(|| "order failed".to_string()),
                order: Some(order),
            }
        };

        self.finish(run, outcome).await
    }

    /// Fail-fast check, then the atomic claim. `Some` is a rejection.
    async fn admit(&self, intent: &TradeIntent) -> Option<Outcome> {
        let unavailable = |e: trade_store::StoreError| {
            tracing::error!("Active-trade store unavailable: {}", e);
            Outcome::rejected(RejectReason::StoreUnavailable {
                detail: e.to_string(),
            })
        };

        match self.guard.try_acquire().await {
            Ok(true) => {}
            Ok(false) => return Some(Outcome::rejected(RejectReason::SingleActiveTradeExists)),
            Err(e) => return Some(unavailable(e)),
        }

        match self.guard.claim(intent).await {
            Ok(true) => None,
            Ok(false) => Some(Outcome::rejected(RejectReason::SingleActiveTradeExists)),
            Err(e) => Some(unavailable(e)),
        }
    }

    async fn finish(&self, mut run: Run, outcome: Outcome) -> PipelineReport {
        run.enter(PipelineStage::Logged);

        let entry = DecisionLogEntry::new(
            run.symbol.clone(),
            run.snapshot,
            run.decision.clone(),
            run.intent.clone(),
            outcome.clone(),
            run.trail.clone(),
        );

        let logged = match self.decision_log.append(&entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(symbol = %run.symbol, log_id = %entry.id, "Decision log write failed: {}", e);
                false
            }
        };

        tracing::info!(
            symbol = %run.symbol,
            outcome = outcome.status(),
            reason = outcome.reject_reason().map(|r| r.code()).unwrap_or("-"),
            worst_case_loss = %run.risk.map(|r| r.display_loss().to_string()).unwrap_or_else(|| "-".to_string()),
            "Pipeline finished"
        );

        if !self.notifiers.is_empty() {
            let notifiers = self.notifiers.clone();
            let event = DecisionEvent {
                ts: entry.timestamp,
                symbol: run.symbol.clone(),
                decision: run.decision.clone(),
                outcome: outcome.clone(),
            };
            tokio::spawn(async move { notifiers.notify_all(&event).await });
        }

        PipelineReport {
            outcome,
            decision: run.decision,
            intent: run.intent,
            risk: run.risk,
            trail: run.trail,
            log_id: entry.id,
            logged,
        }
    }
}
