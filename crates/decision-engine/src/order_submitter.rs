use std::sync::Arc;
use std::time::Duration;

use broker_trait::{BrokerClient, BrokerOrderRequest, BrokerOrderSide};
use chrono::Utc;
use risk_manager::RiskEvaluation;
use trade_core::{OrderResult, OrderType, TradeAction, TradeIntent};

/// Sends validated intents to the broker, or fabricates a simulated fill.
///
/// Never retries: a failed live order is reported once and the caller
/// decides whether to start a fresh invocation.
#[derive(Clone)]
pub struct OrderSubmitter {
    broker: Option<Arc<dyn BrokerClient>>,
    timeout: Duration,
}

impl OrderSubmitter {
    pub fn new(broker: Arc<dyn BrokerClient>, timeout: Duration) -> Self {
        Self {
            broker: Some(broker),
            timeout,
        }
    }

    /// Submitter with no broker attached; live submissions fail.
    pub fn simulate_only() -> Self {
        Self {
            broker: None,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    pub async fn submit(
        &self,
        intent: &TradeIntent,
        simulate: bool,
        risk: &RiskEvaluation,
    ) -> OrderResult {
        let loss = risk.worst_case_loss;

        if simulate {
            let reference = format!("SIM-{}", Utc::now().timestamp_millis());
            tracing::info!(
                symbol = intent.trading_symbol(),
                reference = %reference,
                worst_case_loss = %risk.display_loss(),
                "Simulated {} {} x{}",
                intent.transaction_type(),
                intent.trading_symbol(),
                intent.quantity()
            );
            return OrderResult::simulated(reference, loss);
        }

        let Some(broker) = self.broker.as_ref() else {
            return OrderResult::failed("no broker configured for live orders", loss);
        };

        let request = match build_request(intent) {
            Ok(request) => request,
            Err(message) => {
                tracing::warn!(symbol = intent.trading_symbol(), "{}", message);
                return OrderResult::failed(message, loss);
            }
        };

        tracing::info!(
            "Placing {} {} x{} on {} ({}, worst-case loss {})",
            intent.transaction_type(),
            intent.trading_symbol(),
            intent.quantity(),
            broker.broker_name(),
            intent.order_type().as_str(),
            risk.display_loss()
        );

        match tokio::time::timeout(self.timeout, broker.place_order(request)).await {
            Ok(Ok(ack)) => {
                tracing::info!(order_id = %ack.order_id, "Order placed");
                OrderResult::placed(ack.order_id, loss)
            }
            Ok(Err(e)) => {
                tracing::error!(symbol = intent.trading_symbol(), "Order placement failed: {:#}", e);
                OrderResult::failed(format!("broker error: {:#}", e), loss)
            }
            Err(_) => {
                tracing::error!(
                    symbol = intent.trading_symbol(),
                    "Order placement timed out after {}s",
                    self.timeout.as_secs()
                );
                OrderResult::failed(
                    format!("broker call timed out after {}s", self.timeout.as_secs()),
                    loss,
                )
            }
        }
    }
}

fn build_request(intent: &TradeIntent) -> Result<BrokerOrderRequest, String> {
    let side = match intent.transaction_type() {
        TradeAction::Buy => BrokerOrderSide::Buy,
        TradeAction::Sell => BrokerOrderSide::Sell,
    };
    let request = BrokerOrderRequest::market(
        intent.exchange(),
        intent.trading_symbol(),
        side,
        intent.quantity(),
        intent.product(),
    );

    match intent.order_type() {
        OrderType::Market => Ok(request),
        OrderType::Limit => intent
            .price()
            .map(|price| request.limit(price))
            .ok_or_else(|| "LIMIT order requires a price".to_string()),
    }
}
