use std::sync::Arc;

use trade_core::{ActiveTradeFlag, OrderResult, TradeIntent};
use trade_store::{KeyValueStore, StoreResult, ACTIVE_TRADE_KEY};

/// Enforces at most one live trade at a time through a flag in the shared
/// store.
///
/// `try_acquire` is only a fast pre-check. Admission happens in `claim`,
/// which writes a pending flag with set-if-absent so two concurrent live
/// submissions cannot both pass.
#[derive(Clone)]
pub struct ActiveTradeGuard {
    store: Arc<dyn KeyValueStore>,
}

impl ActiveTradeGuard {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// `true` when no active-trade flag is set.
    pub async fn try_acquire(&self) -> StoreResult<bool> {
        Ok(!self.store.exists(ACTIVE_TRADE_KEY).await?)
    }

    /// Atomically take the slot for `intent`. `false` means another trade
    /// already holds it.
    pub async fn claim(&self, intent: &TradeIntent) -> StoreResult<bool> {
        let flag = ActiveTradeFlag::pending(intent.trading_symbol());
        let claimed = self
            .store
            .set_if_absent(ACTIVE_TRADE_KEY, &serde_json::to_string(&flag)?)
            .await?;
        if claimed {
            tracing::debug!(symbol = intent.trading_symbol(), "Active-trade slot claimed");
        }
        Ok(claimed)
    }

    /// Record the placed order on the held claim.
    pub async fn mark_active(&self, intent: &TradeIntent, order: &OrderResult) -> StoreResult<()> {
        let flag = ActiveTradeFlag::placed(intent.trading_symbol(), order.clone());
        self.store
            .set(ACTIVE_TRADE_KEY, &serde_json::to_string(&flag)?)
            .await?;
        tracing::info!(
            symbol = intent.trading_symbol(),
            order_id = order.broker_reference.as_deref().unwrap_or("-"),
            "Active trade recorded"
        );
        Ok(())
    }

    /// Give the slot back after the broker did not accept the order.
    pub async fn release_claim(&self) -> StoreResult<()> {
        self.store.delete(ACTIVE_TRADE_KEY).await?;
        tracing::info!("Active-trade claim released after failed order");
        Ok(())
    }

    /// Operator reset. Returns whether a flag was present.
    pub async fn clear(&self) -> StoreResult<bool> {
        let removed = self.store.delete(ACTIVE_TRADE_KEY).await?;
        tracing::warn!(removed, "Active-trade flag cleared by admin");
        Ok(removed)
    }

    /// Current flag, if any. A value that is not a flag this service wrote
    /// still counts as an active trade.
    pub async fn peek(&self) -> StoreResult<Option<ActiveTradeFlag>> {
        let Some(raw) = self.store.get(ACTIVE_TRADE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<ActiveTradeFlag>(&raw) {
            Ok(flag) => Ok(Some(flag)),
            Err(e) => {
                tracing::warn!("Unrecognized active-trade flag ({}): {}", e, raw);
                Ok(Some(ActiveTradeFlag::pending(raw)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trade_store::MemoryStore;

    fn intent() -> TradeIntent {
        TradeIntent::from_payload(&json!({
            "exchange": "NFO",
            "tradingsymbol": "NIFTY24JUN19500CE",
            "qty": 50,
            "transaction_type": "BUY",
            "entry": 120,
            "stoploss": 100
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let guard = ActiveTradeGuard::new(Arc::new(MemoryStore::new()));
        assert!(guard.try_acquire().await.unwrap());
        assert!(guard.claim(&intent()).await.unwrap());
        assert!(!guard.try_acquire().await.unwrap());
        assert!(!guard.claim(&intent()).await.unwrap());

        let flag = guard.peek().await.unwrap().unwrap();
        assert!(flag.is_pending());

        guard.release_claim().await.unwrap();
        assert!(guard.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn mark_active_then_clear() {
        let guard = ActiveTradeGuard::new(Arc::new(MemoryStore::new()));
        let intent = intent();
        assert!(guard.claim(&intent).await.unwrap());
        let order = OrderResult::placed("151220000000000", 1000.into());
        guard.mark_active(&intent, &order).await.unwrap();

        let flag = guard.peek().await.unwrap().unwrap();
        assert_eq!(flag.trading_symbol, "NIFTY24JUN19500CE");
        assert_eq!(flag.order, Some(order));

        assert!(guard.clear().await.unwrap());
        assert!(!guard.clear().await.unwrap());
        assert!(guard.peek().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_flag_still_blocks() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACTIVE_TRADE_KEY, "1").await.unwrap();
        let guard = ActiveTradeGuard::new(store);

        assert!(!guard.try_acquire().await.unwrap());
        assert!(guard.peek().await.unwrap().is_some());
        assert!(!guard.claim(&intent()).await.unwrap());
    }
}
