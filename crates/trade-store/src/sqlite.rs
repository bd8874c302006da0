use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use trade_core::{Decision, DecisionLogEntry, Outcome, PipelineStage, TradeIntent};
use uuid::Uuid;

use crate::{DecisionStore, StoreError, StoreResult};

/// SQLite decision log. One row per pipeline invocation.
#[derive(Clone)]
pub struct SqliteDecisionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    ts: DateTime<Utc>,
    symbol: String,
    market_snapshot: String,
    ai_json: Option<String>,
    intent_json: Option<String>,
    outcome: String,
    trail: String,
}

impl SqliteDecisionStore {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;

        Ok(store)
    }

    async fn init_tables(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                ts TEXT NOT NULL,
                symbol TEXT NOT NULL,
                market_snapshot TEXT NOT NULL,
                ai_json TEXT,
                ai_raw TEXT,
                intent_json TEXT,
                status TEXT NOT NULL,
                outcome TEXT NOT NULL,
                trail TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_symbol ON decisions (symbol)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Newest entries for one symbol.
    pub async fn recent_for_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> StoreResult<Vec<DecisionLogEntry>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT id, ts, symbol, market_snapshot, ai_json, intent_json, outcome, trail
            FROM decisions WHERE symbol = ? ORDER BY seq DESC LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DecisionRow::into_entry).collect()
    }
}

impl DecisionRow {
    fn into_entry(self) -> StoreResult<DecisionLogEntry> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("decision id {}: {}", self.id, e)))?;
        let decision: Option<Decision> = match self.ai_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let intent: Option<TradeIntent> = match self.intent_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let outcome: Outcome = serde_json::from_str(&self.outcome)?;
        let trail: Vec<PipelineStage> = serde_json::from_str(&self.trail)?;

        Ok(DecisionLogEntry {
            id,
            timestamp: self.ts,
            symbol: self.symbol,
            market_snapshot: serde_json::from_str(&self.market_snapshot)?,
            decision,
            intent,
            outcome,
            trail,
        })
    }
}

#[async_trait]
impl DecisionStore for SqliteDecisionStore {
    async fn append(&self, entry: &DecisionLogEntry) -> StoreResult<()> {
        let ai_json = entry.decision.as_ref().map(serde_json::to_string).transpose()?;
        let ai_raw = entry.decision.as_ref().and_then(|d| d.raw.clone());
        let intent_json = entry.intent.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO decisions
                (id, ts, symbol, market_snapshot, ai_json, ai_raw, intent_json, status, outcome, trail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.timestamp)
        .bind(&entry.symbol)
        .bind(entry.market_snapshot.to_string())
        .bind(ai_json)
        .bind(ai_raw)
        .bind(intent_json)
        .bind(entry.outcome.status())
        .bind(serde_json::to_string(&entry.outcome)?)
        .bind(serde_json::to_string(&entry.trail)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            r#"
            SELECT id, ts, symbol, market_snapshot, ai_json, intent_json, outcome, trail
            FROM decisions ORDER BY seq DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DecisionRow::into_entry).collect()
    }

    fn log_backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trade_core::{OrderResult, RejectReason};

    async fn store() -> SqliteDecisionStore {
        SqliteDecisionStore::new("sqlite::memory:").await.unwrap()
    }

    fn entry(symbol: &str, outcome: Outcome, decision: Decision) -> DecisionLogEntry {
        DecisionLogEntry::new(
            symbol,
            json!({"last_price": 19512.35, "ohlc": {"open": 19480.0}}),
            Some(decision),
            None,
            outcome,
            vec![PipelineStage::Received, PipelineStage::Reasoning, PipelineStage::Logged],
        )
    }

    #[tokio::test]
    async fn test_db_creation() {
        let store = store().await;
        assert!(store.pool().acquire().await.is_ok());
        assert!(store.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_then_read_back_field_for_field() {
        let store = store().await;
        let raw = "I think it goes up";
        let e = entry(
            "NIFTY",
            Outcome::rejected(RejectReason::FlatDecision),
            Decision::flat_unparsed("NIFTY", "no JSON object in reasoning response", raw),
        );
        store.append(&e).await.unwrap();

        let back = store.latest().await.unwrap().unwrap();
        assert_eq!(back.id, e.id);
        assert_eq!(back.symbol, e.symbol);
        assert_eq!(back.market_snapshot, e.market_snapshot);
        assert_eq!(back.decision, e.decision);
        assert_eq!(back.outcome, e.outcome);
        assert_eq!(back.trail, e.trail);
        assert_eq!(back.decision.unwrap().raw.as_deref(), Some(raw));

        let (ai_raw,): (Option<String>,) =
            sqlx::query_as("SELECT ai_raw FROM decisions WHERE id = ?")
                .bind(e.id.to_string())
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(ai_raw.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn recent_orders_and_filters() {
        let store = store().await;
        let flat = Decision::flat("NIFTY", "quiet");
        for sym in ["NIFTY", "BANKNIFTY", "NIFTY"] {
            store
                .append(&entry(
                    sym,
                    Outcome::Simulated {
                        order: OrderResult::simulated("SIM-1", 2500.into()),
                    },
                    flat.clone(),
                ))
                .await
                .unwrap();
        }

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].symbol, "NIFTY");
        assert_eq!(recent[1].symbol, "BANKNIFTY");

        assert_eq!(store.recent(2).await.unwrap().len(), 2);
        assert_eq!(store.recent_for_symbol("NIFTY", 10).await.unwrap().len(), 2);
        assert_eq!(store.recent_for_symbol("FINNIFTY", 10).await.unwrap().len(), 0);
    }
}
