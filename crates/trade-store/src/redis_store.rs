use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use trade_core::DecisionLogEntry;

use crate::{DecisionStore, KeyValueStore, StoreResult, DECISIONS_KEY};

/// Redis-backed shared state and decision log.
///
/// The decision log is a JSON list under `DECISIONS`, newest at the head.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    log_key: String,
    max_log_len: Option<usize>,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            log_key: DECISIONS_KEY.to_string(),
            max_log_len: None,
        })
    }

    /// Keep at most `len` decision entries; older ones are trimmed on append.
    pub fn with_max_log_len(mut self, len: usize) -> Self {
        self.max_log_len = Some(len);
        self
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX replies OK on write and nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    fn kv_backend(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl DecisionStore for RedisStore {
    async fn append(&self, entry: &DecisionLogEntry) -> StoreResult<()> {
        let json = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(&self.log_key, json).await?;
        if let Some(len) = self.max_log_len {
            let stop = len.saturating_sub(1) as isize;
            let _: () = conn.ltrim(&self.log_key, 0, stop).await?;
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = (limit - 1) as isize;
        let rows: Vec<String> = conn.lrange(&self.log_key, 0, stop).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<DecisionLogEntry>(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping unreadable decision log entry: {}", e),
            }
        }
        Ok(entries)
    }

    fn log_backend(&self) -> &'static str {
        "redis"
    }
}
