pub mod error;
pub mod memory;
pub mod redis_store;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sqlite::SqliteDecisionStore;

use async_trait::async_trait;
use trade_core::DecisionLogEntry;

/// Redis key holding the single active-trade flag.
pub const ACTIVE_TRADE_KEY: &str = "ACTIVE_TRADE";
/// Redis list holding decision log entries, newest first.
pub const DECISIONS_KEY: &str = "DECISIONS";
/// Broker access token shared with the login helper.
pub const ACCESS_TOKEN_KEY: &str = "ZERODHA_ACCESS_TOKEN";

/// Shared key/value state. `set_if_absent` must be atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Returns `true` when the value was written, `false` when the key existed.
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Returns `true` when a key was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    fn kv_backend(&self) -> &'static str;
}

/// Append-only decision log.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn append(&self, entry: &DecisionLogEntry) -> StoreResult<()>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>>;

    async fn latest(&self) -> StoreResult<Option<DecisionLogEntry>> {
        Ok(self.recent(1).await?.into_iter().next())
    }

    fn log_backend(&self) -> &'static str;
}
