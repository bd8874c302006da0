use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use trade_core::DecisionLogEntry;

use crate::{DecisionStore, KeyValueStore, StoreResult};

/// In-process store for tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    kv: DashMap<String, String>,
    log: RwLock<Vec<DecisionLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn log_len(&self) -> usize {
        self.log.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.kv.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        match self.kv.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.kv.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.kv.contains_key(key))
    }

    fn kv_backend(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn append(&self, entry: &DecisionLogEntry) -> StoreResult<()> {
        self.log.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<DecisionLogEntry>> {
        let log = self.log.read().await;
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    fn log_backend(&self) -> &'static str {
        "memory"
    }
}
