//! Persisted key-value storage port.
//!
//! The keyring persists exactly two things: the `vault-keys` record (`{hash, salt}`) and the
//! UTF-8 diagnostic flag. Everything else belongs to the host.

use crate::core::errors::{KeyringError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Salted password hash record, both fields hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKeys {
    pub hash: String,
    pub salt: String,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Typed read of the `{hash, salt}` record.
pub async fn load_vault_keys(store: &dyn KeyValueStore, key: &str) -> Result<Option<VaultKeys>> {
    match store.get(key).await? {
        Some(value) => {
            let keys: VaultKeys = serde_json::from_value(value)
                .map_err(|e| KeyringError::Storage(format!("corrupt {} record: {}", key, e)))?;
            Ok(Some(keys))
        }
        None => Ok(None),
    }
}

pub async fn save_vault_keys(store: &dyn KeyValueStore, key: &str, keys: &VaultKeys) -> Result<()> {
    store.set(key, serde_json::to_value(keys)?).await
}

/// In-process store for tests and the CLI.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}
