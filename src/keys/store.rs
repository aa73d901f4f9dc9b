//! Client for the key-value persistence service.
//!
//! The store is a thin Express front over JSON blobs:
//! `GET /api/data/:id` returns the stored JSON (or null), and
//! `POST /api/data/:id` upserts it. The pipeline only touches two tables:
//! `keys` (the managed credential pool) and `users` (the credit counters).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, TtsStudioError};
use crate::keys::{KeyStatus, ManagedKey};

/// Persistence operations the pipeline needs from the store.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Load the managed credential pool. An absent table is an empty pool.
    async fn load_keys(&self) -> Result<Vec<ManagedKey>>;

    /// Durably mark a credential INVALID so no later request selects it.
    async fn mark_key_invalid(&self, key: &str) -> Result<()>;

    /// Report usage by decrementing the user's character credits.
    async fn record_usage(&self, user_id: &str, chars: usize) -> Result<()>;
}

/// HTTP implementation against the studio's Express backend.
pub struct HttpKeyStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpKeyStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/api/data/{}", self.base_url, table)
    }

    async fn get_table(&self, table: &str) -> Result<Value> {
        let response = self.client.get(self.table_url(table)).send().await?;
        if !response.status().is_success() {
            return Err(TtsStudioError::KeyStore(format!(
                "GET {} returned status {}",
                table,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn put_table(&self, table: &str, value: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .json(value)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TtsStudioError::KeyStore(format!(
                "POST {} returned status {}",
                table,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for HttpKeyStore {
    async fn load_keys(&self) -> Result<Vec<ManagedKey>> {
        let value = self.get_table("keys").await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Re-reads the table right before writing and only flips the one
    /// credential's status, keeping the blind-upsert race window to a
    /// single row rewrite (the store offers no compare-and-set).
    async fn mark_key_invalid(&self, key: &str) -> Result<()> {
        let mut keys = self.load_keys().await?;
        let mut changed = false;
        for managed in keys.iter_mut() {
            if managed.key == key && managed.status != KeyStatus::Invalid {
                managed.status = KeyStatus::Invalid;
                changed = true;
            }
        }
        if changed {
            self.put_table("keys", &serde_json::to_value(&keys)?).await?;
            log::info!("marked credential as INVALID in the store");
        }
        Ok(())
    }

    async fn record_usage(&self, user_id: &str, chars: usize) -> Result<()> {
        let mut users = self.get_table("users").await?;
        let list = match users.as_array_mut() {
            Some(list) => list,
            None => return Ok(()), // no user table yet, nothing to decrement
        };

        let mut updated = false;
        for user in list.iter_mut() {
            if user.get("uid").and_then(Value::as_str) == Some(user_id) {
                let credits = user.get("credits").and_then(Value::as_i64).unwrap_or(0);
                user["credits"] = Value::from(credits - chars as i64);
                updated = true;
                break;
            }
        }

        if !updated {
            log::warn!("usage report skipped: user {user_id} not found in store");
            return Ok(());
        }
        self.put_table("users", &users).await
    }
}

/// In-memory store used by the retry tests.
#[cfg(test)]
pub struct MemoryKeyStore {
    pub keys: std::sync::Mutex<Vec<ManagedKey>>,
    pub usage: std::sync::Mutex<Vec<(String, usize)>>,
}

#[cfg(test)]
impl MemoryKeyStore {
    pub fn new(keys: Vec<ManagedKey>) -> Self {
        Self {
            keys: std::sync::Mutex::new(keys),
            usage: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn status_of(&self, key: &str) -> Option<KeyStatus> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.key == key)
            .map(|k| k.status)
    }
}

#[cfg(test)]
#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load_keys(&self) -> Result<Vec<ManagedKey>> {
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn mark_key_invalid(&self, key: &str) -> Result<()> {
        for managed in self.keys.lock().unwrap().iter_mut() {
            if managed.key == key {
                managed.status = KeyStatus::Invalid;
            }
        }
        Ok(())
    }

    async fn record_usage(&self, user_id: &str, chars: usize) -> Result<()> {
        self.usage
            .lock()
            .unwrap()
            .push((user_id.to_string(), chars));
        Ok(())
    }
}
