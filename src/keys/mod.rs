//! Managed API credentials and the ranked key selector.
//!
//! Credentials live in the external key-value store and carry a status and
//! an access scope: a key listing user ids is dedicated to those users, a
//! key with an empty list is shared by everyone. Selection walks three
//! tiers (dedicated, shared picked at random to spread load, then the
//! process-level fallback), skipping invalid and excluded keys.

pub mod store;

use std::collections::HashSet;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyStatus {
    Valid,
    Invalid,
    Untested,
}

impl Default for KeyStatus {
    fn default() -> Self {
        Self::Untested
    }
}

/// A credential record as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedKey {
    pub id: String,
    pub name: String,
    /// The opaque credential string presented to the API
    pub key: String,
    #[serde(default)]
    pub status: KeyStatus,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub is_trial_key: bool,
    /// User ids allowed to use this key. Empty means shared.
    #[serde(default)]
    pub allowed_user_ids: Vec<String>,
}

impl ManagedKey {
    fn usable(&self) -> bool {
        self.status != KeyStatus::Invalid && !self.key.trim().is_empty()
    }
}

/// Snapshot of the credential pool for one generation request.
///
/// Loaded fresh per request so an INVALID status is never cached beyond a
/// single call.
#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<ManagedKey>,
    user_id: Option<String>,
    fallback_key: String,
}

impl KeyPool {
    pub fn new(keys: Vec<ManagedKey>, user_id: Option<String>, fallback_key: String) -> Self {
        Self {
            keys,
            user_id,
            fallback_key,
        }
    }

    /// Select a credential, skipping everything in `excluded`.
    ///
    /// Tier order: a key dedicated to the current user, then a shared key
    /// chosen uniformly at random, then the process fallback. `None` means
    /// no credential is available at any tier, a fatal precondition for
    /// the request rather than something to retry.
    pub fn select(&self, excluded: &HashSet<String>) -> Option<String> {
        if let Some(user_id) = &self.user_id {
            let dedicated = self.keys.iter().find(|k| {
                k.usable()
                    && k.allowed_user_ids.iter().any(|uid| uid == user_id)
                    && !excluded.contains(&k.key)
            });
            if let Some(key) = dedicated {
                return Some(key.key.clone());
            }
        }

        let shared: Vec<&ManagedKey> = self
            .keys
            .iter()
            .filter(|k| k.usable() && k.allowed_user_ids.is_empty() && !excluded.contains(&k.key))
            .collect();
        if let Some(key) = shared.choose(&mut rand::thread_rng()) {
            return Some(key.key.clone());
        }

        let fallback = self.fallback_key.trim();
        if !fallback.is_empty() && !excluded.contains(fallback) {
            return Some(fallback.to_string());
        }

        None
    }

    /// Flip the local status of a credential to INVALID so it is never
    /// selected again within this request. The durable status lives in the
    /// store and is updated separately.
    pub fn mark_invalid(&mut self, key: &str) {
        for managed in self.keys.iter_mut() {
            if managed.key == key {
                managed.status = KeyStatus::Invalid;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.fallback_key.trim().is_empty()
    }
}
