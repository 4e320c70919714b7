//! Operator activation overrides for seasons and special events
//!
//! The catalog's `isActive` flag is the default; an operator switch stored
//! under `event:season:{id}` / `event:special:{id}` wins over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::{KvStore, SetOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivationRecord {
    is_active: bool,
    changed_at: DateTime<Utc>,
}

pub struct ActivationOverrides {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl ActivationOverrides {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Stored switch, or None when absent or unreadable
    pub async fn get(&self, key: &str) -> Option<bool> {
        match self.store.get(key).await {
            Ok(Some(json)) => match serde_json::from_str::<ActivationRecord>(&json) {
                Ok(record) => Some(record.is_active),
                Err(e) => {
                    warn!(key, error = %e, "activation override unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "activation override not loaded");
                None
            }
        }
    }

    /// Effective flag: the stored switch if any, else `default`
    pub async fn resolve(&self, key: &str, default: bool) -> bool {
        self.get(key).await.unwrap_or(default)
    }

    /// Persist the switch without expiry. False if the store is unavailable.
    pub async fn set(&self, key: &str, is_active: bool) -> bool {
        if !self.store.is_enabled() {
            warn!(key, "store disabled, activation not changed");
            return false;
        }
        let record = ActivationRecord {
            is_active,
            changed_at: self.clock.now(),
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "activation encode failed");
                return false;
            }
        };
        match self.store.set(key, &json, SetOptions::persistent()).await {
            Ok(()) => {
                info!(key, is_active, "activation changed");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "activation save failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::storage::MemoryKvStore;

    #[tokio::test]
    async fn test_override_wins_over_default() {
        let store = Arc::new(MemoryKvStore::new());
        let overrides = ActivationOverrides::new(store.clone(), Arc::new(SystemClock));
        assert!(!overrides.resolve("event:season:autumn-2026", false).await);

        assert!(overrides.set("event:season:autumn-2026", true).await);
        assert!(overrides.resolve("event:season:autumn-2026", false).await);
        assert!(overrides.set("event:season:autumn-2026", false).await);
        assert_eq!(overrides.get("event:season:autumn-2026").await, Some(false));

        store.set_enabled(false);
        assert!(!overrides.set("event:season:autumn-2026", true).await);
        assert!(overrides.resolve("event:season:autumn-2026", true).await);
    }
}
