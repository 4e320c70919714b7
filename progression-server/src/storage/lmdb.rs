//! LMDB-backed store (embedded database)
//!
//! Values are stored in a bincode envelope carrying the expiry instant.
//! Expired entries read as absent and are purged on the next access.
//!
//! ```rust,ignore
//! let store = LmdbKvStore::new("./data/progression", 64 * 1024 * 1024)?;
//! store.set("event:progress:c1", "{}", SetOptions::ex(86_400)).await?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{KvError, KvResult, KvStore, SetOptions};

#[derive(Serialize, Deserialize)]
struct Envelope {
    /// Unix millis; `None` never expires
    expires_at_ms: Option<i64>,
    value: String,
}

impl Envelope {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

#[derive(Clone)]
pub struct LmdbKvStore {
    env: Arc<Env>,
    db: Database<Str, Bytes>,
}

impl LmdbKvStore {
    /// Open (or create) the store at `path`. `max_size_bytes` must be a
    /// multiple of the OS page size.
    pub fn new<P: AsRef<Path>>(path: P, max_size_bytes: usize) -> KvResult<Self> {
        info!(
            "Opening LMDB store at {:?} (max size: {} bytes)",
            path.as_ref(),
            max_size_bytes
        );

        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_bytes)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database::<Str, Bytes>(&mut wtxn, Some("kv"))?;
        wtxn.commit()?;

        Ok(Self {
            env: Arc::new(env),
            db,
        })
    }

    fn decode(bytes: &[u8]) -> KvResult<Envelope> {
        bincode::deserialize(bytes).map_err(|e| KvError::Encoding(e.to_string()))
    }

    fn purge(&self, key: &str) -> KvResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        debug!("LMDB purged expired key {}", key);
        Ok(())
    }

    /// Live entry count
    pub fn len(&self) -> KvResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let rtxn = self.env.read_txn()?;
        let mut count = 0;
        for item in self.db.iter(&rtxn)? {
            let (_, bytes) = item?;
            if Self::decode(bytes).is_ok_and(|e| e.is_live(now_ms)) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn sync(&self) -> KvResult<()> {
        self.env.force_sync()?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for LmdbKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now_ms = Utc::now().timestamp_millis();
        let envelope = {
            let rtxn = self.env.read_txn()?;
            match self.db.get(&rtxn, key)? {
                Some(bytes) => Self::decode(bytes)?,
                None => return Ok(None),
            }
        };

        if envelope.is_live(now_ms) {
            return Ok(Some(envelope.value));
        }
        if let Err(e) = self.purge(key) {
            warn!("Failed to purge expired key {}: {}", key, e);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> KvResult<()> {
        let expires_at_ms = options
            .ttl
            .map(|ttl| Utc::now().timestamp_millis().saturating_add(ttl.as_millis() as i64));
        let envelope = Envelope {
            expires_at_ms,
            value: value.to_string(),
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| KvError::Encoding(e.to_string()))?;

        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key, &bytes)?;
        wtxn.commit()?;
        debug!("LMDB SET {}", key);
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn()?;
        let live = match self.db.get(&wtxn, key)? {
            Some(bytes) => Self::decode(bytes).is_ok_and(|e| e.is_live(now_ms)),
            None => false,
        };
        self.db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        Ok(live)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
