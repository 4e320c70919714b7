//! Key-value persistence collaborator
//!
//! The engine keeps every record as a string value under a string key:
//! `get`, `set` with an optional TTL, `del` and an `is_enabled` check.
//!
//! ## Backends
//! ```text
//! [EventProgressManager / ledgers]
//!       ↓
//! [KvStore trait]
//!       ↓
//! ┌──────────────────┬─────────────────────┐
//! │ MemoryKvStore    │ LmdbKvStore         │
//! │ (tests, dev)     │ (embedded, durable) │
//! └──────────────────┴─────────────────────┘
//! ```

pub mod lmdb;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::StoreBackend;

pub use self::lmdb::LmdbKvStore;
pub use self::memory::MemoryKvStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("store disabled")]
    Disabled,

    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// Options for [`KvStore::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry expires this long after the write; `None` keeps it forever
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn ex(secs: u64) -> Self {
        Self {
            ttl: Some(Duration::from_secs(secs)),
        }
    }

    pub fn persistent() -> Self {
        Self { ttl: None }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, options: SetOptions) -> KvResult<()>;
    /// Returns whether a live entry was removed
    async fn del(&self, key: &str) -> KvResult<bool>;
    fn is_enabled(&self) -> bool;
}

/// Build the configured store backend
pub fn init_store(backend: &StoreBackend) -> KvResult<Arc<dyn KvStore>> {
    match backend {
        StoreBackend::Memory => {
            info!("Using in-memory progression store");
            Ok(Arc::new(MemoryKvStore::new()))
        }
        StoreBackend::Lmdb { path, max_size } => {
            let store = LmdbKvStore::new(path, *max_size)?;
            info!("LMDB progression store initialized");
            Ok(Arc::new(store))
        }
    }
}
