//! Per-character serialization
//!
//! Every mutating operation holds its character's lock across
//! load → mutate → save. Different characters never contend.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle lock entries are pruned once the table grows past this
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct CharacterLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while a character's record is being mutated
pub struct CharacterGuard {
    character_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl CharacterGuard {
    pub fn character_id(&self) -> &str {
        &self.character_id
    }
}

impl CharacterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, character_id: &str) -> CharacterGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks
                .entry(character_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        CharacterGuard {
            character_id: character_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
