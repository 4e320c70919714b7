//! Reward grant engine
//!
//! Applies each component of a [`RewardDescriptor`] independently against
//! the character and inventory ledgers. A failing component never blocks the
//! others and nothing is rolled back; the outcome is reported per component.
//!
//! ```text
//! RewardDescriptor
//!   ├── experience ──> CharacterLedger (level-up cascade)
//!   ├── points     ──> CharacterLedger
//!   ├── coins      ──> InventoryLedger ("coin")
//!   ├── items      ──> InventoryLedger
//!   ├── stats      ──> CharacterLedger
//!   └── title      ──> CharacterLedger
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use progression_core::constants::{character_key, inventory_key, reward_history_key, COIN_ITEM_ID};
use progression_core::reward::LevelUp;
use progression_core::{
    CharacterSheet, ComponentOutcome, GrantComponent, Precondition, ProgressionError, ProgressionResult,
    RewardDescriptor, RewardGrantResult, RewardHistoryEntry,
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::locks::CharacterGuard;
use crate::progress_store::EventProgressManager;
use crate::storage::{KvError, KvStore, SetOptions};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store error: {0}")]
    Store(#[from] KvError),

    #[error("ledger blob unreadable: {0}")]
    Encoding(String),

    #[error("ledger rejected {item}: {reason}")]
    Rejected { item: String, reason: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Inventory collaborator
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn add_item(&self, character_id: &str, item_id: &str, quantity: u64) -> LedgerResult<()>;
    async fn items(&self, character_id: &str) -> LedgerResult<BTreeMap<String, u64>>;
}

/// Inventory kept as a flat `{itemId: count}` JSON blob under
/// `inventory:{characterId}`
pub struct KvInventoryLedger {
    store: Arc<dyn KvStore>,
}

impl KvInventoryLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InventoryLedger for KvInventoryLedger {
    async fn add_item(&self, character_id: &str, item_id: &str, quantity: u64) -> LedgerResult<()> {
        let mut items = self.items(character_id).await?;
        let count = items.entry(item_id.to_string()).or_insert(0);
        *count = count.saturating_add(quantity);
        let json = serde_json::to_string(&items).map_err(|e| LedgerError::Encoding(e.to_string()))?;
        self.store
            .set(&inventory_key(character_id), &json, SetOptions::persistent())
            .await?;
        Ok(())
    }

    async fn items(&self, character_id: &str) -> LedgerResult<BTreeMap<String, u64>> {
        match self.store.get(&inventory_key(character_id)).await? {
            Some(json) => serde_json::from_str(&json).map_err(|e| LedgerError::Encoding(e.to_string())),
            None => Ok(BTreeMap::new()),
        }
    }
}

/// `character:{characterId}` blob access
pub struct CharacterLedger {
    store: Arc<dyn KvStore>,
}

impl CharacterLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Stored sheet, or a fresh level-1 sheet with base stats
    pub async fn load(&self, character_id: &str) -> LedgerResult<CharacterSheet> {
        match self.store.get(&character_key(character_id)).await? {
            Some(json) => {
                let mut sheet: CharacterSheet =
                    serde_json::from_str(&json).map_err(|e| LedgerError::Encoding(e.to_string()))?;
                sheet.ensure_base_stats();
                Ok(sheet)
            }
            None => Ok(CharacterSheet::default()),
        }
    }

    pub async fn save(&self, character_id: &str, sheet: &CharacterSheet) -> LedgerResult<()> {
        let json = serde_json::to_string(sheet).map_err(|e| LedgerError::Encoding(e.to_string()))?;
        self.store
            .set(&character_key(character_id), &json, SetOptions::persistent())
            .await?;
        Ok(())
    }

    async fn update<T>(&self, character_id: &str, f: impl FnOnce(&mut CharacterSheet) -> T) -> LedgerResult<T> {
        let mut sheet = self.load(character_id).await?;
        let value = f(&mut sheet);
        self.save(character_id, &sheet).await?;
        Ok(value)
    }
}

/// Result of a claim: which instance, what it paid and how the grant went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub instance_id: String,
    pub reward: RewardDescriptor,
    pub grant: RewardGrantResult,
    /// False when the ledgers were credited but the claim state could not be
    /// saved; the granted components are held in memory until a retry
    /// records them
    pub recorded: bool,
}

impl ClaimOutcome {
    pub fn claimed(&self) -> bool {
        self.grant.success
    }
}

pub struct RewardGrantEngine {
    store: Arc<dyn KvStore>,
    inventory: Arc<dyn InventoryLedger>,
    characters: CharacterLedger,
    clock: Arc<dyn Clock>,
    rng: Mutex<Xoshiro256PlusPlus>,
    /// (character, instance) → components granted but not yet saved
    unsaved: Mutex<HashMap<(String, String), Vec<String>>>,
    history_ttl_secs: u64,
    history_cap: usize,
}

impl RewardGrantEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        inventory: Arc<dyn InventoryLedger>,
        clock: Arc<dyn Clock>,
        rng_seed: Option<u64>,
        history_ttl_secs: u64,
        history_cap: usize,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Self {
            characters: CharacterLedger::new(store.clone()),
            store,
            inventory,
            clock,
            rng: Mutex::new(rng),
            unsaved: Mutex::new(HashMap::new()),
            history_ttl_secs,
            history_cap,
        }
    }

    pub fn characters(&self) -> &CharacterLedger {
        &self.characters
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryLedger> {
        &self.inventory
    }

    /// Apply every component not listed in `already_granted`. The caller
    /// holds the character's lock. Full success that applied anything
    /// appends to the history.
    pub async fn grant(
        &self,
        character_id: &str,
        source_id: &str,
        reward: &RewardDescriptor,
        already_granted: &[String],
    ) -> RewardGrantResult {
        let mut outcomes = Vec::new();
        let mut level_ups = Vec::new();

        for component in reward.components() {
            let key = component.key();
            if already_granted.contains(&key) {
                outcomes.push(ComponentOutcome::skipped(key));
                continue;
            }
            match self.apply(character_id, &component).await {
                Ok(mut gained) => {
                    level_ups.append(&mut gained);
                    outcomes.push(ComponentOutcome::granted(key));
                }
                Err(e) => {
                    warn!(character = character_id, source = source_id, component = %key, error = %e, "reward component failed");
                    outcomes.push(ComponentOutcome::failed(key, e.to_string()));
                }
            }
        }

        let granted_at = self.clock.now();
        let result = RewardGrantResult::new(outcomes, level_ups, granted_at);
        if result.success {
            info!(character = character_id, source = source_id, levels = result.level_ups.len(), "reward granted");
            if result.newly_granted().next().is_some() {
                self.push_history(character_id, source_id, reward, granted_at).await;
            }
        } else {
            warn!(character = character_id, source = source_id, failed = result.failed().count(), "reward partially granted");
        }
        result
    }

    async fn apply(&self, character_id: &str, component: &GrantComponent) -> LedgerResult<Vec<LevelUp>> {
        match component {
            GrantComponent::Experience(amount) => {
                let mut sheet = self.characters.load(character_id).await?;
                let level_ups = {
                    let mut rng = self.rng.lock();
                    sheet.gain_experience(*amount, &mut *rng)
                };
                self.characters.save(character_id, &sheet).await?;
                for up in &level_ups {
                    info!(character = character_id, level = up.level, "level up");
                }
                Ok(level_ups)
            }
            GrantComponent::Points(amount) => {
                self.characters
                    .update(character_id, |sheet| sheet.points = sheet.points.saturating_add(*amount))
                    .await?;
                Ok(Vec::new())
            }
            GrantComponent::Coins(amount) => {
                self.inventory.add_item(character_id, COIN_ITEM_ID, *amount).await?;
                Ok(Vec::new())
            }
            GrantComponent::Item(stack) => {
                self.inventory
                    .add_item(character_id, &stack.id, u64::from(stack.quantity))
                    .await?;
                Ok(Vec::new())
            }
            GrantComponent::Stats(boost) => {
                self.characters
                    .update(character_id, |sheet| sheet.apply_stats_boost(boost))
                    .await?;
                Ok(Vec::new())
            }
            GrantComponent::Title(title) => {
                self.characters.update(character_id, |sheet| sheet.add_title(title)).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Newest first
    pub async fn reward_history(&self, character_id: &str) -> Vec<RewardHistoryEntry> {
        match self.store.get(&reward_history_key(character_id)).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(character = character_id, error = %e, "reward history unreadable");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(character = character_id, error = %e, "reward history load failed");
                Vec::new()
            }
        }
    }

    async fn push_history(&self, character_id: &str, source_id: &str, reward: &RewardDescriptor, granted_at: DateTime<Utc>) {
        let mut history = self.reward_history(character_id).await;
        history.insert(
            0,
            RewardHistoryEntry {
                source_id: source_id.to_string(),
                reward: reward.clone(),
                granted_at,
            },
        );
        history.truncate(self.history_cap);

        let json = match serde_json::to_string(&history) {
            Ok(json) => json,
            Err(e) => {
                warn!(character = character_id, error = %e, "reward history encode failed");
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(&reward_history_key(character_id), &json, SetOptions::ex(self.history_ttl_secs))
            .await
        {
            warn!(character = character_id, error = %e, "reward history save failed");
        }
    }

    /// Grant the reward of a completed instance and mark the claim.
    ///
    /// Runs under `guard` from the precondition check to the claim marker.
    /// Components that landed are remembered even when others failed, so a
    /// retry only re-applies the failures. The claim is marked only once
    /// every component has succeeded. If the claim state cannot be saved
    /// after the ledgers were credited, the outcome is still returned with
    /// `recorded == false` and the granted keys are kept in memory for the
    /// next attempt.
    pub async fn claim(
        &self,
        progress: &EventProgressManager,
        guard: &CharacterGuard,
        instance_id: &str,
        reward: &RewardDescriptor,
    ) -> ProgressionResult<ClaimOutcome> {
        let character_id = guard.character_id();
        let record = progress
            .try_load(character_id)
            .await?
            .unwrap_or_default();
        let instance = record
            .find(instance_id)
            .ok_or_else(|| ProgressionError::not_found("instance", instance_id))?;
        if !instance.is_completed() {
            return Err(ProgressionError::PreconditionFailed(Precondition::NotCompleted));
        }
        if record.is_claimed(instance_id) {
            return Err(ProgressionError::AlreadyClaimed(instance_id.to_string()));
        }

        let pending_key = (character_id.to_string(), instance_id.to_string());
        let mut already = record.granted_components(instance_id);
        if let Some(unsaved) = self.unsaved.lock().get(&pending_key) {
            for key in unsaved {
                if !already.contains(key) {
                    already.push(key.clone());
                }
            }
        }

        let grant = self.grant(character_id, instance_id, reward, &already).await;
        already.extend(grant.newly_granted().map(str::to_string));

        let saved = progress
            .modify_locked(guard, |record, now| {
                let instance = record
                    .find_mut(instance_id)
                    .ok_or_else(|| ProgressionError::not_found("instance", instance_id))?;
                instance.record_granted(already.iter().map(String::as_str));
                if grant.success {
                    instance.mark_claimed(now)?;
                    info!(character = character_id, instance = instance_id, "reward claimed");
                }
                record.remember_claim(instance_id);
                Ok(((), true))
            })
            .await;

        let recorded = match saved {
            Ok(()) => {
                self.unsaved.lock().remove(&pending_key);
                true
            }
            Err(e) => {
                warn!(
                    character = character_id,
                    instance = instance_id,
                    error = %e,
                    "claim state not saved, granted components held for retry"
                );
                if !already.is_empty() {
                    self.unsaved.lock().insert(pending_key, already);
                }
                false
            }
        };

        Ok(ClaimOutcome {
            instance_id: instance_id.to_string(),
            reward: reward.clone(),
            grant,
            recorded,
        })
    }
}
