//! Progression service: one entry point per transport call
//!
//! ```text
//! transport event (characterId, eventType, payload)
//!       ↓
//! ProgressionService::handle_event
//!       ├──> QuestEngine            (main / side)
//!       ├──> RecurringQuestManager  (daily, weekly)
//!       ├──> SeasonalEventManager
//!       └──> SpecialEventManager
//!               ↑
//!   completeQuest follow-up for every core quest that just completed
//! ```

use progression_core::logging::{init_tracing, TimingSpan};
use progression_core::{
    Calendar, EventCatalog, EventPayload, EventType, ProgressEvent, ProgressionError, ProgressionResult,
    QuestCatalog, QuestCategory, QuestInstance,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

use crate::activation::ActivationOverrides;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::progress_store::EventProgressManager;
use crate::quest_engine::{QuestEngine, QuestView};
use crate::recurring::RecurringQuestManager;
use crate::rewards::{InventoryLedger, KvInventoryLedger, RewardGrantEngine};
use crate::seasonal::SeasonalEventManager;
use crate::special::SpecialEventManager;
use crate::storage::{init_store, KvResult, KvStore};

/// What one transport event changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Core quest instances that advanced
    pub quests: Vec<QuestInstance>,
    /// Template ids of core quests completed by this event
    pub completed_quests: Vec<String>,
    pub daily: bool,
    pub weekly: bool,
    pub seasonal: bool,
    pub special: bool,
}

impl ProgressReport {
    pub fn any_changed(&self) -> bool {
        !self.quests.is_empty() || self.daily || self.weekly || self.seasonal || self.special
    }
}

/// First-login setup result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInit {
    pub welcome_assigned: bool,
    pub daily: Vec<QuestView>,
    pub weekly: Vec<QuestView>,
    pub seasonal_created: usize,
    pub special_created: usize,
}

pub struct ProgressionService {
    store: Arc<dyn KvStore>,
    progress: Arc<EventProgressManager>,
    rewards: Arc<RewardGrantEngine>,
    quests: QuestEngine,
    recurring: RecurringQuestManager,
    seasonal: SeasonalEventManager,
    special: SpecialEventManager,
}

impl ProgressionService {
    pub fn new(config: &EngineConfig, store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        let inventory = Arc::new(KvInventoryLedger::new(store.clone()));
        Self::with_inventory(config, store, clock, inventory)
    }

    /// Build with a caller-supplied inventory collaborator
    pub fn with_inventory(
        config: &EngineConfig,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        inventory: Arc<dyn InventoryLedger>,
    ) -> Self {
        let calendar = Calendar::with_offset_minutes(config.utc_offset_minutes);
        let progress = Arc::new(EventProgressManager::new(
            store.clone(),
            clock.clone(),
            calendar,
            config.progress_ttl_secs,
        ));
        let rewards = Arc::new(RewardGrantEngine::new(
            store.clone(),
            inventory,
            clock.clone(),
            config.rng_seed,
            config.reward_history_ttl_secs,
            config.reward_history_cap,
        ));
        let quest_catalog = Arc::new(QuestCatalog::builtin());
        let event_catalog = Arc::new(EventCatalog::builtin());
        let overrides = Arc::new(ActivationOverrides::new(store.clone(), clock));

        Self {
            quests: QuestEngine::new(quest_catalog.clone(), progress.clone(), rewards.clone()),
            recurring: RecurringQuestManager::new(quest_catalog, progress.clone(), rewards.clone()),
            seasonal: SeasonalEventManager::new(
                event_catalog.clone(),
                progress.clone(),
                rewards.clone(),
                overrides.clone(),
            ),
            special: SpecialEventManager::new(event_catalog, progress.clone(), rewards.clone(), overrides),
            store,
            progress,
            rewards,
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn progress(&self) -> &EventProgressManager {
        &self.progress
    }

    pub fn rewards(&self) -> &RewardGrantEngine {
        &self.rewards
    }

    pub fn quests(&self) -> &QuestEngine {
        &self.quests
    }

    pub fn recurring(&self) -> &RecurringQuestManager {
        &self.recurring
    }

    pub fn seasonal(&self) -> &SeasonalEventManager {
        &self.seasonal
    }

    pub fn special(&self) -> &SpecialEventManager {
        &self.special
    }

    /// Route one transport event to every manager
    pub async fn handle_event(&self, character_id: &str, event_type: EventType, payload: EventPayload) -> ProgressReport {
        let timing = TimingSpan::new("handle_event", character_id);
        let event = ProgressEvent::new(event_type, payload);
        async {
            let quests = self.quests.apply_progress(character_id, &event).await;
            let completed_quests: Vec<String> = quests
                .iter()
                .filter(|q| q.is_completed())
                .map(|q| q.template_id.clone())
                .collect();

            let mut report = ProgressReport {
                quests,
                completed_quests,
                ..Default::default()
            };
            self.fan_out(character_id, &event, &mut report).await;

            for quest_id in report.completed_quests.clone() {
                debug!(character = character_id, quest = %quest_id, "forwarding quest completion");
                let follow_up = ProgressEvent::quest_completed(quest_id);
                self.fan_out(character_id, &follow_up, &mut report).await;
            }
            report
        }
        .instrument(timing.span())
        .await
    }

    async fn fan_out(&self, character_id: &str, event: &ProgressEvent, report: &mut ProgressReport) {
        report.daily |= self
            .recurring
            .apply_event_progress(character_id, event, QuestCategory::Daily)
            .await;
        report.weekly |= self
            .recurring
            .apply_event_progress(character_id, event, QuestCategory::Weekly)
            .await;
        report.seasonal |= self.seasonal.apply_event_progress(character_id, event).await;
        report.special |= self.special.apply_event_progress(character_id, event).await;
    }

    /// [`Self::handle_event`] for loosely typed transport input
    pub async fn handle_raw(
        &self,
        character_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> ProgressionResult<ProgressReport> {
        let event_type: EventType = event_type.parse().map_err(ProgressionError::Malformed)?;
        let payload: EventPayload = if payload.is_null() {
            EventPayload::default()
        } else {
            serde_json::from_value(payload).map_err(|e| ProgressionError::Malformed(e.to_string()))?
        };
        Ok(self.handle_event(character_id, event_type, payload).await)
    }

    /// First-login setup: welcome quest, today's dailies, this week's
    /// weeklies, current season and active special events
    pub async fn initialize_character(&self, character_id: &str) -> ProgressionResult<CharacterInit> {
        let timing = TimingSpan::new("initialize_character", character_id);
        async {
            let welcome_assigned = self.quests.initialize_character(character_id).await?;
            let daily = self.recurring.get_daily_quests(character_id).await;
            let weekly = self.recurring.get_weekly_quests(character_id).await;
            let seasonal_created = self.seasonal.initialize_character(character_id).await?;
            let special_created = self.special.initialize_character(character_id).await?;
            info!(
                character = character_id,
                welcome_assigned, seasonal_created, special_created, "character initialized"
            );
            Ok(CharacterInit {
                welcome_assigned,
                daily,
                weekly,
                seasonal_created,
                special_created,
            })
        }
        .instrument(timing.span())
        .await
    }
}

/// Install tracing, open the configured store and build the service
pub fn init_engine(config: &EngineConfig) -> KvResult<ProgressionService> {
    init_tracing(&config.tracing);
    let store = init_store(&config.store)?;
    info!(
        offset_minutes = config.utc_offset_minutes,
        seeded = config.rng_seed.is_some(),
        "progression engine ready"
    );
    Ok(ProgressionService::new(config, store, Arc::new(SystemClock)))
}
