//! Seasonal event manager
//!
//! Instances are keyed `seasonId:eventId` and created on first access for
//! the season whose window contains today. A seasonal event takes progress
//! only while its season is switched on and both the season's and the
//! event's windows contain now.

use chrono::{DateTime, Utc};
use progression_core::calendar::{seasonal_instance_id, split_seasonal_instance_id};
use progression_core::constants::season_override_key;
use progression_core::{
    EventCatalog, EventWindow, Objective, Partition, ProgressEvent, ProgressRecord, ProgressionError,
    ProgressionResult, QuestCategory, QuestInstance, QuestStatus, RewardDescriptor, SeasonDefinition, SeasonType,
    SeasonalEvent, SpecialEffects, SpecialEvent, TaskValue,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::activation::ActivationOverrides;
use crate::progress_store::EventProgressManager;
use crate::rewards::{ClaimOutcome, RewardGrantEngine};

/// Character-facing status of a dated event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    NotStarted,
    Available,
    #[serde(rename = "progress")]
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl From<QuestStatus> for EventStatus {
    fn from(status: QuestStatus) -> Self {
        match status {
            QuestStatus::Available => EventStatus::Available,
            QuestStatus::InProgress => EventStatus::InProgress,
            QuestStatus::Completed => EventStatus::Completed,
            QuestStatus::Failed => EventStatus::Failed,
            QuestStatus::Expired => EventStatus::Expired,
        }
    }
}

/// A seasonal or special event merged with the character's instance state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub event_id: String,
    pub instance_id: String,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub window: EventWindow,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "rewards")]
    pub reward: RewardDescriptor,
    pub tasks: Vec<Objective>,
    pub status: EventStatus,
    pub progress: u32,
    pub max_progress: u32,
    pub completed_tasks: Vec<String>,
    pub reward_claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_effects: Option<SpecialEffects>,
}

impl EventView {
    pub fn seasonal(season_id: &str, event: &SeasonalEvent, is_active: bool, instance: Option<&QuestInstance>) -> Self {
        Self {
            event_id: event.event_id.clone(),
            instance_id: seasonal_instance_id(season_id, &event.event_id),
            title: event.title.clone(),
            description: event.description.clone(),
            window: event.window,
            is_active,
            image_url: event.image_url.clone(),
            reward: event.reward.clone(),
            tasks: event.tasks.clone(),
            status: EventStatus::NotStarted,
            progress: 0,
            max_progress: event.tasks.len() as u32,
            completed_tasks: Vec::new(),
            reward_claimed: false,
            special_effects: None,
        }
        .with_instance(instance)
    }

    pub fn special(event: &SpecialEvent, is_active: bool, instance: Option<&QuestInstance>) -> Self {
        Self {
            event_id: event.event_id.clone(),
            instance_id: event.event_id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            window: event.window,
            is_active,
            image_url: event.image_url.clone(),
            reward: event.reward.clone(),
            tasks: event.tasks.clone(),
            status: EventStatus::NotStarted,
            progress: 0,
            max_progress: event.tasks.len() as u32,
            completed_tasks: Vec::new(),
            reward_claimed: false,
            special_effects: event.special_effects.clone(),
        }
        .with_instance(instance)
    }

    fn with_instance(mut self, instance: Option<&QuestInstance>) -> Self {
        if let Some(instance) = instance {
            self.status = instance.status.into();
            self.progress = instance.progress;
            self.max_progress = instance.max_progress;
            self.completed_tasks = instance.completed_tasks.clone();
            self.reward_claimed = instance.reward_claimed;
        }
        self
    }
}

/// Active seasonal event tagged with its season
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSeasonalEvent {
    pub season_id: String,
    pub season_type: SeasonType,
    #[serde(flatten)]
    pub event: SeasonalEvent,
}

pub struct SeasonalEventManager {
    events: Arc<EventCatalog>,
    progress: Arc<EventProgressManager>,
    rewards: Arc<RewardGrantEngine>,
    overrides: Arc<ActivationOverrides>,
}

impl SeasonalEventManager {
    pub fn new(
        events: Arc<EventCatalog>,
        progress: Arc<EventProgressManager>,
        rewards: Arc<RewardGrantEngine>,
        overrides: Arc<ActivationOverrides>,
    ) -> Self {
        Self {
            events,
            progress,
            rewards,
            overrides,
        }
    }

    /// Catalog flag with the operator override applied
    pub async fn season_switched_on(&self, season: &SeasonDefinition) -> bool {
        self.overrides
            .resolve(&season_override_key(&season.season_id), season.is_active)
            .await
    }

    /// Season whose window contains now, its `is_active` set to whether it
    /// is switched on and live
    pub async fn current_season(&self) -> Option<SeasonDefinition> {
        let now = self.progress.now();
        let season = self.events.current_season(now)?;
        let live = season.is_live(self.season_switched_on(season).await, now);
        Some(SeasonDefinition {
            is_active: live,
            ..season.clone()
        })
    }

    /// Instance ids of every seasonal event currently taking progress
    async fn live_instance_ids(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for season in self.events.seasons() {
            if !season.is_live(self.season_switched_on(season).await, now) {
                continue;
            }
            ids.extend(
                season
                    .events
                    .iter()
                    .filter(|e| e.window.contains(now))
                    .map(|e| seasonal_instance_id(&season.season_id, &e.event_id)),
            );
        }
        ids
    }

    pub async fn active_season_events(&self) -> Vec<ActiveSeasonalEvent> {
        let now = self.progress.now();
        let mut active = Vec::new();
        for season in self.events.seasons() {
            if !season.is_live(self.season_switched_on(season).await, now) {
                continue;
            }
            active.extend(season.events.iter().filter(|e| e.window.contains(now)).map(|e| ActiveSeasonalEvent {
                season_id: season.season_id.clone(),
                season_type: season.season_type,
                event: e.clone(),
            }));
        }
        active
    }

    pub async fn start_season(&self, season_id: &str) -> bool {
        self.switch(season_id, true).await
    }

    pub async fn end_season(&self, season_id: &str) -> bool {
        self.switch(season_id, false).await
    }

    async fn switch(&self, season_id: &str, on: bool) -> bool {
        if self.events.season(season_id).is_none() {
            warn!(season = season_id, "unknown season");
            return false;
        }
        let changed = self.overrides.set(&season_override_key(season_id), on).await;
        if changed {
            info!(season = season_id, on, "season switched");
        }
        changed
    }

    /// Create instances for every event of the current season. Existing
    /// instances are left alone. Returns how many were created.
    pub async fn initialize_character(&self, character_id: &str) -> ProgressionResult<usize> {
        let Some(season) = self.events.current_season(self.progress.now()) else {
            return Ok(0);
        };
        self.progress
            .modify(character_id, |record, now| {
                let mut created = 0;
                for event in &season.events {
                    let id = seasonal_instance_id(&season.season_id, &event.event_id);
                    if record.season_events.contains_key(&id) {
                        continue;
                    }
                    record.upsert(QuestInstance::new(id, event.event_id.clone(), QuestCategory::Seasonal, &event.tasks, now));
                    created += 1;
                }
                if created > 0 {
                    info!(character = character_id, season = %season.season_id, created, "season events initialized");
                }
                Ok((created, created > 0))
            })
            .await
    }

    /// Expire unfinished instances whose event ended; drop instances whose
    /// event left the catalog
    fn sweep(&self, record: &mut ProgressRecord, now: DateTime<Utc>) -> bool {
        let known = |id: &str| {
            split_seasonal_instance_id(id)
                .and_then(|(season, event)| self.events.season(season).and_then(|s| s.event(event)))
                .is_some()
        };
        let before = record.season_events.len();
        record.season_events.retain(|id, _| known(id.as_str()));
        let mut changed = record.season_events.len() != before;
        changed |= record.prune_claims(QuestCategory::Seasonal, known);

        for (id, instance) in record.season_events.iter_mut() {
            let ended = split_seasonal_instance_id(id)
                .and_then(|(season, event)| self.events.season(season).and_then(|s| s.event(event)))
                .is_some_and(|e| e.window.has_ended(now));
            if ended && instance.expire() {
                info!(instance = %id, "seasonal event expired");
                changed = true;
            }
        }
        changed
    }

    /// Every event of the current season merged with the character's state
    pub async fn character_events(&self, character_id: &str) -> Vec<EventView> {
        let now = self.progress.now();
        let Some(season) = self.events.current_season(now) else {
            return Vec::new();
        };
        let switched_on = self.season_switched_on(season).await;
        let live = |event: &SeasonalEvent| season.is_live(switched_on, now) && event.window.contains(now);
        let views = |record: &ProgressRecord| -> Vec<EventView> {
            season
                .events
                .iter()
                .map(|e| {
                    let id = seasonal_instance_id(&season.season_id, &e.event_id);
                    EventView::seasonal(&season.season_id, e, live(e), record.season_events.get(&id))
                })
                .collect()
        };

        let result = self
            .progress
            .modify(character_id, |record, now| {
                let changed = self.sweep(record, now);
                Ok((views(&*record), changed))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "seasonal progress unavailable");
            views(&ProgressRecord::new())
        })
    }

    /// Progress for seasonal instances whose event is live. Returns whether
    /// anything changed.
    pub async fn apply_event_progress(&self, character_id: &str, event: &ProgressEvent) -> bool {
        let live = self.live_instance_ids(self.progress.now()).await;
        if live.is_empty() {
            return false;
        }
        let result = self
            .progress
            .modify(character_id, |record, now| {
                let changed = !record
                    .apply_event(QuestCategory::Seasonal, event, now, |i| live.contains(&i.id))
                    .is_empty();
                Ok((changed, changed))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "seasonal progress not persisted");
            false
        })
    }

    /// Set a task value on a seasonal instance only
    pub async fn update_task(&self, character_id: &str, task_id: &str, value: TaskValue) -> bool {
        self.progress
            .update_task_in(character_id, Some(Partition::SeasonEvents), task_id, value)
            .await
    }

    /// Grant the reward of a completed event of the current season once
    pub async fn claim_reward(&self, character_id: &str, event_id: &str) -> ProgressionResult<ClaimOutcome> {
        let guard = self.progress.lock(character_id).await;
        let season = self
            .events
            .current_season(self.progress.now())
            .ok_or_else(|| ProgressionError::not_found("season", "current"))?;
        let instance_id = seasonal_instance_id(&season.season_id, event_id);

        let record = self.progress.try_load(character_id).await?.unwrap_or_default();
        if record.is_claimed(&instance_id) {
            return Err(ProgressionError::AlreadyClaimed(instance_id));
        }
        let event = season
            .event(event_id)
            .ok_or_else(|| ProgressionError::not_found("seasonal event", event_id))?;

        self.rewards.claim(&self.progress, &guard, &instance_id, &event.reward).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::rewards::KvInventoryLedger;
    use crate::storage::MemoryKvStore;
    use chrono::TimeZone;
    use progression_core::{Calendar, Precondition};

    struct Fixture {
        manager: SeasonalEventManager,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKvStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let progress = Arc::new(EventProgressManager::new(store.clone(), clock.clone(), Calendar::utc(), 86_400));
        let rewards = Arc::new(RewardGrantEngine::new(
            store.clone(),
            Arc::new(KvInventoryLedger::new(store.clone())),
            clock.clone(),
            Some(5),
            604_800,
            100,
        ));
        let overrides = Arc::new(ActivationOverrides::new(store, clock.clone()));
        Fixture {
            manager: SeasonalEventManager::new(Arc::new(EventCatalog::builtin()), progress, rewards, overrides),
            clock,
        }
    }

    fn forest() -> ProgressEvent {
        ProgressEvent::enter_building("forest")
    }

    #[tokio::test]
    async fn test_current_season_respects_switch() {
        let f = fixture();
        let season = f.manager.current_season().await.unwrap();
        assert_eq!(season.season_id, "autumn-2026");
        assert!(!season.is_active);
        assert!(f.manager.active_season_events().await.is_empty());

        assert!(f.manager.start_season("autumn-2026").await);
        assert!(f.manager.current_season().await.unwrap().is_active);
        let active = f.manager.active_season_events().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].event.event_id, "fall-fest-2026");

        assert!(!f.manager.start_season("autumn-1999").await);
    }

    #[tokio::test]
    async fn test_progress_only_while_live() {
        let f = fixture();
        assert_eq!(f.manager.initialize_character("c1").await.unwrap(), 1);
        assert_eq!(f.manager.initialize_character("c1").await.unwrap(), 0);

        assert!(!f.manager.apply_event_progress("c1", &forest()).await);
        f.manager.start_season("autumn-2026").await;
        assert!(f.manager.apply_event_progress("c1", &forest()).await);

        let views = f.manager.character_events("c1").await;
        assert_eq!(views[0].instance_id, "autumn-2026:fall-fest-2026");
        assert_eq!(views[0].status, EventStatus::InProgress);
        assert!(views[0].is_active);
    }

    #[tokio::test]
    async fn test_claim_flow() {
        let f = fixture();
        f.manager.initialize_character("c1").await.unwrap();
        f.manager.start_season("autumn-2026").await;

        assert!(matches!(
            f.manager.claim_reward("c1", "fall-fest-2026").await,
            Err(ProgressionError::PreconditionFailed(Precondition::NotCompleted))
        ));
        assert!(matches!(
            f.manager.claim_reward("c1", "cherry-blossom-2026").await,
            Err(ProgressionError::NotFound { .. })
        ));

        for _ in 0..5 {
            f.manager.apply_event_progress("c1", &forest()).await;
        }
        let outcome = f.manager.claim_reward("c1", "fall-fest-2026").await.unwrap();
        assert!(outcome.claimed());
        assert!(matches!(
            f.manager.claim_reward("c1", "fall-fest-2026").await,
            Err(ProgressionError::AlreadyClaimed(_))
        ));
    }

    #[tokio::test]
    async fn test_update_task_is_restricted_to_seasonal() {
        let f = fixture();
        f.manager.initialize_character("c1").await.unwrap();
        assert!(f.manager.update_task("c1", "visit-forest-5-times", TaskValue::Count(5)).await);
        assert!(!f.manager.update_task("c1", "chat-5-times", TaskValue::Count(5)).await);
        let views = f.manager.character_events("c1").await;
        assert_eq!(views[0].status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn test_unfinished_event_expires_after_window() {
        let f = fixture();
        f.manager.initialize_character("c1").await.unwrap();
        f.clock.set(Utc.with_ymd_and_hms(2026, 11, 30, 23, 59, 59).unwrap());
        assert_eq!(f.manager.character_events("c1").await[0].status, EventStatus::InProgress);

        // Autumn is over; listing under winter still sweeps the old instance
        f.clock.set(Utc.with_ymd_and_hms(2026, 12, 2, 0, 0, 0).unwrap());
        let views = f.manager.character_events("c1").await;
        assert_eq!(views[0].event_id, "winter-fest-2026");
        let record = f.manager.progress.load("c1").await;
        assert_eq!(record.season_events["autumn-2026:fall-fest-2026"].status, QuestStatus::Expired);
    }
}
