//! Special (one-off holiday) event manager
//!
//! Instances are keyed by the bare event id. An event is active while it is
//! switched on (catalog flag or operator override) and its window contains
//! now. Claims additionally require the event to still be active.

use chrono::{DateTime, Utc};
use progression_core::constants::special_override_key;
use progression_core::{
    EventCatalog, Partition, Precondition, ProgressEvent, ProgressRecord, ProgressionError, ProgressionResult,
    QuestCategory, QuestInstance, SpecialEffects, SpecialEvent, TaskValue,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::activation::ActivationOverrides;
use crate::progress_store::EventProgressManager;
use crate::rewards::{ClaimOutcome, RewardGrantEngine};
use crate::seasonal::EventView;

pub struct SpecialEventManager {
    events: Arc<EventCatalog>,
    progress: Arc<EventProgressManager>,
    rewards: Arc<RewardGrantEngine>,
    overrides: Arc<ActivationOverrides>,
}

impl SpecialEventManager {
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

    async fn is_active(&self, event: &SpecialEvent, now: DateTime<Utc>) -> bool {
        let switched_on = self
            .overrides
            .resolve(&special_override_key(&event.event_id), event.is_active)
            .await;
        event.window.is_active(switched_on, now)
    }

    pub fn all_special_events(&self) -> &[SpecialEvent] {
        self.events.specials()
    }

    /// Active events, `is_active` reflecting overrides
    pub async fn active_special_events(&self) -> Vec<SpecialEvent> {
        let now = self.progress.now();
        let mut active = Vec::new();
        for event in self.events.specials() {
            if self.is_active(event, now).await {
                active.push(SpecialEvent {
                    is_active: true,
                    ..event.clone()
                });
            }
        }
        active
    }

    pub async fn activate_special_event(&self, event_id: &str) -> bool {
        self.switch(event_id, true).await
    }

    pub async fn deactivate_special_event(&self, event_id: &str) -> bool {
        self.switch(event_id, false).await
    }

    async fn switch(&self, event_id: &str, on: bool) -> bool {
        if self.events.special(event_id).is_none() {
            warn!(event = event_id, "unknown special event");
            return false;
        }
        self.overrides.set(&special_override_key(event_id), on).await
    }

    /// Create instances for every active special event. Existing instances
    /// are left alone. Returns how many were created.
    pub async fn initialize_character(&self, character_id: &str) -> ProgressionResult<usize> {
        let active = self.active_special_events().await;
        if active.is_empty() {
            return Ok(0);
        }
        self.progress
            .modify(character_id, |record, now| {
                let mut created = 0;
                for event in &active {
                    if record.special_events.contains_key(&event.event_id) {
                        continue;
                    }
                    record.upsert(QuestInstance::new(
                        event.event_id.clone(),
                        event.event_id.clone(),
                        QuestCategory::Special,
                        &event.tasks,
                        now,
                    ));
                    created += 1;
                }
                if created > 0 {
                    info!(character = character_id, created, "special events initialized");
                }
                Ok((created, created > 0))
            })
            .await
    }

    /// Expire unfinished instances whose event ended; drop instances whose
    /// event left the catalog
    fn sweep(&self, record: &mut ProgressRecord, now: DateTime<Utc>) -> bool {
        let before = record.special_events.len();
        record.special_events.retain(|id, _| self.events.special(id).is_some());
        let mut changed = record.special_events.len() != before;
        changed |= record.prune_claims(QuestCategory::Special, |id| self.events.special(id).is_some());

        for (id, instance) in record.special_events.iter_mut() {
            let ended = self.events.special(id).is_some_and(|e| e.window.has_ended(now));
            if ended && instance.expire() {
                info!(instance = %id, "special event expired");
                changed = true;
            }
        }
        changed
    }

    /// Active events merged with the character's state
    pub async fn character_events(&self, character_id: &str) -> Vec<EventView> {
        let active = self.active_special_events().await;
        let views = |record: &ProgressRecord| -> Vec<EventView> {
            active
                .iter()
                .map(|e| EventView::special(e, true, record.special_events.get(&e.event_id)))
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
            warn!(character = character_id, error = %e, "special event progress unavailable");
            views(&ProgressRecord::new())
        })
    }

    /// Progress for instances of active special events. Returns whether
    /// anything changed.
    pub async fn apply_event_progress(&self, character_id: &str, event: &ProgressEvent) -> bool {
        let active: Vec<String> = self
            .active_special_events()
            .await
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        if active.is_empty() {
            return false;
        }
        let result = self
            .progress
            .modify(character_id, |record, now| {
                let changed = !record
                    .apply_event(QuestCategory::Special, event, now, |i| active.contains(&i.id))
                    .is_empty();
                Ok((changed, changed))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "special event progress not persisted");
            false
        })
    }

    /// Set a task value on a special event instance only
    pub async fn update_task(&self, character_id: &str, task_id: &str, value: TaskValue) -> bool {
        self.progress
            .update_task_in(character_id, Some(Partition::SpecialEvents), task_id, value)
            .await
    }

    /// Grant the reward of a completed, still active special event once
    pub async fn claim_reward(&self, character_id: &str, event_id: &str) -> ProgressionResult<ClaimOutcome> {
        let guard = self.progress.lock(character_id).await;
        let record = self.progress.try_load(character_id).await?.unwrap_or_default();
        if record.is_claimed(event_id) {
            return Err(ProgressionError::AlreadyClaimed(event_id.to_string()));
        }
        let event = self
            .events
            .special(event_id)
            .ok_or_else(|| ProgressionError::not_found("special event", event_id))?;
        if !self.is_active(event, self.progress.now()).await {
            return Err(ProgressionError::PreconditionFailed(Precondition::EventNotActive));
        }

        self.rewards.claim(&self.progress, &guard, event_id, &event.reward).await
    }

    /// World presentation of a special event
    pub fn event_effects(&self, event_id: &str) -> Option<&SpecialEffects> {
        self.events.special(event_id)?.special_effects.as_ref()
    }
}
