//! Daily and weekly quest manager
//!
//! Instances are regenerated per calendar bucket: `{templateId}-{YYYY-MM-DD}`
//! for dailies, `{templateId}-{YYYY-Www}` for weeklies. Every entry point
//! runs the reset-due check first, so an event arriving after rollover lands
//! on the new bucket's instances.

use chrono::{DateTime, Utc};
use progression_core::calendar::{daily_instance_id, strip_day_bucket, strip_week_bucket, weekly_instance_id};
use progression_core::{
    Partition, ProgressEvent, ProgressRecord, ProgressionError, ProgressionResult, QuestCatalog, QuestCategory,
    QuestInstance,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::progress_store::EventProgressManager;
use crate::quest_engine::QuestView;
use crate::rewards::{ClaimOutcome, RewardGrantEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly,
}

impl Recurrence {
    pub const ALL: [Recurrence; 2] = [Recurrence::Daily, Recurrence::Weekly];

    pub fn from_category(category: QuestCategory) -> Option<Self> {
        match category {
            QuestCategory::Daily => Some(Recurrence::Daily),
            QuestCategory::Weekly => Some(Recurrence::Weekly),
            _ => None,
        }
    }

    pub fn category(&self) -> QuestCategory {
        match self {
            Recurrence::Daily => QuestCategory::Daily,
            Recurrence::Weekly => QuestCategory::Weekly,
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::of(self.category())
    }

    pub fn instance_id(&self, template_id: &str, bucket: &str) -> String {
        match self {
            Recurrence::Daily => daily_instance_id(template_id, bucket),
            Recurrence::Weekly => weekly_instance_id(template_id, bucket),
        }
    }

    /// Template id of an instance id, if it carries this recurrence's suffix
    pub fn template_of<'a>(&self, instance_id: &'a str) -> Option<&'a str> {
        match self {
            Recurrence::Daily => strip_day_bucket(instance_id),
            Recurrence::Weekly => strip_week_bucket(instance_id),
        }
    }
}

pub struct RecurringQuestManager {
    catalog: Arc<QuestCatalog>,
    progress: Arc<EventProgressManager>,
    rewards: Arc<RewardGrantEngine>,
}

impl RecurringQuestManager {
    pub fn new(catalog: Arc<QuestCatalog>, progress: Arc<EventProgressManager>, rewards: Arc<RewardGrantEngine>) -> Self {
        Self {
            catalog,
            progress,
            rewards,
        }
    }

    /// Clear the partition, stamp the current bucket and create one instance
    /// per template
    fn regenerate(&self, record: &mut ProgressRecord, recurrence: Recurrence, now: DateTime<Utc>) {
        let bucket = match recurrence {
            Recurrence::Daily => self.progress.reset_daily_in(record, now),
            Recurrence::Weekly => self.progress.reset_weekly_in(record, now),
        };
        for template in self.catalog.by_category(recurrence.category()) {
            let id = recurrence.instance_id(&template.id, &bucket);
            record.upsert(QuestInstance::new(id, template.id.clone(), template.category, &template.objectives, now));
        }
        info!(bucket = %bucket, kind = recurrence.category().as_str(), "recurring quests regenerated");
    }

    /// Regenerate if the stored bucket is stale. Returns whether it did.
    fn ensure_current(&self, record: &mut ProgressRecord, recurrence: Recurrence, now: DateTime<Utc>) -> bool {
        let due = match recurrence {
            Recurrence::Daily => self.progress.daily_reset_due(record, now),
            Recurrence::Weekly => self.progress.weekly_reset_due(record, now),
        };
        if due {
            self.regenerate(record, recurrence, now);
        }
        due
    }

    fn views(&self, record: &ProgressRecord, recurrence: Recurrence) -> Vec<QuestView> {
        record
            .partition(recurrence.partition())
            .values()
            .map(|instance| {
                let template_id = recurrence.template_of(&instance.id).unwrap_or(&instance.template_id);
                QuestView::new(instance.clone(), self.catalog.get(template_id))
            })
            .collect()
    }

    async fn quests(&self, character_id: &str, recurrence: Recurrence, force: bool) -> Vec<QuestView> {
        let result = self
            .progress
            .modify(character_id, |record, now| {
                let changed = if force {
                    self.regenerate(record, recurrence, now);
                    true
                } else {
                    self.ensure_current(record, recurrence, now)
                };
                Ok((self.views(record, recurrence), changed))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "recurring quests unavailable");
            Vec::new()
        })
    }

    /// Today's daily quests, regenerated first if the day rolled over
    pub async fn get_daily_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.quests(character_id, Recurrence::Daily, false).await
    }

    /// This ISO week's quests, regenerated first if the week rolled over
    pub async fn get_weekly_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.quests(character_id, Recurrence::Weekly, false).await
    }

    /// Unconditional reset and regeneration for schedulers and operators
    pub async fn reset_daily_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.quests(character_id, Recurrence::Daily, true).await
    }

    pub async fn reset_weekly_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.quests(character_id, Recurrence::Weekly, true).await
    }

    /// Add the event's amount to every matching daily or weekly task.
    /// Returns whether anything changed. Other categories are ignored.
    pub async fn apply_event_progress(&self, character_id: &str, event: &ProgressEvent, category: QuestCategory) -> bool {
        let Some(recurrence) = Recurrence::from_category(category) else {
            return false;
        };
        let result = self
            .progress
            .modify(character_id, |record, now| {
                let reset = self.ensure_current(record, recurrence, now);
                let changed = !record.apply_event(category, event, now, |_| true).is_empty();
                Ok((changed, reset || changed))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "recurring progress not persisted");
            false
        })
    }

    /// Grant the reward of a completed daily or weekly instance once
    pub async fn complete_and_claim(&self, character_id: &str, instance_id: &str) -> ProgressionResult<ClaimOutcome> {
        let guard = self.progress.lock(character_id).await;
        let record = self.progress.try_load(character_id).await?.unwrap_or_default();

        let (recurrence, instance) = Recurrence::ALL
            .into_iter()
            .find_map(|r| record.partition(r.partition()).get(instance_id).map(|i| (r, i)))
            .ok_or_else(|| ProgressionError::not_found("recurring quest", instance_id))?;
        let template_id = recurrence.template_of(instance_id).unwrap_or(&instance.template_id);
        let reward = self
            .catalog
            .get(template_id)
            .ok_or_else(|| ProgressionError::not_found("quest template", template_id))?
            .reward
            .clone();

        self.rewards.claim(&self.progress, &guard, instance_id, &reward).await
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
        manager: RecurringQuestManager,
        clock: Arc<FixedClock>,
        rewards: Arc<RewardGrantEngine>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKvStore::new());
        // Monday of ISO week 43
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let progress = Arc::new(EventProgressManager::new(store.clone(), clock.clone(), Calendar::utc(), 86_400));
        let rewards = Arc::new(RewardGrantEngine::new(
            store.clone(),
            Arc::new(KvInventoryLedger::new(store)),
            clock.clone(),
            Some(11),
            604_800,
            100,
        ));
        Fixture {
            manager: RecurringQuestManager::new(Arc::new(QuestCatalog::builtin()), progress, rewards.clone()),
            clock,
            rewards,
        }
    }

    fn ids(views: &[QuestView]) -> Vec<String> {
        views.iter().map(|v| v.instance.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_daily_ids_follow_day_bucket() {
        let f = fixture();
        let today = ids(&f.manager.get_daily_quests("c1").await);
        assert_eq!(
            today,
            vec!["daily-coins-2026-10-19", "daily-explorer-2026-10-19", "daily-social-2026-10-19"]
        );
        assert_eq!(ids(&f.manager.get_daily_quests("c1").await), today);
        assert_eq!(ids(&f.manager.reset_daily_quests("c1").await), today);

        f.clock.advance(chrono::Duration::days(1));
        let tomorrow = ids(&f.manager.get_daily_quests("c1").await);
        assert!(tomorrow.iter().all(|id| id.ends_with("2026-10-20")));
    }

    #[tokio::test]
    async fn test_weekly_ids_follow_iso_week() {
        let f = fixture();
        let week = ids(&f.manager.get_weekly_quests("c1").await);
        assert!(week.iter().all(|id| id.ends_with("-2026-W43")));

        f.clock.advance(chrono::Duration::days(6));
        assert_eq!(ids(&f.manager.get_weekly_quests("c1").await), week);
        f.clock.advance(chrono::Duration::days(1));
        assert!(ids(&f.manager.get_weekly_quests("c1").await)
            .iter()
            .all(|id| id.ends_with("-2026-W44")));
    }

    #[tokio::test]
    async fn test_collect_sixty_then_forty() {
        let f = fixture();
        f.manager.get_daily_quests("c1").await;

        assert!(f.manager.apply_event_progress("c1", &ProgressEvent::collect("coin", 60), QuestCategory::Daily).await);
        let views = f.manager.get_daily_quests("c1").await;
        let coins = views.iter().find(|v| v.instance.template_id == "daily-coins").unwrap();
        assert_eq!(coins.instance.current_count("collect-coins-100"), 60);
        assert!(!coins.instance.is_completed());

        f.manager.apply_event_progress("c1", &ProgressEvent::collect("coin", 40), QuestCategory::Daily).await;
        let views = f.manager.get_daily_quests("c1").await;
        let coins = views.iter().find(|v| v.instance.template_id == "daily-coins").unwrap();
        assert_eq!(coins.instance.current_count("collect-coins-100"), 100);
        assert!(coins.instance.is_completed());
    }

    #[tokio::test]
    async fn test_explorer_counts_distinct_buildings() {
        let f = fixture();
        for building in [1, 1, 2, 2, 5] {
            f.manager
                .apply_event_progress("c1", &ProgressEvent::enter_building(building), QuestCategory::Daily)
                .await;
        }
        let views = f.manager.get_daily_quests("c1").await;
        let explorer = views.iter().find(|v| v.instance.template_id == "daily-explorer").unwrap();
        assert_eq!(explorer.instance.current_count("visit-3-buildings"), 3);
        assert!(explorer.instance.is_completed());
    }

    #[tokio::test]
    async fn test_events_after_rollover_hit_new_bucket() {
        let f = fixture();
        for _ in 0..4 {
            f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Daily).await;
        }
        f.clock.advance(chrono::Duration::days(1));
        f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Daily).await;

        let views = f.manager.get_daily_quests("c1").await;
        let social = views.iter().find(|v| v.instance.template_id == "daily-social").unwrap();
        assert_eq!(social.instance.id, "daily-social-2026-10-20");
        assert_eq!(social.instance.current_count("chat-5-times"), 1);
    }

    #[tokio::test]
    async fn test_claim_once() {
        let f = fixture();
        f.manager.get_daily_quests("c1").await;
        assert!(matches!(
            f.manager.complete_and_claim("c1", "daily-social-2026-10-19").await,
            Err(ProgressionError::PreconditionFailed(Precondition::NotCompleted))
        ));

        for _ in 0..5 {
            f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Daily).await;
        }
        let outcome = f.manager.complete_and_claim("c1", "daily-social-2026-10-19").await.unwrap();
        assert!(outcome.claimed());
        assert_eq!(outcome.reward.coins, 30);
        assert!(matches!(
            f.manager.complete_and_claim("c1", "daily-social-2026-10-19").await,
            Err(ProgressionError::AlreadyClaimed(_))
        ));
        assert_eq!(f.rewards.inventory().items("c1").await.unwrap()["coin"], 30);
        assert!(matches!(
            f.manager.complete_and_claim("c1", "daily-social-2026-10-18").await,
            Err(ProgressionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_claim_survives_same_day_reset() {
        let f = fixture();
        f.manager.get_daily_quests("c1").await;
        for _ in 0..5 {
            f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Daily).await;
        }
        assert!(f.manager.complete_and_claim("c1", "daily-social-2026-10-19").await.unwrap().claimed());

        f.manager.reset_daily_quests("c1").await;
        for _ in 0..5 {
            f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Daily).await;
        }
        assert!(matches!(
            f.manager.complete_and_claim("c1", "daily-social-2026-10-19").await,
            Err(ProgressionError::AlreadyClaimed(_))
        ));
        assert_eq!(f.rewards.inventory().items("c1").await.unwrap()["coin"], 30);
    }

    #[tokio::test]
    async fn test_non_recurring_category_is_ignored() {
        let f = fixture();
        assert!(!f.manager.apply_event_progress("c1", &ProgressEvent::chat(None), QuestCategory::Main).await);
    }
}
