//! Event progress manager: the shared instance lifecycle
//!
//! Loads and saves whole [`ProgressRecord`]s through the [`KvStore`] and
//! offers the lifecycle primitives every category manager builds on.
//! Absence of a record is a valid state: it loads as a fresh record.
//!
//! A record is stored in two parts. Core quests and claim markers live
//! under `quest:progress:{id}` without expiry; the event partitions and
//! reset buckets live under `event:progress:{id}` with the progress TTL.
//!
//! Read-only callers degrade to "no data" on any failure. Writers never
//! save over a record they could not read: a store error rejects the
//! change, while an unparsable part is logged and replaced.

use chrono::{DateTime, Utc};
use progression_core::constants::{progress_key, quest_progress_key};
use progression_core::progress::{InstanceMap, Partition};
use progression_core::{
    Calendar, ClaimMarker, Objective, ProgressEvent, ProgressRecord, ProgressionError, ProgressionResult,
    QuestCategory, QuestInstance, TaskValue,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::locks::{CharacterGuard, CharacterLocks};
use crate::storage::{KvStore, SetOptions};

/// Stored under `quest:progress:{id}`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DurableView<'a> {
    quests: &'a InstanceMap,
    claims: &'a BTreeMap<String, ClaimMarker>,
    revision: u64,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DurableProgress {
    #[serde(default)]
    quests: InstanceMap,
    #[serde(default)]
    claims: BTreeMap<String, ClaimMarker>,
    #[serde(default)]
    revision: u64,
}

/// Stored under `event:progress:{id}`; parsed back as a [`ProgressRecord`]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventView<'a> {
    season_events: &'a InstanceMap,
    special_events: &'a InstanceMap,
    daily_quests: &'a InstanceMap,
    weekly_quests: &'a InstanceMap,
    last_daily_reset: &'a Option<String>,
    last_weekly_reset: &'a Option<String>,
    revision: u64,
}

pub struct EventProgressManager {
    store: Arc<dyn KvStore>,
    locks: CharacterLocks,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    ttl_secs: u64,
}

impl EventProgressManager {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, calendar: Calendar, ttl_secs: u64) -> Self {
        Self {
            store,
            locks: CharacterLocks::new(),
            clock,
            calendar,
            ttl_secs,
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn today(&self) -> String {
        self.calendar.day_bucket(self.now())
    }

    pub fn this_week(&self) -> String {
        self.calendar.week_bucket(self.now())
    }

    /// Serialize all mutations of one character
    pub async fn lock(&self, character_id: &str) -> CharacterGuard {
        self.locks.lock(character_id).await
    }

    // =====================================================
    // Load / save
    // =====================================================

    async fn fetch(&self, key: &str) -> ProgressionResult<Option<String>> {
        self.store
            .get(key)
            .await
            .map_err(|e| ProgressionError::Unavailable(e.to_string()))
    }

    /// Parse one stored part. `lenient` replaces unparsable data with an
    /// empty part instead of failing.
    fn decode<T>(&self, character_id: &str, part: &str, json: &str, lenient: bool) -> ProgressionResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match serde_json::from_str(json) {
            Ok(value) => Ok(value),
            Err(e) if lenient => {
                error!(character = character_id, part, error = %e, "unreadable progress replaced with empty state");
                Ok(T::default())
            }
            Err(e) => Err(ProgressionError::Malformed(e.to_string())),
        }
    }

    async fn read(&self, character_id: &str, lenient: bool) -> ProgressionResult<Option<ProgressRecord>> {
        if !self.store.is_enabled() {
            return Err(ProgressionError::Unavailable("store disabled".into()));
        }
        let durable = self.fetch(&quest_progress_key(character_id)).await?;
        let events = self.fetch(&progress_key(character_id)).await?;
        if durable.is_none() && events.is_none() {
            return Ok(None);
        }

        let mut record: ProgressRecord = match events {
            Some(json) => self.decode(character_id, "events", &json, lenient)?,
            None => ProgressRecord::new(),
        };
        // Records written before the split keep their quests in the event part
        if let Some(json) = durable {
            let durable: DurableProgress = self.decode(character_id, "quests", &json, lenient)?;
            record.quests = durable.quests;
            record.claims = durable.claims;
            record.revision = record.revision.max(durable.revision);
        }
        Ok(Some(record))
    }

    /// Persisted record, `Ok(None)` if there is none
    pub async fn try_load(&self, character_id: &str) -> ProgressionResult<Option<ProgressRecord>> {
        self.read(character_id, false).await
    }

    /// Persisted record, or a fresh one if absent or unreadable. Read-only
    /// callers only: never save what this returns after an error.
    pub async fn load(&self, character_id: &str) -> ProgressRecord {
        match self.try_load(character_id).await {
            Ok(Some(record)) => record,
            Ok(None) => ProgressRecord::new(),
            Err(e) => {
                warn!(character = character_id, error = %e, "progress load failed, using empty record");
                ProgressRecord::new()
            }
        }
    }

    /// Whole-record replace: quests and claim markers without expiry, the
    /// event partitions with the progress TTL. Bumps the revision on
    /// success; returns false if persistence is unavailable.
    pub async fn save(&self, character_id: &str, record: &mut ProgressRecord) -> bool {
        if !self.store.is_enabled() {
            warn!(character = character_id, "store disabled, progress not saved");
            return false;
        }
        record.revision += 1;
        let saved = self.write(character_id, record).await;
        if saved {
            debug!(character = character_id, revision = record.revision, "progress saved");
        } else {
            record.revision -= 1;
        }
        saved
    }

    async fn write(&self, character_id: &str, record: &ProgressRecord) -> bool {
        let durable = DurableView {
            quests: &record.quests,
            claims: &record.claims,
            revision: record.revision,
        };
        let events = EventView {
            season_events: &record.season_events,
            special_events: &record.special_events,
            daily_quests: &record.daily_quests,
            weekly_quests: &record.weekly_quests,
            last_daily_reset: &record.last_daily_reset,
            last_weekly_reset: &record.last_weekly_reset,
            revision: record.revision,
        };
        let (durable, events) = match (serde_json::to_string(&durable), serde_json::to_string(&events)) {
            (Ok(d), Ok(e)) => (d, e),
            (Err(e), _) | (_, Err(e)) => {
                warn!(character = character_id, error = %e, "progress encode failed");
                return false;
            }
        };

        let writes = [
            (quest_progress_key(character_id), durable, SetOptions::persistent()),
            (progress_key(character_id), events, SetOptions::ex(self.ttl_secs)),
        ];
        for (key, json, options) in writes {
            if let Err(e) = self.store.set(&key, &json, options).await {
                warn!(character = character_id, key = %key, error = %e, "progress save failed");
                return false;
            }
        }
        true
    }

    /// Load, mutate and save while the caller holds the character's lock.
    /// `f` returns its result and whether the record changed; unchanged
    /// records are not written back. A failed read aborts with
    /// `Unavailable` so stored progress is never overwritten by an empty
    /// record; unparsable parts are replaced.
    pub async fn modify_locked<T, F>(&self, guard: &CharacterGuard, f: F) -> ProgressionResult<T>
    where
        F: FnOnce(&mut ProgressRecord, DateTime<Utc>) -> ProgressionResult<(T, bool)>,
    {
        let character_id = guard.character_id();
        let mut record = match self.read(character_id, true).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(character = character_id, error = %e, "progress read failed, change rejected");
                return Err(e);
            }
        };
        let (value, dirty) = f(&mut record, self.now())?;
        if dirty && !self.save(character_id, &mut record).await {
            return Err(ProgressionError::Unavailable(format!(
                "progress for {character_id} not saved"
            )));
        }
        Ok(value)
    }

    /// [`Self::modify_locked`] under a freshly taken lock
    pub async fn modify<T, F>(&self, character_id: &str, f: F) -> ProgressionResult<T>
    where
        F: FnOnce(&mut ProgressRecord, DateTime<Utc>) -> ProgressionResult<(T, bool)>,
    {
        let guard = self.lock(character_id).await;
        self.modify_locked(&guard, f).await
    }

    // =====================================================
    // Instance lifecycle
    // =====================================================

    /// Upsert an in-progress instance with empty task values and a snapshot
    /// of `objectives`
    pub async fn initialize_instance(
        &self,
        character_id: &str,
        category: QuestCategory,
        instance_id: &str,
        template_id: &str,
        objectives: &[Objective],
    ) -> bool {
        self.modify(character_id, |record, now| {
            record.upsert(QuestInstance::new(instance_id, template_id, category, objectives, now));
            Ok(((), true))
        })
        .await
        .is_ok()
    }

    /// Set a task value on the first instance (any category) that owns the
    /// task. False if no instance has it.
    pub async fn update_task(&self, character_id: &str, task_id: &str, value: TaskValue) -> bool {
        self.update_task_in(character_id, None, task_id, value).await
    }

    /// [`Self::update_task`] restricted to one partition when `only` is set
    pub async fn update_task_in(
        &self,
        character_id: &str,
        only: Option<Partition>,
        task_id: &str,
        value: TaskValue,
    ) -> bool {
        let result = self
            .modify(character_id, |record, now| {
                let Some(instance) = record.find_task_owner_mut(task_id, only) else {
                    return Ok((false, false));
                };
                let was_completed = instance.is_completed();
                instance.set_task(task_id, value, now);
                if !was_completed && instance.is_completed() {
                    info!(character = character_id, instance = %instance.id, "instance completed via task update");
                }
                Ok((true, true))
            })
            .await;
        result.unwrap_or(false)
    }

    /// Raise a task to its required count
    pub async fn complete_task(&self, character_id: &str, task_id: &str) -> bool {
        self.modify(character_id, |record, now| {
            let Some(instance) = record.find_task_owner_mut(task_id, None) else {
                return Ok((false, false));
            };
            Ok((instance.complete_task(task_id, now), true))
        })
        .await
        .unwrap_or(false)
    }

    /// False if the instance is absent or its objectives are unmet
    pub async fn mark_completed(&self, character_id: &str, instance_id: &str) -> bool {
        self.modify(character_id, |record, now| match record.find_mut(instance_id) {
            Some(instance) => {
                let ok = instance.mark_completed(now).is_ok();
                Ok((ok, ok))
            }
            None => Ok((false, false)),
        })
        .await
        .unwrap_or(false)
    }

    /// False if the instance is absent, not completed or already claimed
    pub async fn mark_reward_claimed(&self, character_id: &str, instance_id: &str) -> bool {
        self.modify(character_id, |record, now| {
            let ok = record
                .find_mut(instance_id)
                .is_some_and(|instance| instance.mark_claimed(now).is_ok());
            if ok {
                record.remember_claim(instance_id);
            }
            Ok((ok, ok))
        })
        .await
        .unwrap_or(false)
    }

    pub async fn has_claimed_reward(&self, character_id: &str, instance_id: &str) -> bool {
        self.load(character_id).await.is_claimed(instance_id)
    }

    /// Apply an event to every in-progress instance of `category`
    pub async fn apply_event(&self, character_id: &str, category: QuestCategory, event: &ProgressEvent) -> Vec<String> {
        self.modify(character_id, |record, now| {
            let changed = record.apply_event(category, event, now, |_| true);
            let dirty = !changed.is_empty();
            Ok((changed, dirty))
        })
        .await
        .unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "event progress not persisted");
            Vec::new()
        })
    }

    // =====================================================
    // Calendar resets
    // =====================================================

    pub fn daily_reset_due(&self, record: &ProgressRecord, now: DateTime<Utc>) -> bool {
        record.last_daily_reset.as_deref() != Some(self.calendar.day_bucket(now).as_str())
    }

    pub fn weekly_reset_due(&self, record: &ProgressRecord, now: DateTime<Utc>) -> bool {
        record.last_weekly_reset.as_deref() != Some(self.calendar.week_bucket(now).as_str())
    }

    /// True when no record exists or its day bucket is stale
    pub async fn should_reset_daily(&self, character_id: &str) -> bool {
        match self.try_load(character_id).await {
            Ok(Some(record)) => self.daily_reset_due(&record, self.now()),
            _ => true,
        }
    }

    /// True when no record exists or its week bucket is stale
    pub async fn should_reset_weekly(&self, character_id: &str) -> bool {
        match self.try_load(character_id).await {
            Ok(Some(record)) => self.weekly_reset_due(&record, self.now()),
            _ => true,
        }
    }

    /// Clear the daily partition and stamp today's bucket. Claim markers of
    /// earlier days are dropped. Returns the bucket.
    pub fn reset_daily_in(&self, record: &mut ProgressRecord, now: DateTime<Utc>) -> String {
        let bucket = self.calendar.day_bucket(now);
        record.daily_quests.clear();
        record.prune_claims(QuestCategory::Daily, |id| id.ends_with(bucket.as_str()));
        record.last_daily_reset = Some(bucket.clone());
        bucket
    }

    /// Clear the weekly partition and stamp this week's bucket. Returns the
    /// bucket.
    pub fn reset_weekly_in(&self, record: &mut ProgressRecord, now: DateTime<Utc>) -> String {
        let bucket = self.calendar.week_bucket(now);
        record.weekly_quests.clear();
        record.prune_claims(QuestCategory::Weekly, |id| id.ends_with(bucket.as_str()));
        record.last_weekly_reset = Some(bucket.clone());
        bucket
    }

    /// Does not regenerate instances
    pub async fn reset_daily(&self, character_id: &str) -> bool {
        self.modify(character_id, |record, now| {
            let bucket = self.reset_daily_in(record, now);
            info!(character = character_id, bucket = %bucket, "daily progress reset");
            Ok(((), true))
        })
        .await
        .is_ok()
    }

    /// Does not regenerate instances
    pub async fn reset_weekly(&self, character_id: &str) -> bool {
        self.modify(character_id, |record, now| {
            let bucket = self.reset_weekly_in(record, now);
            info!(character = character_id, bucket = %bucket, "weekly progress reset");
            Ok(((), true))
        })
        .await
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::{KvError, KvResult, MemoryKvStore};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use progression_core::ObjectiveKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> (EventProgressManager, Arc<MemoryKvStore>, Arc<FixedClock>) {
        let store = Arc::new(MemoryKvStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let mgr = EventProgressManager::new(store.clone(), clock.clone(), Calendar::utc(), 86_400);
        (mgr, store, clock)
    }

    fn chat_task(required: u64) -> Vec<Objective> {
        vec![Objective::new("chat-5-times", "Chat", ObjectiveKind::Chat, required)]
    }

    #[tokio::test]
    async fn test_load_absent_is_fresh_record() {
        let (mgr, _, _) = manager();
        assert_eq!(mgr.try_load("nobody").await, Ok(None));
        assert_eq!(mgr.load("nobody").await, ProgressRecord::new());
    }

    #[tokio::test]
    async fn test_save_bumps_revision() {
        let (mgr, _, _) = manager();
        let mut record = ProgressRecord::new();
        assert!(mgr.save("c1", &mut record).await);
        assert!(mgr.save("c1", &mut record).await);
        assert_eq!(mgr.load("c1").await.revision, 2);
    }

    #[tokio::test]
    async fn test_save_fails_softly_when_disabled() {
        let (mgr, store, _) = manager();
        store.set_enabled(false);
        let mut record = ProgressRecord::new();
        assert!(!mgr.save("c1", &mut record).await);
        assert_eq!(record.revision, 0);
        assert!(matches!(mgr.try_load("c1").await, Err(ProgressionError::Unavailable(_))));
        assert_eq!(mgr.load("c1").await, ProgressRecord::new());
    }

    #[tokio::test]
    async fn test_malformed_record_loads_fresh() {
        let (mgr, store, _) = manager();
        store
            .set(&progress_key("c1"), "{not json", SetOptions::persistent())
            .await
            .unwrap();
        assert!(matches!(mgr.try_load("c1").await, Err(ProgressionError::Malformed(_))));
        assert_eq!(mgr.load("c1").await, ProgressRecord::new());
    }

    #[tokio::test]
    async fn test_update_task_completes_instance() {
        let (mgr, _, _) = manager();
        assert!(
            mgr.initialize_instance("c1", QuestCategory::Daily, "daily-social-2026-10-19", "daily-social", &chat_task(5))
                .await
        );

        assert!(mgr.update_task("c1", "chat-5-times", TaskValue::Count(3)).await);
        assert!(!mgr.update_task("c1", "missing-task", TaskValue::Count(3)).await);
        let record = mgr.load("c1").await;
        let instance = &record.daily_quests["daily-social-2026-10-19"];
        assert_eq!(instance.progress, 0);
        assert!(!instance.is_completed());

        assert!(mgr.complete_task("c1", "chat-5-times").await);
        let record = mgr.load("c1").await;
        let instance = &record.daily_quests["daily-social-2026-10-19"];
        assert_eq!(instance.completed_tasks, vec!["chat-5-times"]);
        assert!(instance.is_completed());
    }

    #[tokio::test]
    async fn test_claim_markers() {
        let (mgr, _, _) = manager();
        mgr.initialize_instance("c1", QuestCategory::Special, "halloween-2026", "halloween-2026", &chat_task(1))
            .await;

        assert!(!mgr.mark_reward_claimed("c1", "halloween-2026").await);
        assert!(!mgr.mark_completed("c1", "halloween-2026").await);
        mgr.complete_task("c1", "chat-5-times").await;
        assert!(mgr.mark_completed("c1", "halloween-2026").await);
        assert!(mgr.mark_reward_claimed("c1", "halloween-2026").await);
        assert!(mgr.has_claimed_reward("c1", "halloween-2026").await);
        assert!(!mgr.mark_reward_claimed("c1", "halloween-2026").await);
        assert!(!mgr.has_claimed_reward("c1", "unknown").await);
    }

    #[tokio::test]
    async fn test_reset_due_tracks_buckets() {
        let (mgr, _, clock) = manager();
        assert!(mgr.should_reset_daily("c1").await);
        assert!(mgr.should_reset_weekly("c1").await);

        assert!(mgr.reset_daily("c1").await);
        assert!(mgr.reset_weekly("c1").await);
        assert!(!mgr.should_reset_daily("c1").await);
        assert!(!mgr.should_reset_weekly("c1").await);
        assert_eq!(mgr.load("c1").await.last_weekly_reset.as_deref(), Some("2026-W43"));

        clock.advance(chrono::Duration::days(1));
        assert!(mgr.should_reset_daily("c1").await);
        assert!(!mgr.should_reset_weekly("c1").await);
    }

    #[tokio::test]
    async fn test_apply_event_only_touches_category() {
        let (mgr, _, _) = manager();
        mgr.initialize_instance("c1", QuestCategory::Daily, "d", "d", &chat_task(5)).await;
        mgr.initialize_instance("c1", QuestCategory::Weekly, "w", "w", &[Objective::new("w-chat", "", ObjectiveKind::Chat, 30)])
            .await;

        let changed = mgr.apply_event("c1", QuestCategory::Daily, &ProgressEvent::chat(None)).await;
        assert_eq!(changed, vec!["d"]);
        let record = mgr.load("c1").await;
        assert_eq!(record.daily_quests["d"].current_count("chat-5-times"), 1);
        assert_eq!(record.weekly_quests["w"].current_count("w-chat"), 0);
    }

    // =====================================================
    // Two-part persistence
    // =====================================================

    /// Memory store that remembers write options and fails reads on demand
    struct ScriptedStore {
        inner: MemoryKvStore,
        failing_gets: AtomicUsize,
        writes: parking_lot::Mutex<Vec<(String, SetOptions)>>,
    }

    impl ScriptedStore {
        fn new() -> Self {
            Self {
                inner: MemoryKvStore::new(),
                failing_gets: AtomicUsize::new(0),
                writes: parking_lot::Mutex::new(Vec::new()),
            }
        }

        fn writes_to(&self, key: &str) -> Vec<SetOptions> {
            self.writes
                .lock()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, options)| *options)
                .collect()
        }
    }

    #[async_trait]
    impl KvStore for ScriptedStore {
        async fn get(&self, key: &str) -> KvResult<Option<String>> {
            let failing = self
                .failing_gets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(KvError::Io(std::io::Error::other("connection reset")));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, options: SetOptions) -> KvResult<()> {
            self.writes.lock().push((key.to_string(), options));
            self.inner.set(key, value, options).await
        }

        async fn del(&self, key: &str) -> KvResult<bool> {
            self.inner.del(key).await
        }

        fn is_enabled(&self) -> bool {
            self.inner.is_enabled()
        }
    }

    fn scripted_manager() -> (EventProgressManager, Arc<ScriptedStore>) {
        let store = Arc::new(ScriptedStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()));
        let mgr = EventProgressManager::new(store.clone(), clock, Calendar::utc(), 86_400);
        (mgr, store)
    }

    #[tokio::test]
    async fn test_quests_saved_without_expiry() {
        let (mgr, store) = scripted_manager();
        assert!(mgr.initialize_instance("c1", QuestCategory::Main, "welcome", "welcome", &chat_task(1)).await);
        assert!(
            mgr.initialize_instance("c1", QuestCategory::Daily, "daily-social-2026-10-19", "daily-social", &chat_task(5))
                .await
        );

        let durable = store.writes_to(&quest_progress_key("c1"));
        assert_eq!(durable, vec![SetOptions::persistent(); 2]);
        let events = store.writes_to(&progress_key("c1"));
        assert_eq!(events, vec![SetOptions::ex(86_400); 2]);

        let quests = store.inner.get(&quest_progress_key("c1")).await.unwrap().unwrap();
        assert!(quests.contains("\"welcome\""));
        assert!(!quests.contains("daily-social"));
        let partitions = store.inner.get(&progress_key("c1")).await.unwrap().unwrap();
        assert!(!partitions.contains("\"welcome\""));
    }

    #[tokio::test]
    async fn test_quests_survive_event_part_expiry() {
        let (mgr, store) = scripted_manager();
        mgr.initialize_instance("c1", QuestCategory::Main, "welcome", "welcome", &chat_task(1))
            .await;
        store.inner.del(&progress_key("c1")).await.unwrap();

        let record = mgr.try_load("c1").await.unwrap().unwrap();
        assert!(record.quests.contains_key("welcome"));
        assert!(record.daily_quests.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_record_keeps_its_quests() {
        let (mgr, store) = scripted_manager();
        let mut legacy = ProgressRecord::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        legacy.upsert(QuestInstance::new("welcome", "welcome", QuestCategory::Main, &chat_task(1), now));
        let json = serde_json::to_string(&legacy).unwrap();
        store.inner.set(&progress_key("c1"), &json, SetOptions::ex(60)).await.unwrap();

        assert!(mgr.load("c1").await.quests.contains_key("welcome"));
        mgr.initialize_instance("c1", QuestCategory::Side, "gym_training", "gym_training", &chat_task(1))
            .await;
        let record = mgr.load("c1").await;
        assert!(record.quests.contains_key("welcome"));
        assert!(record.quests.contains_key("gym_training"));
    }

    #[tokio::test]
    async fn test_read_error_rejects_change() {
        let (mgr, store) = scripted_manager();
        mgr.initialize_instance("c1", QuestCategory::Main, "welcome", "welcome", &chat_task(1))
            .await;
        let before = store.writes.lock().len();

        store.failing_gets.store(1, Ordering::SeqCst);
        let result = mgr
            .modify("c1", |record, now| {
                record.upsert(QuestInstance::new("gym_training", "gym_training", QuestCategory::Side, &chat_task(1), now));
                Ok(((), true))
            })
            .await;
        assert!(matches!(result, Err(ProgressionError::Unavailable(_))));
        assert_eq!(store.writes.lock().len(), before);

        let record = mgr.load("c1").await;
        assert!(record.quests.contains_key("welcome"));
        assert!(!record.quests.contains_key("gym_training"));
    }

    #[tokio::test]
    async fn test_malformed_part_replaced_on_write() {
        let (mgr, store) = scripted_manager();
        mgr.initialize_instance("c1", QuestCategory::Main, "welcome", "welcome", &chat_task(1))
            .await;
        store
            .inner
            .set(&progress_key("c1"), "{not json", SetOptions::ex(60))
            .await
            .unwrap();
        assert!(matches!(mgr.try_load("c1").await, Err(ProgressionError::Malformed(_))));

        assert!(
            mgr.initialize_instance("c1", QuestCategory::Daily, "daily-social-2026-10-19", "daily-social", &chat_task(5))
                .await
        );
        let record = mgr.try_load("c1").await.unwrap().unwrap();
        assert!(record.quests.contains_key("welcome"));
        assert!(record.daily_quests.contains_key("daily-social-2026-10-19"));
    }

    #[tokio::test]
    async fn test_refused_completion_writes_nothing() {
        let (mgr, store) = scripted_manager();
        mgr.initialize_instance("c1", QuestCategory::Special, "halloween-2026", "halloween-2026", &chat_task(5))
            .await;
        let before = store.writes.lock().len();

        assert!(!mgr.mark_completed("c1", "halloween-2026").await);
        assert!(!mgr.mark_reward_claimed("c1", "halloween-2026").await);
        assert_eq!(store.writes.lock().len(), before);
    }

    #[tokio::test]
    async fn test_reset_keeps_todays_claim_marker() {
        let (mgr, _, clock) = manager();
        let today = "daily-social-2026-10-19";
        mgr.initialize_instance("c1", QuestCategory::Daily, today, "daily-social", &chat_task(1))
            .await;
        mgr.complete_task("c1", "chat-5-times").await;
        mgr.mark_completed("c1", today).await;
        assert!(mgr.mark_reward_claimed("c1", today).await);

        assert!(mgr.reset_daily("c1").await);
        let record = mgr.load("c1").await;
        assert!(record.daily_quests.is_empty());
        assert!(record.is_claimed(today));

        clock.advance(Duration::days(1));
        assert!(mgr.reset_daily("c1").await);
        assert!(!mgr.load("c1").await.is_claimed(today));
    }
}
