//! Per-character progress record
//!
//! One record per character holds every instance, partitioned by category,
//! plus the calendar buckets of the last daily and weekly reset. Persisted as
//! camelCase JSON in two parts: main/side quests and claim markers under
//! `quest:progress:{characterId}` without expiry, everything else under
//! `event:progress:{characterId}` with the progress TTL.

use crate::objective::ProgressEvent;
use crate::quest::{QuestCategory, QuestInstance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Storage partition of a [`ProgressRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Quests,
    SeasonEvents,
    SpecialEvents,
    DailyQuests,
    WeeklyQuests,
}

impl Partition {
    /// Lookup order used when a task or instance id is searched across the
    /// whole record
    pub const SEARCH_ORDER: [Partition; 5] = [
        Partition::SeasonEvents,
        Partition::SpecialEvents,
        Partition::DailyQuests,
        Partition::WeeklyQuests,
        Partition::Quests,
    ];

    pub fn of(category: QuestCategory) -> Self {
        match category {
            QuestCategory::Main | QuestCategory::Side => Partition::Quests,
            QuestCategory::Daily => Partition::DailyQuests,
            QuestCategory::Weekly => Partition::WeeklyQuests,
            QuestCategory::Seasonal => Partition::SeasonEvents,
            QuestCategory::Special => Partition::SpecialEvents,
        }
    }
}

pub type InstanceMap = BTreeMap<String, QuestInstance>;

/// Claim state of a recurring or event instance, kept after the instance
/// itself has expired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMarker {
    pub category: QuestCategory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granted_components: Vec<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default)]
    pub quests: InstanceMap,
    #[serde(default)]
    pub season_events: InstanceMap,
    #[serde(default)]
    pub special_events: InstanceMap,
    #[serde(default)]
    pub daily_quests: InstanceMap,
    #[serde(default)]
    pub weekly_quests: InstanceMap,
    /// Day bucket (`YYYY-MM-DD`) of the last daily reset
    #[serde(default)]
    pub last_daily_reset: Option<String>,
    /// Week bucket (`YYYY-Www`) of the last weekly reset
    #[serde(default)]
    pub last_weekly_reset: Option<String>,
    /// Claim markers of non-core instances, keyed by instance id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, ClaimMarker>,
    /// Bumped on every successful save
    #[serde(default)]
    pub revision: u64,
}

impl ProgressRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(&self, partition: Partition) -> &InstanceMap {
        match partition {
            Partition::Quests => &self.quests,
            Partition::SeasonEvents => &self.season_events,
            Partition::SpecialEvents => &self.special_events,
            Partition::DailyQuests => &self.daily_quests,
            Partition::WeeklyQuests => &self.weekly_quests,
        }
    }

    pub fn partition_mut(&mut self, partition: Partition) -> &mut InstanceMap {
        match partition {
            Partition::Quests => &mut self.quests,
            Partition::SeasonEvents => &mut self.season_events,
            Partition::SpecialEvents => &mut self.special_events,
            Partition::DailyQuests => &mut self.daily_quests,
            Partition::WeeklyQuests => &mut self.weekly_quests,
        }
    }

    pub fn instances(&self, category: QuestCategory) -> &InstanceMap {
        self.partition(Partition::of(category))
    }

    pub fn instances_mut(&mut self, category: QuestCategory) -> &mut InstanceMap {
        self.partition_mut(Partition::of(category))
    }

    /// Insert or replace an instance in its category's partition
    pub fn upsert(&mut self, instance: QuestInstance) {
        self.instances_mut(instance.category)
            .insert(instance.id.clone(), instance);
    }

    /// Partition holding the instance id, searched in [`Partition::SEARCH_ORDER`]
    pub fn locate(&self, instance_id: &str) -> Option<Partition> {
        Partition::SEARCH_ORDER
            .into_iter()
            .find(|p| self.partition(*p).contains_key(instance_id))
    }

    pub fn find(&self, instance_id: &str) -> Option<&QuestInstance> {
        self.locate(instance_id)
            .and_then(|p| self.partition(p).get(instance_id))
    }

    pub fn find_mut(&mut self, instance_id: &str) -> Option<&mut QuestInstance> {
        let partition = self.locate(instance_id)?;
        self.partition_mut(partition).get_mut(instance_id)
    }

    /// First instance whose snapshot contains `task_id`, optionally restricted
    /// to one partition
    pub fn find_task_owner_mut(
        &mut self,
        task_id: &str,
        only: Option<Partition>,
    ) -> Option<&mut QuestInstance> {
        let partition = match only {
            Some(p) => p,
            None => Partition::SEARCH_ORDER
                .into_iter()
                .find(|p| self.partition(*p).values().any(|i| i.has_task(task_id)))?,
        };
        self.partition_mut(partition)
            .values_mut()
            .find(|i| i.has_task(task_id))
    }

    pub fn all_instances(&self) -> impl Iterator<Item = &QuestInstance> {
        Partition::SEARCH_ORDER
            .into_iter()
            .flat_map(move |p| self.partition(p).values())
    }

    /// Template ids of completed main/side quests
    pub fn completed_quest_ids(&self) -> BTreeSet<String> {
        self.quests
            .values()
            .filter(|q| q.is_completed())
            .map(|q| q.template_id.clone())
            .collect()
    }

    /// Claimed according to the instance or to a surviving claim marker
    pub fn is_claimed(&self, instance_id: &str) -> bool {
        self.find(instance_id).is_some_and(|i| i.reward_claimed)
            || self.claims.get(instance_id).is_some_and(|m| m.claimed_at.is_some())
    }

    /// Component keys already granted for the instance, from the instance
    /// and its claim marker
    pub fn granted_components(&self, instance_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .find(instance_id)
            .map(|i| i.granted_components.clone())
            .unwrap_or_default();
        if let Some(marker) = self.claims.get(instance_id) {
            for key in &marker.granted_components {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Copy the instance's grant and claim state into its claim marker.
    /// Main/side quests carry their own durable state and get no marker.
    pub fn remember_claim(&mut self, instance_id: &str) {
        let Some(instance) = self.find(instance_id) else {
            return;
        };
        if instance.category.is_core() {
            return;
        }
        let category = instance.category;
        let granted = instance.granted_components.clone();
        let claimed_at = instance.reward_claimed_at;
        let marker = self.claims.entry(instance_id.to_string()).or_insert(ClaimMarker {
            category,
            granted_components: Vec::new(),
            claimed_at: None,
        });
        for key in granted {
            if !marker.granted_components.contains(&key) {
                marker.granted_components.push(key);
            }
        }
        if claimed_at.is_some() {
            marker.claimed_at = claimed_at;
        }
    }

    /// Drop claim markers of `category` that `keep` rejects
    pub fn prune_claims<F>(&mut self, category: QuestCategory, mut keep: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.claims.len();
        self.claims
            .retain(|id, marker| marker.category != category || keep(id));
        self.claims.len() != before
    }

    /// Apply an event to every instance in `category` that `eligible` admits.
    /// Returns the ids of instances that changed.
    pub fn apply_event<F>(
        &mut self,
        category: QuestCategory,
        event: &ProgressEvent,
        now: DateTime<Utc>,
        mut eligible: F,
    ) -> Vec<String>
    where
        F: FnMut(&QuestInstance) -> bool,
    {
        let partition = Partition::of(category);
        let rule = category.delta_rule();
        let mut changed = Vec::new();
        for instance in self.partition_mut(partition).values_mut() {
            if instance.category != category || !eligible(instance) {
                continue;
            }
            if instance.apply_event(event, rule, now) {
                changed.push(instance.id.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::{Objective, ObjectiveKind, TaskValue};

    fn instance(id: &str, category: QuestCategory, task: &str, kind: ObjectiveKind, required: u64) -> QuestInstance {
        QuestInstance::new(id, id, category, &[Objective::new(task, "", kind, required)], Utc::now())
    }

    #[test]
    fn test_record_json_layout() {
        let mut record = ProgressRecord::new();
        record.last_daily_reset = Some("2026-10-19".into());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("seasonEvents").is_some());
        assert!(json.get("dailyQuests").is_some());
        assert_eq!(json["lastDailyReset"], "2026-10-19");

        // Missing partitions default to empty
        let parsed: ProgressRecord = serde_json::from_str(r#"{"dailyQuests":{}}"#).unwrap();
        assert!(parsed.quests.is_empty());
        assert_eq!(parsed.revision, 0);
    }

    #[test]
    fn test_upsert_routes_by_category() {
        let mut record = ProgressRecord::new();
        record.upsert(instance("welcome", QuestCategory::Main, "greet_ai", ObjectiveKind::Interact, 1));
        record.upsert(instance("gym_training", QuestCategory::Side, "visit_gym", ObjectiveKind::VisitBuilding, 1));
        record.upsert(instance("daily-social-2026-10-19", QuestCategory::Daily, "chat-5-times", ObjectiveKind::Chat, 5));

        assert_eq!(record.quests.len(), 2);
        assert_eq!(record.locate("daily-social-2026-10-19"), Some(Partition::DailyQuests));
        assert!(record.find("missing").is_none());
    }

    #[test]
    fn test_find_task_owner_across_partitions() {
        let mut record = ProgressRecord::new();
        record.upsert(instance("weekly-chat-master-2026-W43", QuestCategory::Weekly, "chat-30-times", ObjectiveKind::Chat, 30));
        let now = Utc::now();

        let owner = record.find_task_owner_mut("chat-30-times", None).unwrap();
        owner.set_task("chat-30-times", TaskValue::Count(4), now);
        assert_eq!(record.weekly_quests["weekly-chat-master-2026-W43"].current_count("chat-30-times"), 4);

        assert!(record.find_task_owner_mut("chat-30-times", Some(Partition::DailyQuests)).is_none());
        assert!(record.find_task_owner_mut("nope", None).is_none());
    }

    #[test]
    fn test_apply_event_respects_filter() {
        let mut record = ProgressRecord::new();
        record.upsert(instance("a", QuestCategory::Special, "chat", ObjectiveKind::Chat, 5));
        record.upsert(instance("b", QuestCategory::Special, "chat2", ObjectiveKind::Chat, 5));
        let now = Utc::now();

        let changed = record.apply_event(QuestCategory::Special, &ProgressEvent::chat(None), now, |i| i.id == "a");
        assert_eq!(changed, vec!["a"]);
        assert_eq!(record.special_events["b"].current_count("chat2"), 0);
    }

    #[test]
    fn test_claim_marker_outlives_instance() {
        let now = Utc::now();
        let mut record = ProgressRecord::new();
        let mut weekly = instance("weekly-chat-master-2026-W43", QuestCategory::Weekly, "chat-30-times", ObjectiveKind::Chat, 30);
        weekly.complete_task("chat-30-times", now);
        weekly.record_granted(["experience", "coins"]);
        weekly.mark_claimed(now).unwrap();
        record.upsert(weekly);
        record.remember_claim("weekly-chat-master-2026-W43");

        record.weekly_quests.clear();
        assert!(record.is_claimed("weekly-chat-master-2026-W43"));
        assert_eq!(record.granted_components("weekly-chat-master-2026-W43"), vec!["experience", "coins"]);

        record.prune_claims(QuestCategory::Weekly, |id| id.ends_with("2026-W44"));
        assert!(!record.is_claimed("weekly-chat-master-2026-W43"));
    }

    #[test]
    fn test_core_quests_get_no_marker() {
        let mut record = ProgressRecord::new();
        let mut welcome = instance("welcome", QuestCategory::Main, "greet_ai", ObjectiveKind::Interact, 1);
        welcome.complete_task("greet_ai", Utc::now());
        welcome.mark_claimed(Utc::now()).unwrap();
        record.upsert(welcome);
        record.remember_claim("welcome");
        assert!(record.claims.is_empty());
        assert!(record.is_claimed("welcome"));
    }

    #[test]
    fn test_completed_quest_ids() {
        let mut record = ProgressRecord::new();
        let mut welcome = instance("welcome", QuestCategory::Main, "greet_ai", ObjectiveKind::Interact, 1);
        welcome.complete_task("greet_ai", Utc::now());
        record.upsert(welcome);
        record.upsert(instance("visit_cafe", QuestCategory::Main, "visit_cafe", ObjectiveKind::VisitBuilding, 1));

        let done = record.completed_quest_ids();
        assert!(done.contains("welcome"));
        assert!(!done.contains("visit_cafe"));
    }
}
