//! Quest templates and the instance state machine shared by every category
//!
//! ```text
//! (absent) ──assign/initialize──▶ progress ──all objectives met──▶ completed ──claim──▶ completed + rewardClaimed
//!                                    │
//!                                    └──window ended──▶ expired
//! ```
//!
//! Status is derived: an instance is `completed` exactly when every task in
//! its snapshot has reached its required count. Task values never decrease
//! until the owning category is reset.

use crate::error::{Precondition, ProgressionError, ProgressionResult};
use crate::objective::{DeltaRule, Objective, ProgressEvent, TaskValue};
use crate::reward::RewardDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestCategory {
    Main,
    Side,
    Daily,
    Weekly,
    Seasonal,
    Special,
}

impl QuestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestCategory::Main => "main",
            QuestCategory::Side => "side",
            QuestCategory::Daily => "daily",
            QuestCategory::Weekly => "weekly",
            QuestCategory::Seasonal => "seasonal",
            QuestCategory::Special => "special",
        }
    }

    /// Main and side quests are assigned explicitly and never reset
    pub fn is_core(&self) -> bool {
        matches!(self, QuestCategory::Main | QuestCategory::Side)
    }

    /// Increment rule for events applied to this category
    pub fn delta_rule(&self) -> DeltaRule {
        if self.is_core() {
            DeltaRule::Natural
        } else {
            DeltaRule::Amount
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    Available,
    #[serde(rename = "progress")]
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Available => "available",
            QuestStatus::InProgress => "progress",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
            QuestStatus::Expired => "expired",
        }
    }
}

/// Immutable quest definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: QuestCategory,
    pub objectives: Vec<Objective>,
    pub reward: RewardDescriptor,
    /// Template ids that must be completed first (main quests only)
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Ordering hint within the category
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

impl QuestTemplate {
    pub fn new(id: &str, title: &str, description: &str, category: QuestCategory) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category,
            objectives: Vec::new(),
            reward: RewardDescriptor::default(),
            prerequisites: Vec::new(),
            order: 0,
            cooldown_secs: None,
        }
    }

    pub fn objective(mut self, objective: Objective) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn reward(mut self, reward: RewardDescriptor) -> Self {
        self.reward = reward;
        self
    }

    pub fn requires(mut self, template_id: &str) -> Self {
        self.prerequisites.push(template_id.to_string());
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }
}

/// `{ completed, total, percentage }` summary of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub completed: u32,
    pub total: u32,
    pub percentage: u32,
}

/// Read-only view of one objective with its current count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveProgress {
    #[serde(flatten)]
    pub objective: Objective,
    pub current_count: u64,
    pub done: bool,
}

/// Per-character state of one quest or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestInstance {
    pub id: String,
    pub template_id: String,
    pub category: QuestCategory,
    pub status: QuestStatus,
    /// Objective snapshot taken at creation; later matching relies on this only
    pub task_details: Vec<Objective>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskValue>,
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub max_progress: u32,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reward_claimed: bool,
    #[serde(default)]
    pub reward_claimed_at: Option<DateTime<Utc>>,
    /// Reward component keys already granted for this instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granted_components: Vec<String>,
}

impl QuestInstance {
    pub fn new(
        id: impl Into<String>,
        template_id: impl Into<String>,
        category: QuestCategory,
        objectives: &[Objective],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            category,
            status: QuestStatus::InProgress,
            task_details: objectives.to_vec(),
            tasks: BTreeMap::new(),
            completed_tasks: Vec::new(),
            progress: 0,
            max_progress: objectives.len() as u32,
            assigned_at: now,
            completed_at: None,
            reward_claimed: false,
            reward_claimed_at: None,
            granted_components: Vec::new(),
        }
    }

    pub fn from_template(template: &QuestTemplate, now: DateTime<Utc>) -> Self {
        Self::new(
            template.id.clone(),
            template.id.clone(),
            template.category,
            &template.objectives,
            now,
        )
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status == QuestStatus::Completed
    }

    pub fn task(&self, task_id: &str) -> Option<&Objective> {
        self.task_details.iter().find(|t| t.id == task_id)
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.task(task_id).is_some()
    }

    pub fn task_value(&self, task_id: &str) -> TaskValue {
        self.tasks.get(task_id).cloned().unwrap_or_default()
    }

    pub fn current_count(&self, task_id: &str) -> u64 {
        self.tasks.get(task_id).map(TaskValue::measure).unwrap_or(0)
    }

    pub fn all_objectives_met(&self) -> bool {
        self.task_details
            .iter()
            .all(|t| t.is_met(&self.task_value(&t.id)))
    }

    /// Advance every unmet objective that `event` matches. Only in-progress
    /// instances move. Returns whether any task value changed.
    pub fn apply_event(&mut self, event: &ProgressEvent, rule: DeltaRule, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }

        let mut changed = false;
        for objective in &self.task_details {
            let current = self.tasks.get(&objective.id).cloned().unwrap_or_default();
            if objective.is_met(&current) {
                continue;
            }
            if let Some(next) = objective.advance(&current, event, rule) {
                if objective.is_met(&next) {
                    tracing::debug!(instance = %self.id, task = %objective.id, "objective met");
                }
                self.tasks.insert(objective.id.clone(), next);
                changed = true;
            }
        }

        if changed {
            self.recompute(now);
        }
        changed
    }

    /// Set a task value directly. Values only move forward: counters keep the
    /// larger of old and new, lists are merged. Returns false if the task is
    /// not part of this instance.
    pub fn set_task(&mut self, task_id: &str, value: TaskValue, now: DateTime<Utc>) -> bool {
        if !self.has_task(task_id) {
            return false;
        }
        let merged = self.task_value(task_id).merged(&value);
        self.tasks.insert(task_id.to_string(), merged);
        self.recompute(now);
        true
    }

    /// Raise a task straight to its required count
    pub fn complete_task(&mut self, task_id: &str, now: DateTime<Utc>) -> bool {
        match self.task(task_id).map(|t| t.required_count) {
            Some(required) => self.set_task(task_id, TaskValue::Count(required), now),
            None => false,
        }
    }

    /// Re-derive `completed_tasks`, `progress` and completion from the task
    /// values
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        self.completed_tasks = self
            .task_details
            .iter()
            .filter(|t| t.is_met(&self.task_value(&t.id)))
            .map(|t| t.id.clone())
            .collect();
        self.progress = self.completed_tasks.len() as u32;
        self.max_progress = self.task_details.len() as u32;

        let promotable = matches!(self.status, QuestStatus::InProgress | QuestStatus::Available);
        if promotable && self.progress >= self.max_progress {
            self.status = QuestStatus::Completed;
            self.completed_at.get_or_insert(now);
            tracing::info!(instance = %self.id, category = self.category.as_str(), "quest completed");
        }
    }

    /// Idempotent; refuses while any objective is unmet
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> ProgressionResult<()> {
        if !self.all_objectives_met() {
            return Err(ProgressionError::PreconditionFailed(Precondition::ObjectivesIncomplete));
        }
        self.status = QuestStatus::Completed;
        self.completed_at.get_or_insert(now);
        Ok(())
    }

    pub fn mark_claimed(&mut self, now: DateTime<Utc>) -> ProgressionResult<()> {
        if !self.is_completed() {
            return Err(ProgressionError::PreconditionFailed(Precondition::NotCompleted));
        }
        if self.reward_claimed {
            return Err(ProgressionError::AlreadyClaimed(self.id.clone()));
        }
        self.reward_claimed = true;
        self.reward_claimed_at = Some(now);
        Ok(())
    }

    /// Remember reward components that landed so a retry skips them
    pub fn record_granted<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            if !self.granted_components.iter().any(|k| k == key) {
                self.granted_components.push(key.to_string());
            }
        }
    }

    /// Mark a not-yet-completed instance as expired
    pub fn expire(&mut self) -> bool {
        if self.is_completed() || self.status == QuestStatus::Expired {
            return false;
        }
        self.status = QuestStatus::Expired;
        true
    }

    pub fn summary(&self) -> ProgressSummary {
        let total = self.task_details.len() as u32;
        let completed = self
            .task_details
            .iter()
            .filter(|t| t.is_met(&self.task_value(&t.id)))
            .count() as u32;
        let percentage = if total == 0 {
            0
        } else {
            ((f64::from(completed) / f64::from(total)) * 100.0).round() as u32
        };
        ProgressSummary {
            completed,
            total,
            percentage,
        }
    }

    pub fn objectives(&self) -> Vec<ObjectiveProgress> {
        self.task_details
            .iter()
            .map(|t| {
                let value = self.task_value(&t.id);
                ObjectiveProgress {
                    objective: t.clone(),
                    current_count: value.measure(),
                    done: t.is_met(&value),
                }
            })
            .collect()
    }
}
