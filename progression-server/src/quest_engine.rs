//! Quest assignment and progress engine for main and side quests
//!
//! Instances live in the `quests` partition of the character's progress
//! record. Assignment is explicit, availability follows the prerequisite
//! graph, and progress uses each event's natural delta.

use progression_core::constants::WELCOME_QUEST_ID;
use progression_core::{
    ProgressEvent, ProgressSummary, ProgressionError, ProgressionResult, QuestCatalog, QuestCategory, QuestInstance,
    QuestTemplate, RewardDescriptor,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::locks::CharacterGuard;
use crate::progress_store::EventProgressManager;
use crate::rewards::{ClaimOutcome, RewardGrantEngine};

const CORE_CATEGORIES: [QuestCategory; 2] = [QuestCategory::Main, QuestCategory::Side];

/// Instance state merged with its template for client views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestView {
    #[serde(flatten)]
    pub instance: QuestInstance,
    pub title: String,
    pub description: String,
    pub reward: RewardDescriptor,
    pub summary: ProgressSummary,
}

impl QuestView {
    /// A template missing from the catalog falls back to the template id as
    /// title and an empty reward
    pub fn new(instance: QuestInstance, template: Option<&QuestTemplate>) -> Self {
        let (title, description, reward) = match template {
            Some(t) => (t.title.clone(), t.description.clone(), t.reward.clone()),
            None => (instance.template_id.clone(), String::new(), RewardDescriptor::default()),
        };
        Self {
            summary: instance.summary(),
            instance,
            title,
            description,
            reward,
        }
    }
}

pub struct QuestEngine {
    catalog: Arc<QuestCatalog>,
    progress: Arc<EventProgressManager>,
    rewards: Arc<RewardGrantEngine>,
}

impl QuestEngine {
    pub fn new(catalog: Arc<QuestCatalog>, progress: Arc<EventProgressManager>, rewards: Arc<RewardGrantEngine>) -> Self {
        Self {
            catalog,
            progress,
            rewards,
        }
    }

    pub fn get_template(&self, template_id: &str) -> ProgressionResult<&QuestTemplate> {
        self.catalog
            .get(template_id)
            .ok_or_else(|| ProgressionError::not_found("quest template", template_id))
    }

    /// Main and side templates ordered by (category, order hint)
    pub fn templates(&self) -> Vec<&QuestTemplate> {
        self.catalog.core()
    }

    fn core_template(&self, template_id: &str) -> ProgressionResult<&QuestTemplate> {
        self.catalog
            .get(template_id)
            .filter(|t| t.category.is_core())
            .ok_or_else(|| ProgressionError::not_found("quest template", template_id))
    }

    /// Create an in-progress instance of a main or side quest
    pub async fn assign(&self, character_id: &str, template_id: &str) -> ProgressionResult<QuestInstance> {
        let template = self.core_template(template_id)?;
        self.progress
            .modify(character_id, |record, now| {
                if record.quests.contains_key(template_id) {
                    return Err(ProgressionError::AlreadyExists(template_id.to_string()));
                }
                let instance = QuestInstance::from_template(template, now);
                record.upsert(instance.clone());
                info!(character = character_id, quest = template_id, "quest assigned");
                Ok((instance, true))
            })
            .await
    }

    /// Templates the character could accept now. Never writes.
    pub async fn compute_available(&self, character_id: &str) -> Vec<QuestTemplate> {
        let record = self.progress.load(character_id).await;
        self.catalog.available_for(&record).into_iter().cloned().collect()
    }

    /// Advance every active main/side instance the event matches. Returns the
    /// instances that changed; an empty list is a normal no-op.
    pub async fn apply_progress(&self, character_id: &str, event: &ProgressEvent) -> Vec<QuestInstance> {
        let result = self
            .progress
            .modify(character_id, |record, now| {
                let changed: Vec<String> = CORE_CATEGORIES
                    .into_iter()
                    .flat_map(|category| record.apply_event(category, event, now, |_| true))
                    .collect();
                let instances: Vec<QuestInstance> =
                    changed.iter().filter_map(|id| record.quests.get(id).cloned()).collect();
                let dirty = !instances.is_empty();
                Ok((instances, dirty))
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(character = character_id, error = %e, "quest progress not persisted");
            Vec::new()
        })
    }

    async fn complete_locked(
        &self,
        guard: &CharacterGuard,
        template_id: &str,
    ) -> ProgressionResult<(QuestInstance, RewardDescriptor)> {
        let reward = self.get_template(template_id)?.reward.clone();
        let instance = self
            .progress
            .modify_locked(guard, |record, now| {
                let instance = record
                    .quests
                    .get_mut(template_id)
                    .ok_or_else(|| ProgressionError::not_found("quest", template_id))?;
                let newly = !instance.is_completed();
                instance.mark_completed(now)?;
                Ok((instance.clone(), newly))
            })
            .await?;
        Ok((instance, reward))
    }

    /// Mark the quest completed (idempotent) and hand back its reward
    pub async fn complete_and_claim(
        &self,
        character_id: &str,
        template_id: &str,
    ) -> ProgressionResult<(QuestInstance, RewardDescriptor)> {
        let guard = self.progress.lock(character_id).await;
        self.complete_locked(&guard, template_id).await
    }

    /// Complete the quest and grant its reward exactly once
    pub async fn claim_reward(&self, character_id: &str, template_id: &str) -> ProgressionResult<ClaimOutcome> {
        let guard = self.progress.lock(character_id).await;
        let (_, reward) = self.complete_locked(&guard, template_id).await?;
        self.rewards.claim(&self.progress, &guard, template_id, &reward).await
    }

    pub async fn list_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.views(character_id, |_| true).await
    }

    pub async fn active_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.views(character_id, QuestInstance::is_active).await
    }

    pub async fn completed_quests(&self, character_id: &str) -> Vec<QuestView> {
        self.views(character_id, QuestInstance::is_completed).await
    }

    async fn views(&self, character_id: &str, keep: impl Fn(&QuestInstance) -> bool) -> Vec<QuestView> {
        let record = self.progress.load(character_id).await;
        record
            .quests
            .into_values()
            .filter(|i| keep(i))
            .map(|i| {
                let template = self.catalog.get(&i.template_id);
                QuestView::new(i, template)
            })
            .collect()
    }

    pub fn quest_progress(instance: &QuestInstance) -> ProgressSummary {
        instance.summary()
    }

    /// Assign the welcome quest to a character with no core quests yet.
    /// Returns whether it was assigned.
    pub async fn initialize_character(&self, character_id: &str) -> ProgressionResult<bool> {
        let welcome = self.core_template(WELCOME_QUEST_ID)?;
        self.progress
            .modify(character_id, |record, now| {
                if !record.quests.is_empty() {
                    return Ok((false, false));
                }
                record.upsert(QuestInstance::from_template(welcome, now));
                info!(character = character_id, quest = WELCOME_QUEST_ID, "initial quest assigned");
                Ok((true, true))
            })
            .await
    }

    /// Drop every main/side instance of the character
    pub async fn reset_character(&self, character_id: &str) -> bool {
        self.progress
            .modify(character_id, |record, _| {
                let dirty = !record.quests.is_empty();
                record.quests.clear();
                Ok(((), dirty))
            })
            .await
            .is_ok()
    }
}
