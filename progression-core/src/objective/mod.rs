//! Objectives and the transport events that advance them
//!
//! Transport event names map onto objective kinds:
//! - `interact` → interact (payload `targetCharacterId`)
//! - `chat` → chat (payload `targetCharacterId`)
//! - `enterBuilding` → visit_building (payload `buildingId`)
//! - `buildingStay` → duration (payload `buildingId`, `duration` in ms)
//! - `collect` → collect (payload `itemId`, `quantity`)
//! - `completeQuest` → complete_quest (payload `questId`)
//!
//! An objective without a target id matches any target of its kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the thing an objective points at (NPC, building, item).
/// Building ids are numeric in the catalog, everything else is text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Number(i64),
    Text(String),
}

impl TargetId {
    /// Type-aware equality; an integer matches its decimal string form
    pub fn matches(&self, other: &TargetId) -> bool {
        match (self, other) {
            (TargetId::Number(a), TargetId::Number(b)) => a == b,
            (TargetId::Text(a), TargetId::Text(b)) => a == b,
            (TargetId::Number(n), TargetId::Text(s)) | (TargetId::Text(s), TargetId::Number(n)) => {
                s.parse::<i64>().ok() == Some(*n)
            }
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Number(n) => write!(f, "{n}"),
            TargetId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId::Text(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        TargetId::Text(s)
    }
}

impl From<i64> for TargetId {
    fn from(n: i64) -> Self {
        TargetId::Number(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Interact,
    VisitBuilding,
    Duration,
    Chat,
    Collect,
    CompleteQuest,
    /// Generic counter, only advanced through direct task updates
    Count,
}

impl ObjectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveKind::Interact => "interact",
            ObjectiveKind::VisitBuilding => "visit_building",
            ObjectiveKind::Duration => "duration",
            ObjectiveKind::Chat => "chat",
            ObjectiveKind::Collect => "collect",
            ObjectiveKind::CompleteQuest => "complete_quest",
            ObjectiveKind::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveUnit {
    #[default]
    Count,
    Ms,
}

/// Transport event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Interact,
    Chat,
    EnterBuilding,
    BuildingStay,
    Collect,
    CompleteQuest,
}

impl EventType {
    pub fn objective_kind(&self) -> ObjectiveKind {
        match self {
            EventType::Interact => ObjectiveKind::Interact,
            EventType::Chat => ObjectiveKind::Chat,
            EventType::EnterBuilding => ObjectiveKind::VisitBuilding,
            EventType::BuildingStay => ObjectiveKind::Duration,
            EventType::Collect => ObjectiveKind::Collect,
            EventType::CompleteQuest => ObjectiveKind::CompleteQuest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Interact => "interact",
            EventType::Chat => "chat",
            EventType::EnterBuilding => "enterBuilding",
            EventType::BuildingStay => "buildingStay",
            EventType::Collect => "collect",
            EventType::CompleteQuest => "completeQuest",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interact" => Ok(EventType::Interact),
            "chat" => Ok(EventType::Chat),
            "enterBuilding" => Ok(EventType::EnterBuilding),
            "buildingStay" => Ok(EventType::BuildingStay),
            "collect" => Ok(EventType::Collect),
            "completeQuest" => Ok(EventType::CompleteQuest),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Payload accompanying a transport event. Fields irrelevant to the event
/// type are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_character_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    /// Milliseconds spent, for `buildingStay`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Explicit increment for recurring/seasonal counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

impl EventPayload {
    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// A transport event routed into the progression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub event_type: EventType,
    #[serde(default)]
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    pub fn interact(target: impl Into<TargetId>) -> Self {
        Self::new(
            EventType::Interact,
            EventPayload {
                target_character_id: Some(target.into()),
                ..Default::default()
            },
        )
    }

    pub fn chat(target: Option<TargetId>) -> Self {
        Self::new(
            EventType::Chat,
            EventPayload {
                target_character_id: target,
                ..Default::default()
            },
        )
    }

    pub fn enter_building(building: impl Into<TargetId>) -> Self {
        Self::new(
            EventType::EnterBuilding,
            EventPayload {
                building_id: Some(building.into()),
                ..Default::default()
            },
        )
    }

    pub fn building_stay(building: impl Into<TargetId>, duration_ms: u64) -> Self {
        Self::new(
            EventType::BuildingStay,
            EventPayload {
                building_id: Some(building.into()),
                duration: Some(duration_ms),
                ..Default::default()
            },
        )
    }

    pub fn collect(item: impl Into<TargetId>, quantity: u64) -> Self {
        Self::new(
            EventType::Collect,
            EventPayload {
                item_id: Some(item.into()),
                quantity: Some(quantity),
                ..Default::default()
            },
        )
    }

    pub fn quest_completed(quest_id: impl Into<TargetId>) -> Self {
        Self::new(
            EventType::CompleteQuest,
            EventPayload {
                quest_id: Some(quest_id.into()),
                ..Default::default()
            },
        )
    }

    /// The payload field that identifies this event's target
    pub fn target(&self) -> Option<&TargetId> {
        match self.event_type {
            EventType::Interact | EventType::Chat => self.payload.target_character_id.as_ref(),
            EventType::EnterBuilding | EventType::BuildingStay => self.payload.building_id.as_ref(),
            EventType::Collect => self.payload.item_id.as_ref(),
            EventType::CompleteQuest => self.payload.quest_id.as_ref(),
        }
    }

    /// Increment used by core quests: +1 per occurrence, +duration for
    /// stays, +quantity for collection
    pub fn natural_delta(&self) -> u64 {
        match self.event_type {
            EventType::BuildingStay => self.payload.duration.unwrap_or(0),
            EventType::Collect => self.payload.quantity.unwrap_or(0),
            _ => 1,
        }
    }

    /// Increment used by recurring and seasonal counters: explicit `amount`,
    /// else the natural quantity/duration, else 1
    pub fn amount(&self) -> u64 {
        self.payload
            .amount
            .or(match self.event_type {
                EventType::BuildingStay => self.payload.duration,
                EventType::Collect => self.payload.quantity,
                _ => None,
            })
            .unwrap_or(1)
    }
}

/// How an event's increment is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaRule {
    /// Core quests: [`ProgressEvent::natural_delta`]
    Natural,
    /// Recurring and seasonal counters: [`ProgressEvent::amount`]
    Amount,
}

/// Progress value of one task. Distinct objectives keep the list of targets
/// seen; everything else is a plain counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    Count(u64),
    Targets(Vec<String>),
}

impl Default for TaskValue {
    fn default() -> Self {
        TaskValue::Count(0)
    }
}

impl TaskValue {
    /// Value compared against the required count (list length for lists)
    pub fn measure(&self) -> u64 {
        match self {
            TaskValue::Count(n) => *n,
            TaskValue::Targets(list) => list.len() as u64,
        }
    }

    /// Monotonic merge: counters keep the maximum, lists are unioned
    pub fn merged(&self, incoming: &TaskValue) -> TaskValue {
        match (self, incoming) {
            (TaskValue::Targets(old), TaskValue::Targets(new)) => {
                let mut merged = old.clone();
                for target in new {
                    if !merged.contains(target) {
                        merged.push(target.clone());
                    }
                }
                TaskValue::Targets(merged)
            }
            _ => TaskValue::Count(self.measure().max(incoming.measure())),
        }
    }
}

/// One countable sub-goal. Used both as the template definition and as the
/// per-instance snapshot that later matching relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ObjectiveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    pub required_count: u64,
    #[serde(default)]
    pub unit: ObjectiveUnit,
    /// Count each target once (e.g. "visit 3 different buildings")
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distinct: bool,
}

impl Objective {
    pub fn new(id: &str, description: &str, kind: ObjectiveKind, required_count: u64) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            kind,
            target_id: None,
            required_count,
            unit: ObjectiveUnit::Count,
            distinct: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<TargetId>) -> Self {
        self.target_id = Some(target.into());
        self
    }

    pub fn in_ms(mut self) -> Self {
        self.unit = ObjectiveUnit::Ms;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Kind matches and, when the objective names a target, the event's
    /// target equals it
    pub fn matches(&self, event: &ProgressEvent) -> bool {
        if self.kind != event.event_type.objective_kind() {
            return false;
        }
        match &self.target_id {
            None => true,
            Some(wanted) => event.target().is_some_and(|got| wanted.matches(got)),
        }
    }

    pub fn is_met(&self, value: &TaskValue) -> bool {
        value.measure() >= self.required_count
    }

    /// New task value after `event`, or None if the event does not advance
    /// this objective
    pub fn advance(&self, current: &TaskValue, event: &ProgressEvent, rule: DeltaRule) -> Option<TaskValue> {
        if !self.matches(event) {
            return None;
        }

        if self.distinct {
            let target = event.target()?.to_string();
            let mut seen = match current {
                TaskValue::Targets(list) => list.clone(),
                TaskValue::Count(_) => Vec::new(),
            };
            if seen.contains(&target) {
                return None;
            }
            seen.push(target);
            return Some(TaskValue::Targets(seen));
        }

        let delta = match rule {
            DeltaRule::Natural => event.natural_delta(),
            DeltaRule::Amount => event.amount(),
        };
        if delta == 0 {
            return None;
        }
        Some(TaskValue::Count(current.measure().saturating_add(delta)))
    }
}
