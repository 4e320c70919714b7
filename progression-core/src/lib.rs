//! Progression Core - quest and event progression logic
//!
//! Persistence-free domain logic shared by the server crate: calendar
//! buckets, objective matching, the quest instance state machine, the
//! per-character progress record, reward descriptors and level math, and the
//! built-in catalogs.

pub mod calendar;
pub mod catalog;
pub mod constants;
pub mod error;
pub mod logging;
pub mod objective;
pub mod progress;
pub mod quest;
pub mod reward;

pub use calendar::{Calendar, EventWindow, SeasonType};
pub use catalog::{EventCatalog, QuestCatalog, SeasonDefinition, SeasonalEvent, SpecialEffects, SpecialEvent};
pub use error::{Failure, Precondition, ProgressionError, ProgressionResult};
pub use objective::{
    DeltaRule, EventPayload, EventType, Objective, ObjectiveKind, ProgressEvent, TargetId, TaskValue,
};
pub use progress::{ClaimMarker, Partition, ProgressRecord};
pub use quest::{ProgressSummary, QuestCategory, QuestInstance, QuestStatus, QuestTemplate};
pub use reward::{
    CharacterSheet, ComponentOutcome, GrantComponent, ItemStack, LevelUp, RewardDescriptor, RewardGrantResult,
    RewardHistoryEntry,
};
