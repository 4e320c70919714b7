//! Progression Server Library
//!
//! Async services over the key-value persistence collaborator:
//! - Key-value store trait with in-memory and LMDB backends
//! - Per-character serialization of load → mutate → save
//! - Event progress manager (shared instance lifecycle, calendar resets)
//! - Quest engine for main/side quests
//! - Daily/weekly, seasonal and special event managers
//! - Reward grant engine over the character and inventory ledgers
//! - Fan-out service routing transport events to every manager

pub mod activation;  // Operator season / special event switches
pub mod clock;
pub mod config;  // EngineConfig + PROGRESSION_* environment
pub mod locks;  // Per-character async mutexes
pub mod progress_store;  // EventProgressManager
pub mod quest_engine;  // Main and side quests
pub mod recurring;  // Daily and weekly quests
pub mod rewards;  // Reward grants, ledgers, reward history
pub mod seasonal;
pub mod service;  // ProgressionService fan-out + init_engine
pub mod special;
pub mod storage;  // KvStore trait (memory + LMDB)

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, StoreBackend};
pub use progress_store::EventProgressManager;
pub use quest_engine::{QuestEngine, QuestView};
pub use recurring::{Recurrence, RecurringQuestManager};
pub use rewards::{CharacterLedger, ClaimOutcome, InventoryLedger, KvInventoryLedger, LedgerError, RewardGrantEngine};
pub use seasonal::{EventStatus, EventView, SeasonalEventManager};
pub use service::{init_engine, CharacterInit, ProgressReport, ProgressionService};
pub use special::SpecialEventManager;
pub use storage::{KvError, KvStore, LmdbKvStore, MemoryKvStore, SetOptions};
