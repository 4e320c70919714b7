//! Centralized constants for the progression core.
//!
//! Persistence keys, TTLs and leveling numbers shared by the server crate.
//! Catalog-specific numbers (reward amounts, required counts) live in
//! `catalog` as the single source of truth.

// =====================================================
// Persistence keys
// =====================================================

/// Key prefix for a character's progress record: `event:progress:{characterId}`
pub const PROGRESS_KEY_PREFIX: &str = "event:progress:";

/// Key prefix for main/side quests and claim markers, kept without expiry:
/// `quest:progress:{characterId}`
pub const QUEST_PROGRESS_KEY_PREFIX: &str = "quest:progress:";

/// Key prefix for a character's reward history: `event:rewards:{characterId}`
pub const REWARD_HISTORY_KEY_PREFIX: &str = "event:rewards:";

/// Key prefix for the character ledger blob: `character:{characterId}`
pub const CHARACTER_KEY_PREFIX: &str = "character:";

/// Key prefix for the inventory ledger blob: `inventory:{characterId}`
pub const INVENTORY_KEY_PREFIX: &str = "inventory:";

/// Key prefix for season activation overrides: `event:season:{seasonId}`
pub const SEASON_OVERRIDE_KEY_PREFIX: &str = "event:season:";

/// Key prefix for special event activation overrides: `event:special:{eventId}`
pub const SPECIAL_OVERRIDE_KEY_PREFIX: &str = "event:special:";

// =====================================================
// TTLs
// =====================================================

/// Event progress record (1 day). Quest progress and ledger blobs are
/// written without expiry.
pub const PROGRESS_TTL_SECS: u64 = 86_400;

/// Reward history (1 week)
pub const REWARD_HISTORY_TTL_SECS: u64 = 604_800;

/// Maximum reward history entries kept per character
pub const REWARD_HISTORY_CAP: usize = 100;

// =====================================================
// Leveling
// =====================================================

/// requiredExp = LEVEL_EXP_FACTOR * level^2
pub const LEVEL_EXP_FACTOR: u64 = 100;

/// Level of a character with no ledger entry
pub const STARTING_LEVEL: u32 = 1;

/// Item id that coin rewards are credited under
pub const COIN_ITEM_ID: &str = "coin";

/// Quest auto-assigned on first login
pub const WELCOME_QUEST_ID: &str = "welcome";

pub fn progress_key(character_id: &str) -> String {
    format!("{PROGRESS_KEY_PREFIX}{character_id}")
}

pub fn quest_progress_key(character_id: &str) -> String {
    format!("{QUEST_PROGRESS_KEY_PREFIX}{character_id}")
}

pub fn reward_history_key(character_id: &str) -> String {
    format!("{REWARD_HISTORY_KEY_PREFIX}{character_id}")
}

pub fn character_key(character_id: &str) -> String {
    format!("{CHARACTER_KEY_PREFIX}{character_id}")
}

pub fn inventory_key(character_id: &str) -> String {
    format!("{INVENTORY_KEY_PREFIX}{character_id}")
}

pub fn season_override_key(season_id: &str) -> String {
    format!("{SEASON_OVERRIDE_KEY_PREFIX}{season_id}")
}

pub fn special_override_key(event_id: &str) -> String {
    format!("{SPECIAL_OVERRIDE_KEY_PREFIX}{event_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(progress_key("c1"), "event:progress:c1");
        assert_eq!(quest_progress_key("c1"), "quest:progress:c1");
        assert_eq!(reward_history_key("c1"), "event:rewards:c1");
        assert_eq!(character_key("c1"), "character:c1");
        assert_eq!(inventory_key("c1"), "inventory:c1");
        assert_eq!(season_override_key("autumn-2026"), "event:season:autumn-2026");
        assert_eq!(special_override_key("halloween-2026"), "event:special:halloween-2026");
    }
}
