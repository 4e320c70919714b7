//! Reward descriptors, grant outcomes and the character ledger blob
//!
//! A [`RewardDescriptor`] is split into independent [`GrantComponent`]s.
//! Each component is applied on its own and reports a [`ComponentOutcome`]
//! under a stable key, so a retried claim can skip what already landed.

use crate::constants::{LEVEL_EXP_FACTOR, STARTING_LEVEL};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub id: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(id: &str, quantity: u32) -> Self {
        Self {
            id: id.to_string(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDescriptor {
    #[serde(default)]
    pub experience: u64,
    #[serde(default)]
    pub coins: u64,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub items: Vec<ItemStack>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats_boost: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl RewardDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experience(mut self, amount: u64) -> Self {
        self.experience = amount;
        self
    }

    pub fn coins(mut self, amount: u64) -> Self {
        self.coins = amount;
        self
    }

    pub fn points(mut self, amount: u64) -> Self {
        self.points = amount;
        self
    }

    pub fn item(mut self, id: &str, quantity: u32) -> Self {
        self.items.push(ItemStack::new(id, quantity));
        self
    }

    pub fn stat(mut self, name: &str, amount: i64) -> Self {
        self.stats_boost.insert(name.to_string(), amount);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.components().is_empty()
    }

    /// Non-empty components in grant order. Item stacks sharing an id are
    /// folded into one component.
    pub fn components(&self) -> Vec<GrantComponent> {
        let mut components = Vec::new();
        if self.experience > 0 {
            components.push(GrantComponent::Experience(self.experience));
        }
        if self.coins > 0 {
            components.push(GrantComponent::Coins(self.coins));
        }
        if self.points > 0 {
            components.push(GrantComponent::Points(self.points));
        }

        let mut items: Vec<ItemStack> = Vec::new();
        for stack in self.items.iter().filter(|s| s.quantity > 0) {
            match items.iter_mut().find(|s| s.id == stack.id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(stack.quantity),
                None => items.push(stack.clone()),
            }
        }
        components.extend(items.into_iter().map(GrantComponent::Item));

        if !self.stats_boost.is_empty() {
            components.push(GrantComponent::Stats(self.stats_boost.clone()));
        }
        if let Some(title) = self.title.as_ref().filter(|t| !t.is_empty()) {
            components.push(GrantComponent::Title(title.clone()));
        }
        components
    }
}

/// One independently applied piece of a reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantComponent {
    Experience(u64),
    Coins(u64),
    Points(u64),
    Item(ItemStack),
    Stats(BTreeMap<String, i64>),
    Title(String),
}

impl GrantComponent {
    /// Stable key recorded in `granted_components`
    pub fn key(&self) -> String {
        match self {
            GrantComponent::Experience(_) => "experience".to_string(),
            GrantComponent::Coins(_) => "coins".to_string(),
            GrantComponent::Points(_) => "points".to_string(),
            GrantComponent::Item(stack) => format!("item:{}", stack.id),
            GrantComponent::Stats(_) => "stats".to_string(),
            GrantComponent::Title(_) => "title".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOutcome {
    pub component: String,
    pub success: bool,
    /// Granted by an earlier attempt, not re-applied
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentOutcome {
    pub fn granted(component: String) -> Self {
        Self {
            component,
            success: true,
            skipped: false,
            error: None,
        }
    }

    pub fn skipped(component: String) -> Self {
        Self {
            component,
            success: true,
            skipped: true,
            error: None,
        }
    }

    pub fn failed(component: String, error: impl Into<String>) -> Self {
        Self {
            component,
            success: false,
            skipped: false,
            error: Some(error.into()),
        }
    }
}

/// Stat bonus rolled for one level gained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub level: u32,
    pub hp: i64,
    pub affinity: i64,
    pub charisma: i64,
    pub intelligence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrantResult {
    /// AND of every component outcome
    pub success: bool,
    pub components: Vec<ComponentOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub level_ups: Vec<LevelUp>,
    pub granted_at: DateTime<Utc>,
}

impl RewardGrantResult {
    pub fn new(components: Vec<ComponentOutcome>, level_ups: Vec<LevelUp>, granted_at: DateTime<Utc>) -> Self {
        Self {
            success: components.iter().all(|c| c.success),
            components,
            level_ups,
            granted_at,
        }
    }

    /// Keys of the components that landed in this attempt
    pub fn newly_granted(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(|c| c.success && !c.skipped)
            .map(|c| c.component.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.components.iter().filter(|c| !c.success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistoryEntry {
    /// Instance id the reward was claimed for
    pub source_id: String,
    pub reward: RewardDescriptor,
    pub granted_at: DateTime<Utc>,
}

// =====================================================
// Character ledger
// =====================================================

pub const STAT_HP: &str = "hp";
pub const STAT_MAX_HP: &str = "maxHp";
pub const STAT_AFFINITY: &str = "affinity";
pub const STAT_CHARISMA: &str = "charisma";
pub const STAT_INTELLIGENCE: &str = "intelligence";

/// Stats a character starts with when the ledger has none
pub const BASE_STATS: [(&str, i64); 5] = [
    (STAT_HP, 100),
    (STAT_MAX_HP, 100),
    (STAT_AFFINITY, 10),
    (STAT_CHARISMA, 5),
    (STAT_INTELLIGENCE, 5),
];

fn starting_level() -> u32 {
    STARTING_LEVEL
}

/// `character:{id}` blob. Fields owned by other systems are carried through
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSheet {
    #[serde(default)]
    pub exp: u64,
    #[serde(default = "starting_level")]
    pub level: u32,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CharacterSheet {
    fn default() -> Self {
        let mut sheet = Self {
            exp: 0,
            level: STARTING_LEVEL,
            points: 0,
            stats: BTreeMap::new(),
            titles: Vec::new(),
            active_title: None,
            extra: serde_json::Map::new(),
        };
        sheet.ensure_base_stats();
        sheet
    }
}

/// Experience needed to advance past `level`
pub fn required_exp(level: u32) -> u64 {
    let level = u64::from(level);
    LEVEL_EXP_FACTOR.saturating_mul(level.saturating_mul(level))
}

/// Random stat bonus for reaching `level`
pub fn roll_level_up<R: Rng + ?Sized>(rng: &mut R, level: u32) -> LevelUp {
    LevelUp {
        level,
        hp: rng.gen_range(10..=14),
        affinity: rng.gen_range(2..=3),
        charisma: rng.gen_range(1..=2),
        intelligence: rng.gen_range(1..=2),
    }
}

impl CharacterSheet {
    pub fn ensure_base_stats(&mut self) {
        for (name, value) in BASE_STATS {
            self.stats.entry(name.to_string()).or_insert(value);
        }
    }

    pub fn stat(&self, name: &str) -> i64 {
        self.stats.get(name).copied().unwrap_or(0)
    }

    fn add_stat(&mut self, name: &str, delta: i64) {
        let value = self.stats.entry(name.to_string()).or_insert(0);
        *value = value.saturating_add(delta);
    }

    /// Add experience and apply every level-up it pays for. Leftover
    /// experience carries into the next level.
    pub fn gain_experience<R: Rng + ?Sized>(&mut self, amount: u64, rng: &mut R) -> Vec<LevelUp> {
        self.ensure_base_stats();
        self.exp = self.exp.saturating_add(amount);

        let mut level_ups = Vec::new();
        while self.exp >= required_exp(self.level) && self.level < u32::MAX {
            self.exp -= required_exp(self.level);
            self.level += 1;

            let bonus = roll_level_up(rng, self.level);
            self.add_stat(STAT_HP, bonus.hp);
            self.add_stat(STAT_MAX_HP, bonus.hp);
            self.add_stat(STAT_AFFINITY, bonus.affinity);
            self.add_stat(STAT_CHARISMA, bonus.charisma);
            self.add_stat(STAT_INTELLIGENCE, bonus.intelligence);
            level_ups.push(bonus);
        }
        level_ups
    }

    /// An `hp` boost raises `maxHp` by the same amount
    pub fn apply_stats_boost(&mut self, boost: &BTreeMap<String, i64>) {
        self.ensure_base_stats();
        for (name, delta) in boost {
            self.add_stat(name, *delta);
            if name == STAT_HP {
                self.add_stat(STAT_MAX_HP, *delta);
            }
        }
    }

    /// Append the title once and make it active
    pub fn add_title(&mut self, title: &str) {
        if !self.titles.iter().any(|t| t == title) {
            self.titles.push(title.to_string());
        }
        self.active_title = Some(title.to_string());
    }
}
