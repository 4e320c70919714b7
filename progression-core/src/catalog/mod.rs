//! Built-in quest and event catalogs
//!
//! Templates are immutable once built. Core quests, daily and weekly
//! templates live in [`QuestCatalog`]; dated seasons and special events in
//! [`EventCatalog`]. Building targets are numeric ids from the world map.

use crate::calendar::{EventWindow, SeasonType};
use crate::objective::{Objective, ObjectiveKind};
use crate::progress::ProgressRecord;
use crate::quest::{QuestCategory, QuestTemplate};
use crate::reward::RewardDescriptor;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =====================
// Quest catalog
// =====================

#[derive(Debug, Clone, Default)]
pub struct QuestCatalog {
    templates: BTreeMap<String, QuestTemplate>,
}

impl QuestCatalog {
    pub fn new(templates: impl IntoIterator<Item = QuestTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Core, daily and weekly templates shipped with the game
    pub fn builtin() -> Self {
        Self::new(
            core_quests()
                .into_iter()
                .chain(daily_quests())
                .chain(weekly_quests()),
        )
    }

    pub fn get(&self, id: &str) -> Option<&QuestTemplate> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Every template ordered by (category, order hint)
    pub fn ordered(&self) -> Vec<&QuestTemplate> {
        let mut all: Vec<&QuestTemplate> = self.templates.values().collect();
        all.sort_by(|a, b| (a.category, a.order, &a.id).cmp(&(b.category, b.order, &b.id)));
        all
    }

    pub fn by_category(&self, category: QuestCategory) -> Vec<&QuestTemplate> {
        self.ordered()
            .into_iter()
            .filter(|t| t.category == category)
            .collect()
    }

    /// Main and side quests
    pub fn core(&self) -> Vec<&QuestTemplate> {
        self.ordered()
            .into_iter()
            .filter(|t| t.category.is_core())
            .collect()
    }

    /// Core templates the character has no instance of yet and whose
    /// prerequisites are all completed. Does not touch the record.
    pub fn available_for(&self, record: &ProgressRecord) -> Vec<&QuestTemplate> {
        let completed = record.completed_quest_ids();
        self.core()
            .into_iter()
            .filter(|t| !record.quests.contains_key(&t.id))
            .filter(|t| t.prerequisites.iter().all(|p| completed.contains(p)))
            .collect()
    }
}

pub fn core_quests() -> Vec<QuestTemplate> {
    vec![
        QuestTemplate::new(
            "welcome",
            "Welcome to the AI world!",
            "Say hello to Yuri and start chatting.",
            QuestCategory::Main,
        )
        .objective(
            Objective::new("greet_ai", "Greet Yuri", ObjectiveKind::Interact, 1).with_target("ai-agent-1"),
        )
        .reward(
            RewardDescriptor::new()
                .points(100)
                .experience(50)
                .item("healthPotion", 2)
                .item("coin", 30),
        )
        .order(1),
        QuestTemplate::new(
            "explore_park",
            "Park exploration",
            "Visit the park and enjoy nature.",
            QuestCategory::Main,
        )
        .objective(Objective::new("visit_park", "Visit the park", ObjectiveKind::VisitBuilding, 1).with_target(3))
        .objective(
            Objective::new("stay_park", "Stay in the park for 30 seconds", ObjectiveKind::Duration, 30_000)
                .with_target(3)
                .in_ms(),
        )
        .reward(
            RewardDescriptor::new()
                .points(150)
                .experience(100)
                .item("experiencePotion", 1)
                .item("giftBox", 1),
        )
        .requires("welcome")
        .order(2),
        QuestTemplate::new(
            "visit_cafe",
            "A break at the cafe",
            "Visit the cafe and take a rest.",
            QuestCategory::Main,
        )
        .objective(Objective::new("visit_cafe", "Visit the cafe", ObjectiveKind::VisitBuilding, 1).with_target(2))
        .reward(RewardDescriptor::new().points(120).experience(80).item("coin", 40))
        .requires("welcome")
        .order(3),
        QuestTemplate::new(
            "shop_mastery",
            "Shop master",
            "Visit the shop and learn how to buy things.",
            QuestCategory::Main,
        )
        .objective(Objective::new("visit_shop", "Visit the shop", ObjectiveKind::VisitBuilding, 1).with_target(1))
        .reward(
            RewardDescriptor::new()
                .points(200)
                .experience(150)
                .item("coin", 50)
                .item("healthPotion", 5),
        )
        .requires("visit_cafe")
        .order(4),
        QuestTemplate::new("gym_training", "Gym training", "Visit the gym and work out.", QuestCategory::Side)
            .objective(Objective::new("visit_gym", "Visit the gym", ObjectiveKind::VisitBuilding, 1).with_target(5))
            .reward(RewardDescriptor::new().points(180).experience(120).item("healthPotion", 3))
            .order(1),
        QuestTemplate::new(
            "library_visit",
            "Library search",
            "Visit the library and broaden your knowledge.",
            QuestCategory::Side,
        )
        .objective(Objective::new("visit_library", "Visit the library", ObjectiveKind::VisitBuilding, 1).with_target(4))
        .reward(RewardDescriptor::new().points(160).experience(100).item("experiencePotion", 2))
        .order(2),
    ]
}

pub fn daily_quests() -> Vec<QuestTemplate> {
    const DAY: u64 = 86_400;
    vec![
        QuestTemplate::new("daily-coins", "Coin collector", "Collect 100 coins", QuestCategory::Daily)
            .objective(
                Objective::new("collect-coins-100", "Collect 100 coins", ObjectiveKind::Collect, 100)
                    .with_target("coin"),
            )
            .reward(RewardDescriptor::new().experience(50).coins(50))
            .order(1)
            .cooldown_secs(DAY),
        QuestTemplate::new("daily-social", "Social butterfly", "Chat 5 times", QuestCategory::Daily)
            .objective(Objective::new("chat-5-times", "Chat 5 times", ObjectiveKind::Chat, 5))
            .reward(RewardDescriptor::new().experience(30).coins(30))
            .order(2)
            .cooldown_secs(DAY),
        QuestTemplate::new(
            "daily-explorer",
            "Explorer",
            "Visit 3 different buildings",
            QuestCategory::Daily,
        )
        .objective(Objective::new("visit-3-buildings", "Visit 3 buildings", ObjectiveKind::VisitBuilding, 3).distinct())
        .reward(RewardDescriptor::new().experience(40).coins(40))
        .order(3)
        .cooldown_secs(DAY),
    ]
}

pub fn weekly_quests() -> Vec<QuestTemplate> {
    const WEEK: u64 = 604_800;
    vec![
        QuestTemplate::new(
            "weekly-master-explorer",
            "Master explorer",
            "Visit 10 buildings",
            QuestCategory::Weekly,
        )
        .objective(Objective::new("visit-10-buildings", "Visit 10 buildings", ObjectiveKind::VisitBuilding, 10))
        .reward(RewardDescriptor::new().experience(200).coins(100).item("compass", 1))
        .order(1)
        .cooldown_secs(WEEK),
        QuestTemplate::new("weekly-chat-master", "Chat king", "Chat 30 times", QuestCategory::Weekly)
            .objective(Objective::new("chat-30-times", "Chat 30 times", ObjectiveKind::Chat, 30))
            .reward(RewardDescriptor::new().experience(150).coins(80))
            .order(2)
            .cooldown_secs(WEEK),
        QuestTemplate::new(
            "weekly-quest-hunter",
            "Quest hunter",
            "Complete 5 quests",
            QuestCategory::Weekly,
        )
        .objective(Objective::new("complete-5-quests", "Complete 5 quests", ObjectiveKind::CompleteQuest, 5))
        .reward(RewardDescriptor::new().experience(250).coins(120).item("quest-book", 1))
        .order(3)
        .cooldown_secs(WEEK),
    ]
}

// =====================
// Event catalog
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalEvent {
    pub event_id: String,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub window: EventWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "rewards")]
    pub reward: RewardDescriptor,
    pub tasks: Vec<Objective>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonDefinition {
    pub season_id: String,
    pub season_type: SeasonType,
    pub year: i32,
    #[serde(flatten)]
    pub window: EventWindow,
    pub is_active: bool,
    pub events: Vec<SeasonalEvent>,
}

impl SeasonDefinition {
    pub fn event(&self, event_id: &str) -> Option<&SeasonalEvent> {
        self.events.iter().find(|e| e.event_id == event_id)
    }

    /// Season switched on and inside its window
    pub fn is_live(&self, is_active: bool, now: DateTime<Utc>) -> bool {
        self.window.is_active(is_active, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialEffects {
    pub world_theme: String,
    pub npc_costumes: Vec<String>,
    pub background_music: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialEvent {
    pub event_id: String,
    pub event_type: String,
    pub year: i32,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub window: EventWindow,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "rewards")]
    pub reward: RewardDescriptor,
    pub tasks: Vec<Objective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_effects: Option<SpecialEffects>,
}

#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    seasons: Vec<SeasonDefinition>,
    specials: Vec<SpecialEvent>,
}

impl EventCatalog {
    pub fn new(seasons: Vec<SeasonDefinition>, specials: Vec<SpecialEvent>) -> Self {
        Self { seasons, specials }
    }

    pub fn builtin() -> Self {
        Self::new(seasons(), special_events())
    }

    pub fn seasons(&self) -> &[SeasonDefinition] {
        &self.seasons
    }

    pub fn specials(&self) -> &[SpecialEvent] {
        &self.specials
    }

    pub fn season(&self, season_id: &str) -> Option<&SeasonDefinition> {
        self.seasons.iter().find(|s| s.season_id == season_id)
    }

    /// Season whose window contains `now`
    pub fn current_season(&self, now: DateTime<Utc>) -> Option<&SeasonDefinition> {
        self.seasons.iter().find(|s| s.window.contains(now))
    }

    pub fn special(&self, event_id: &str) -> Option<&SpecialEvent> {
        self.specials.iter().find(|e| e.event_id == event_id)
    }
}

/// Midnight UTC at the start of the day
fn day_start(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// 23:59:59 UTC at the end of the day
fn day_end(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 23, 59, 59)
        .single()
        .unwrap_or_default()
}

fn window(start: (i32, u32, u32), end: (i32, u32, u32)) -> EventWindow {
    EventWindow::new(day_start(start.0, start.1, start.2), day_end(end.0, end.1, end.2))
}

fn seasonal_event(
    event_id: &str,
    title: &str,
    description: &str,
    window: EventWindow,
    reward: RewardDescriptor,
    tasks: Vec<Objective>,
) -> SeasonalEvent {
    SeasonalEvent {
        event_id: event_id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        window,
        image_url: Some(format!("/events/{}.jpg", event_id.trim_end_matches("-2026"))),
        reward,
        tasks,
    }
}

pub fn seasons() -> Vec<SeasonDefinition> {
    vec![
        SeasonDefinition {
            season_id: "spring-2026".into(),
            season_type: SeasonType::Spring,
            year: 2026,
            window: window((2026, 3, 1), (2026, 5, 31)),
            is_active: true,
            events: vec![seasonal_event(
                "cherry-blossom-2026",
                "Cherry blossom festival",
                "Cherry blossoms are in full bloom!",
                window((2026, 4, 1), (2026, 4, 30)),
                RewardDescriptor::new().experience(200).coins(100).item("cherry-pet", 1),
                vec![
                    Objective::new("visit-park-5-times", "Visit the park 5 times", ObjectiveKind::VisitBuilding, 5)
                        .with_target("park"),
                    Objective::new("chat-with-ai-10-times", "Chat with the AI 10 times", ObjectiveKind::Chat, 10),
                ],
            )],
        },
        SeasonDefinition {
            season_id: "summer-2026".into(),
            season_type: SeasonType::Summer,
            year: 2026,
            window: window((2026, 6, 1), (2026, 8, 31)),
            is_active: false,
            events: vec![seasonal_event(
                "summer-fest-2026",
                "Summer festival",
                "A cool summer festival!",
                window((2026, 7, 1), (2026, 8, 31)),
                RewardDescriptor::new().experience(250).coins(150).item("water-gun", 1),
                vec![
                    Objective::new("visit-beach-3-times", "Visit the beach 3 times", ObjectiveKind::VisitBuilding, 3)
                        .with_target("beach"),
                ],
            )],
        },
        SeasonDefinition {
            season_id: "autumn-2026".into(),
            season_type: SeasonType::Autumn,
            year: 2026,
            window: window((2026, 9, 1), (2026, 11, 30)),
            is_active: false,
            events: vec![seasonal_event(
                "fall-fest-2026",
                "Autumn festival",
                "The season of falling leaves!",
                window((2026, 10, 1), (2026, 11, 30)),
                RewardDescriptor::new().experience(200).coins(100).item("maple-leaf", 5),
                vec![
                    Objective::new("visit-forest-5-times", "Visit the forest 5 times", ObjectiveKind::VisitBuilding, 5)
                        .with_target("forest"),
                ],
            )],
        },
        SeasonDefinition {
            season_id: "winter-2026".into(),
            season_type: SeasonType::Winter,
            year: 2026,
            window: window((2026, 12, 1), (2027, 2, 28)),
            is_active: false,
            events: vec![seasonal_event(
                "winter-fest-2026",
                "Winter festival",
                "A beautiful season of snow!",
                window((2026, 12, 1), (2027, 2, 28)),
                RewardDescriptor::new().experience(300).coins(200).item("snowflake", 10),
                vec![Objective::new("build-snowman", "Build a snowman", ObjectiveKind::Interact, 1).with_target("snowman")],
            )],
        },
    ]
}

fn effects(theme: &str, costumes: &[&str], music: &str) -> Option<SpecialEffects> {
    Some(SpecialEffects {
        world_theme: theme.to_string(),
        npc_costumes: costumes.iter().map(|c| c.to_string()).collect(),
        background_music: music.to_string(),
    })
}

pub fn special_events() -> Vec<SpecialEvent> {
    vec![
        SpecialEvent {
            event_id: "halloween-2026".into(),
            event_type: "halloween".into(),
            year: 2026,
            title: "Halloween party".into(),
            description: "A spooky night festival!".into(),
            window: window((2026, 10, 28), (2026, 10, 31)),
            is_active: false,
            image_url: Some("/events/halloween.jpg".into()),
            reward: RewardDescriptor::new()
                .experience(500)
                .coins(300)
                .item("pumpkin-costume", 1)
                .item("candy", 20),
            tasks: vec![
                Objective::new("collect-candies-50", "Collect 50 candies", ObjectiveKind::Collect, 50).with_target("candy"),
                Objective::new("visit-haunted-house", "Visit the haunted house", ObjectiveKind::VisitBuilding, 1)
                    .with_target("haunted-house"),
            ],
            special_effects: effects("halloween", &["ghost", "witch", "pumpkin"], "/audio/halloween-bg.mp3"),
        },
        SpecialEvent {
            event_id: "christmas-2026".into(),
            event_type: "christmas".into(),
            year: 2026,
            title: "Christmas".into(),
            description: "A merry Christmas with Santa!".into(),
            window: window((2026, 12, 24), (2026, 12, 25)),
            is_active: false,
            image_url: Some("/events/christmas.jpg".into()),
            reward: RewardDescriptor::new()
                .experience(600)
                .coins(400)
                .item("santa-hat", 1)
                .item("present", 5),
            tasks: vec![
                Objective::new("spread-cheer-10-chats", "Spread cheer in 10 chats", ObjectiveKind::Chat, 10),
                Objective::new("visit-church", "Visit the church", ObjectiveKind::VisitBuilding, 1).with_target("church"),
            ],
            special_effects: effects("christmas", &["santa", "reindeer", "elf"], "/audio/christmas-bg.mp3"),
        },
        SpecialEvent {
            event_id: "new-year-2027".into(),
            event_type: "new-year".into(),
            year: 2027,
            title: "New year celebration".into(),
            description: "Happy new year!".into(),
            window: window((2027, 1, 1), (2027, 1, 1)),
            is_active: false,
            image_url: Some("/events/new-year.jpg".into()),
            reward: RewardDescriptor::new().experience(1000).coins(500).item("lucky-charm", 1),
            tasks: vec![Objective::new("new-year-greeting", "Greet the AI for the new year", ObjectiveKind::Chat, 1)],
            special_effects: effects("new-year", &["hanbok"], "/audio/new-year-bg.mp3"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_catalog_contents() {
        let catalog = QuestCatalog::builtin();
        assert_eq!(catalog.len(), 12);
        assert_eq!(catalog.core().len(), 6);
        assert_eq!(catalog.by_category(QuestCategory::Daily).len(), 3);
        assert_eq!(catalog.by_category(QuestCategory::Weekly).len(), 3);

        let welcome = catalog.get("welcome").unwrap();
        assert_eq!(welcome.reward.points, 100);
        assert_eq!(welcome.objectives[0].required_count, 1);
    }

    #[test]
    fn test_ordering_is_category_then_hint() {
        let catalog = QuestCatalog::builtin();
        let ids: Vec<&str> = catalog.core().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["welcome", "explore_park", "visit_cafe", "shop_mastery", "gym_training", "library_visit"]
        );
    }

    #[test]
    fn test_prerequisites_reference_known_templates() {
        let catalog = QuestCatalog::builtin();
        for template in catalog.ordered() {
            for prereq in &template.prerequisites {
                assert!(catalog.get(prereq).is_some(), "{} requires unknown {}", template.id, prereq);
            }
        }
    }

    #[test]
    fn test_task_ids_are_unique_per_template() {
        let catalog = QuestCatalog::builtin();
        for template in catalog.ordered() {
            let ids: HashSet<&str> = template.objectives.iter().map(|o| o.id.as_str()).collect();
            assert_eq!(ids.len(), template.objectives.len());
        }
    }

    #[test]
    fn test_available_for_fresh_character() {
        let catalog = QuestCatalog::builtin();
        let record = ProgressRecord::new();
        let ids: Vec<&str> = catalog.available_for(&record).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["welcome", "gym_training", "library_visit"]);
    }

    #[test]
    fn test_current_season_by_window() {
        let events = EventCatalog::builtin();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let season = events.current_season(now).unwrap();
        assert_eq!(season.season_id, "autumn-2026");
        assert!(!season.is_live(season.is_active, now));
        assert!(season.event("fall-fest-2026").unwrap().window.contains(now));

        // Winter spans the year boundary
        let jan = Utc.with_ymd_and_hms(2027, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(events.current_season(jan).unwrap().season_id, "winter-2026");
        assert!(events.current_season(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()).is_none());
    }

    #[test]
    fn test_special_event_effects() {
        let events = EventCatalog::builtin();
        let halloween = events.special("halloween-2026").unwrap();
        let effects = halloween.special_effects.as_ref().unwrap();
        assert_eq!(effects.world_theme, "halloween");
        assert_eq!(effects.npc_costumes.len(), 3);
        assert_eq!(halloween.window.end_date, day_end(2026, 10, 31));
    }

    #[test]
    fn test_event_json_uses_transport_names() {
        let events = EventCatalog::builtin();
        let json = serde_json::to_value(events.special("new-year-2027").unwrap()).unwrap();
        assert_eq!(json["eventId"], "new-year-2027");
        assert_eq!(json["rewards"]["coins"], 500);
        assert!(json.get("startDate").is_some());
        assert_eq!(json["tasks"][0]["type"], "chat");
    }
}
