//! Line-oriented driver for the progression engine.
//!
//! Reads one JSON command per line on stdin and writes one JSON result per
//! line on stdout, standing in for the real-time transport:
//!
//! ```text
//! {"op":"init","characterId":"c1"}
//! {"op":"event","characterId":"c1","eventType":"interact","payload":{"targetCharacterId":"ai-agent-1"}}
//! {"op":"claimQuest","characterId":"c1","questId":"welcome"}
//! ```

use progression_core::Failure;
use progression_server::{init_engine, EngineConfig, ProgressionService};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Command {
    #[serde(rename_all = "camelCase")]
    Init { character_id: String },
    #[serde(rename_all = "camelCase")]
    Event {
        character_id: String,
        event_type: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Quests { character_id: String },
    #[serde(rename_all = "camelCase")]
    Available { character_id: String },
    #[serde(rename_all = "camelCase")]
    AcceptQuest { character_id: String, quest_id: String },
    #[serde(rename_all = "camelCase")]
    ClaimQuest { character_id: String, quest_id: String },
    #[serde(rename_all = "camelCase")]
    Daily { character_id: String },
    #[serde(rename_all = "camelCase")]
    Weekly { character_id: String },
    #[serde(rename_all = "camelCase")]
    ClaimRecurring { character_id: String, instance_id: String },
    #[serde(rename_all = "camelCase")]
    Events { character_id: String },
    #[serde(rename_all = "camelCase")]
    ClaimSeasonal { character_id: String, event_id: String },
    #[serde(rename_all = "camelCase")]
    ClaimSpecial { character_id: String, event_id: String },
    #[serde(rename_all = "camelCase")]
    StartSeason { season_id: String },
    #[serde(rename_all = "camelCase")]
    EndSeason { season_id: String },
    #[serde(rename_all = "camelCase")]
    ActivateSpecial { event_id: String },
    #[serde(rename_all = "camelCase")]
    DeactivateSpecial { event_id: String },
    #[serde(rename_all = "camelCase")]
    History { character_id: String },
}

fn to_value<T: serde::Serialize>(result: progression_core::ProgressionResult<T>) -> Value {
    match result {
        Ok(value) => json!({ "success": true, "data": value }),
        Err(e) => serde_json::to_value(e.to_failure()).unwrap_or(Value::Null),
    }
}

async fn execute(service: &ProgressionService, command: Command) -> Value {
    match command {
        Command::Init { character_id } => to_value(service.initialize_character(&character_id).await),
        Command::Event {
            character_id,
            event_type,
            payload,
        } => to_value(service.handle_raw(&character_id, &event_type, payload).await),
        Command::Quests { character_id } => json!(service.quests().list_quests(&character_id).await),
        Command::Available { character_id } => json!(service.quests().compute_available(&character_id).await),
        Command::AcceptQuest {
            character_id,
            quest_id,
        } => to_value(service.quests().assign(&character_id, &quest_id).await),
        Command::ClaimQuest {
            character_id,
            quest_id,
        } => to_value(service.quests().claim_reward(&character_id, &quest_id).await),
        Command::Daily { character_id } => json!(service.recurring().get_daily_quests(&character_id).await),
        Command::Weekly { character_id } => json!(service.recurring().get_weekly_quests(&character_id).await),
        Command::ClaimRecurring {
            character_id,
            instance_id,
        } => to_value(service.recurring().complete_and_claim(&character_id, &instance_id).await),
        Command::Events { character_id } => json!({
            "seasonal": service.seasonal().character_events(&character_id).await,
            "special": service.special().character_events(&character_id).await,
        }),
        Command::ClaimSeasonal {
            character_id,
            event_id,
        } => to_value(service.seasonal().claim_reward(&character_id, &event_id).await),
        Command::ClaimSpecial {
            character_id,
            event_id,
        } => to_value(service.special().claim_reward(&character_id, &event_id).await),
        Command::StartSeason { season_id } => json!({ "success": service.seasonal().start_season(&season_id).await }),
        Command::EndSeason { season_id } => json!({ "success": service.seasonal().end_season(&season_id).await }),
        Command::ActivateSpecial { event_id } => {
            json!({ "success": service.special().activate_special_event(&event_id).await })
        }
        Command::DeactivateSpecial { event_id } => {
            json!({ "success": service.special().deactivate_special_event(&event_id).await })
        }
        Command::History { character_id } => json!(service.rewards().reward_history(&character_id).await),
    }
}

#[tokio::main]
async fn main() {
    // ========================================================================
    // 1. Configuration, tracing and store
    // ========================================================================
    let config = EngineConfig::from_env();
    let service = match init_engine(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to initialize progression store: {}", e);
            std::process::exit(1);
        }
    };
    info!(store = ?config.store, "Progression driver reading commands from stdin");

    // ========================================================================
    // 2. Command loop
    // ========================================================================
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => execute(&service, command).await,
            Err(e) => {
                warn!(error = %e, "unparsable command");
                json!(Failure {
                    success: false,
                    code: "malformed".into(),
                    error: e.to_string(),
                })
            }
        };

        let mut out = response.to_string();
        out.push('\n');
        if let Err(e) = stdout.write_all(out.as_bytes()).await {
            error!("stdout write failed: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
    info!("Progression driver stopped");
}
