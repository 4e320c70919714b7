//! Engine configuration
//!
//! Defaults match the live service. `from_env` reads the `PROGRESSION_*`
//! variables and falls back to the defaults for anything unset or unparsable.

use progression_core::constants::{PROGRESS_TTL_SECS, REWARD_HISTORY_CAP, REWARD_HISTORY_TTL_SECS};
use progression_core::logging::TracingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// LMDB requires the map size to be a multiple of the OS page size
pub const LMDB_PAGE_SIZE: usize = 4096;

pub const DEFAULT_LMDB_PATH: &str = "data/progression";
pub const DEFAULT_LMDB_MAX_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Lmdb { path: PathBuf, max_size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub store: StoreBackend,
    pub progress_ttl_secs: u64,
    pub reward_history_ttl_secs: u64,
    pub reward_history_cap: usize,
    /// Offset east of UTC used to decide the local day
    pub utc_offset_minutes: i32,
    /// Seed for level-up rolls; entropy when unset
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            progress_ttl_secs: PROGRESS_TTL_SECS,
            reward_history_ttl_secs: REWARD_HISTORY_TTL_SECS,
            reward_history_cap: REWARD_HISTORY_CAP,
            utc_offset_minutes: 0,
            rng_seed: None,
            tracing: TracingConfig::default(),
        }
    }
}

/// Round up to the next multiple of [`LMDB_PAGE_SIZE`]. Sizes that cannot
/// be rounded without overflow fall back to [`DEFAULT_LMDB_MAX_SIZE`].
pub fn round_to_page(size: usize) -> usize {
    match size.div_ceil(LMDB_PAGE_SIZE).checked_mul(LMDB_PAGE_SIZE) {
        Some(rounded) => rounded,
        None => {
            warn!(size, fallback = DEFAULT_LMDB_MAX_SIZE, "lmdb map size overflows, using default");
            DEFAULT_LMDB_MAX_SIZE
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.store = match lookup("PROGRESSION_STORE").as_deref() {
            Some("lmdb") => {
                let path = lookup("PROGRESSION_LMDB_PATH").unwrap_or_else(|| DEFAULT_LMDB_PATH.to_string());
                let raw = parse_or(&lookup, "PROGRESSION_LMDB_MAX_SIZE", DEFAULT_LMDB_MAX_SIZE);
                StoreBackend::Lmdb {
                    path: PathBuf::from(path),
                    max_size: round_to_page(raw),
                }
            }
            Some("memory") | None => StoreBackend::Memory,
            Some(other) => {
                warn!(backend = other, "unknown PROGRESSION_STORE, using memory");
                StoreBackend::Memory
            }
        };

        config.utc_offset_minutes = parse_or(&lookup, "PROGRESSION_UTC_OFFSET_MINUTES", 0);
        config.rng_seed = lookup("PROGRESSION_RNG_SEED").and_then(|s| s.parse().ok());
        config
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparsable setting, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.progress_ttl_secs, 86_400);
        assert_eq!(config.reward_history_ttl_secs, 604_800);
        assert_eq!(config.reward_history_cap, 100);
        assert_eq!(config.rng_seed, None);
    }

    #[test]
    fn test_lmdb_from_env_rounds_map_size() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("PROGRESSION_STORE", "lmdb"),
            ("PROGRESSION_LMDB_PATH", "/tmp/prog"),
            ("PROGRESSION_LMDB_MAX_SIZE", "5000"),
            ("PROGRESSION_UTC_OFFSET_MINUTES", "540"),
            ("PROGRESSION_RNG_SEED", "42"),
        ]));
        assert_eq!(
            config.store,
            StoreBackend::Lmdb {
                path: PathBuf::from("/tmp/prog"),
                max_size: 8192
            }
        );
        assert_eq!(config.utc_offset_minutes, 540);
        assert_eq!(config.rng_seed, Some(42));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("PROGRESSION_STORE", "redis"),
            ("PROGRESSION_UTC_OFFSET_MINUTES", "nine"),
        ]));
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.utc_offset_minutes, 0);
    }

    #[test]
    fn test_round_to_page() {
        assert_eq!(round_to_page(4096), 4096);
        assert_eq!(round_to_page(4097), 8192);
        assert_eq!(round_to_page(0), 0);
        assert_eq!(round_to_page(usize::MAX), DEFAULT_LMDB_MAX_SIZE);
        assert_eq!(round_to_page(usize::MAX - LMDB_PAGE_SIZE + 1), usize::MAX - LMDB_PAGE_SIZE + 1);
    }

    #[test]
    fn test_oversized_map_size_falls_back() {
        let max = usize::MAX.to_string();
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("PROGRESSION_STORE", "lmdb"),
            ("PROGRESSION_LMDB_MAX_SIZE", max.as_str()),
        ]));
        assert_eq!(
            config.store,
            StoreBackend::Lmdb {
                path: PathBuf::from(DEFAULT_LMDB_PATH),
                max_size: DEFAULT_LMDB_MAX_SIZE
            }
        );
    }

    #[test]
    fn test_config_json() {
        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        assert!(json.contains("\"kind\":\"memory\""));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EngineConfig::default());
    }
}
