//! Structured logging setup
//!
//! The engine logs through `tracing` macros. Binaries and tests call
//! [`init_tracing`] once; later calls are ignored. `RUST_LOG` overrides the
//! configured filter.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Once;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    pub default_level: LogLevel,
    pub module_filters: Vec<(String, LogLevel)>,
    pub show_targets: bool,
    pub show_thread_ids: bool,
    pub show_file_line: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            module_filters: vec![
                ("progression_core".to_string(), LogLevel::Info),
                ("progression_server::storage".to_string(), LogLevel::Warn),
                ("progression_server".to_string(), LogLevel::Info),
            ],
            show_targets: true,
            show_thread_ids: false,
            show_file_line: false,
        }
    }
}

impl TracingConfig {
    /// Render as an `EnvFilter` directive string, e.g. `info,progression_core=debug`
    pub fn to_env_filter_string(&self) -> String {
        let mut parts = vec![self.default_level.as_str().to_string()];
        for (module, level) in &self.module_filters {
            parts.push(format!("{}={}", module, level.as_str()));
        }
        parts.join(",")
    }

    pub fn with_module(mut self, module: &str, level: LogLevel) -> Self {
        self.module_filters.retain(|(m, _)| m != module);
        self.module_filters.push((module.to_string(), level));
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

static TRACING_INIT: Once = Once::new();

pub fn init_tracing_default() {
    init_tracing(&TracingConfig::default());
}

/// First call wins
pub fn init_tracing(config: &TracingConfig) {
    let config = config.clone();
    TRACING_INIT.call_once(move || {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.to_env_filter_string()));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.show_targets)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .compact();

        // A test harness may already have installed a global subscriber
        let _ = subscriber.try_init();
    });
}

/// Timing guard for one engine operation. Holds an unentered span so it
/// can live across `.await`; async callers attach it with
/// `tracing::Instrument`. Logs the elapsed time at DEBUG when dropped.
pub struct TimingSpan {
    name: &'static str,
    started: Instant,
    span: tracing::Span,
}

impl TimingSpan {
    pub fn new(name: &'static str, character_id: &str) -> Self {
        Self {
            name,
            started: Instant::now(),
            span: tracing::info_span!("operation", op = name, character = character_id),
        }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }

    pub fn elapsed_micros(&self) -> u128 {
        self.started.elapsed().as_micros()
    }
}

impl Drop for TimingSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_micros() as u64;
        self.span.in_scope(|| {
            tracing::debug!(operation = self.name, elapsed_us, "operation finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_env_filter_string() {
        let filter = TracingConfig::default().to_env_filter_string();
        assert!(filter.starts_with("info"));
        assert!(filter.contains("progression_server::storage=warn"));
    }

    #[test]
    fn test_with_module_replaces_existing_filter() {
        let config = TracingConfig::default().with_module("progression_core", LogLevel::Trace);
        let matching: Vec<_> = config
            .module_filters
            .iter()
            .filter(|(m, _)| m == "progression_core")
            .collect();
        assert_eq!(matching.len(), 1);
        assert!(config.to_env_filter_string().contains("progression_core=trace"));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = TracingConfig::default();
        assert_eq!(TracingConfig::from_json(&config.to_json()), Some(config));
        assert_eq!(TracingConfig::from_json("not json"), None);
    }

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing_default();
        init_tracing(&TracingConfig::default());
    }

    #[test]
    fn test_timing_span() {
        init_tracing_default();
        let timing = TimingSpan::new("apply_progress", "char-1");
        timing.span().in_scope(|| tracing::info!("inside"));
        let _ = timing.elapsed_micros();
    }
}
