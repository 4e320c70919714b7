//! Error taxonomy for the progression engine.
//!
//! Every fallible engine operation returns `Result<T, ProgressionError>`.
//! Nothing in the engine panics on these; the transport turns them into
//! `{ success: false, error }` payloads via [`Failure`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a state transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// At least one objective is below its required count
    ObjectivesIncomplete,
    /// The instance has not reached `completed`
    NotCompleted,
    /// The owning event is outside its window or switched off
    EventNotActive,
}

impl Precondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precondition::ObjectivesIncomplete => "objectives incomplete",
            Precondition::NotCompleted => "not completed",
            Precondition::EventNotActive => "event not active",
        }
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("already assigned: {0}")]
    AlreadyExists(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("reward already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("malformed data: {0}")]
    Malformed(String),
}

impl ProgressionError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ProgressionError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            ProgressionError::NotFound { .. } => "not_found",
            ProgressionError::AlreadyExists(_) => "already_exists",
            ProgressionError::PreconditionFailed(_) => "precondition_failed",
            ProgressionError::AlreadyClaimed(_) => "already_claimed",
            ProgressionError::Unavailable(_) => "unavailable",
            ProgressionError::Malformed(_) => "malformed",
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            success: false,
            code: self.code().to_string(),
            error: self.to_string(),
        }
    }
}

/// Client-facing failure payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub code: String,
    pub error: String,
}

pub type ProgressionResult<T> = Result<T, ProgressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProgressionError::not_found("quest template", "nope");
        assert_eq!(err.to_string(), "quest template not found: nope");
        assert_eq!(err.code(), "not_found");

        let err = ProgressionError::PreconditionFailed(Precondition::ObjectivesIncomplete);
        assert_eq!(err.to_string(), "precondition failed: objectives incomplete");
    }

    #[test]
    fn test_failure_payload() {
        let failure = ProgressionError::AlreadyClaimed("daily-coins-2026-10-19".into()).to_failure();
        assert!(!failure.success);
        assert_eq!(failure.code, "already_claimed");
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"success\":false"));
    }
}
