use thiserror::Error;

use crate::types::{Field, Stage};

#[derive(Debug, Error)]
pub enum TriageError {
    // Collaborator errors (caught inside stages, never fatal on their own)
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    // Engine errors
    #[error("Stage contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Stage not registered: {0}")]
    StageNotRegistered(Stage),

    #[error("Runtime error: {0}")]
    Runtime(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of an external collaborator call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("{collaborator} transient failure: {message}")]
    Transient {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} returned malformed output: {message}")]
    Malformed {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} timed out after {timeout_secs}s")]
    Timeout {
        collaborator: String,
        timeout_secs: u64,
    },
}

impl CollaboratorError {
    pub fn transient(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn malformed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A stage broke the state ownership rules. Always fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContractViolation {
    #[error("{stage} wrote {field}, which is outside its write-set")]
    WriteOutsideWriteSet { stage: Stage, field: Field },

    #[error("{stage} wrote engine-owned field {field}")]
    EngineOwnedField { stage: Stage, field: Field },

    #[error("{stage} wrote {field}, which is already set")]
    DuplicateWrite { stage: Stage, field: Field },

    #[error("{stage} decreased retry_count from {from} to {to}")]
    RetryCountDecreased { stage: Stage, from: u32, to: u32 },
}

impl ContractViolation {
    /// The offending stage.
    pub fn stage(&self) -> Stage {
        match self {
            Self::WriteOutsideWriteSet { stage, .. }
            | Self::EngineOwnedField { stage, .. }
            | Self::DuplicateWrite { stage, .. }
            | Self::RetryCountDecreased { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_message() {
        let err = TriageError::from(ContractViolation::WriteOutsideWriteSet {
            stage: Stage::Coordinator,
            field: Field::Decision,
        });
        assert_eq!(
            err.to_string(),
            "Stage contract violation: coordinator wrote decision, which is outside its write-set"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = CollaboratorError::Timeout {
            collaborator: "knowledge_searcher".into(),
            timeout_secs: 5,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "knowledge_searcher timed out after 5s");
    }
}
