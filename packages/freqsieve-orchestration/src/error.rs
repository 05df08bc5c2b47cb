use freqsieve_core::config::ConfigError;
use freqsieve_core::CoreError;
use freqsieve_storage::{ErrorKind, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Block scan task failed: {0}")]
    TaskJoin(String),
}

impl From<ConfigError> for OrchestratorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl OrchestratorError {
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Retry classification of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Config(_)
            | OrchestratorError::Core(_)
            | OrchestratorError::InvalidStateTransition { .. } => ErrorCategory::Permanent,
            OrchestratorError::Storage(err) => match err.kind {
                ErrorKind::RetryExhausted => ErrorCategory::Transient,
                ErrorKind::Io | ErrorKind::Archive => ErrorCategory::Infrastructure,
                ErrorKind::CheckpointCorrupt
                | ErrorKind::CheckpointMismatch
                | ErrorKind::Serialization => ErrorCategory::Permanent,
            },
            OrchestratorError::TaskJoin(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Name of the invariant whose violation aborted the run
    pub fn failed_invariant(&self) -> &'static str {
        match self {
            OrchestratorError::Config(_) => "configuration",
            OrchestratorError::Core(err) if err.is_configuration() => "configuration",
            OrchestratorError::Core(_) => "predicate precondition",
            OrchestratorError::Storage(err) => match err.kind {
                ErrorKind::CheckpointMismatch => "checkpoint mismatch",
                ErrorKind::CheckpointCorrupt => "checkpoint corruption",
                _ => "storage",
            },
            OrchestratorError::InvalidStateTransition { .. } => "state machine",
            OrchestratorError::TaskJoin(_) => "block scan",
        }
    }
}

/// Error category for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Transient error - rerun the partition later (e.g., replace denied)
    Transient,
    /// Permanent error - don't retry (e.g., mismatched checkpoint, bad target)
    Permanent,
    /// Infrastructure error - alert ops (e.g., disk full)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
