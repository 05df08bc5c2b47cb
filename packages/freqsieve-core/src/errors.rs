//! Error types for freqsieve-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Target could not be parsed or is out of domain
    #[error("Invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    /// Partition count / id / block size rejected
    #[error("Invalid partitioning: {0}")]
    InvalidPartitioning(String),

    /// Predicate called on a target it is not defined for
    #[error("Predicate precondition violated: {0}")]
    PreconditionViolated(String),

    /// Worker pool could not be built
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl CoreError {
    pub fn invalid_target(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn partitioning<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidPartitioning(e.to_string())
    }

    /// True for errors caused by user-supplied job parameters
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTarget { .. } | CoreError::InvalidPartitioning(_)
        )
    }
}

/// Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;
