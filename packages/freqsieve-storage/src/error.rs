//! Error types for freqsieve-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O errors
    Io,
    /// Serialization/deserialization errors
    Serialization,
    /// Checkpoint unreadable, truncated or of an unknown schema
    CheckpointCorrupt,
    /// Checkpoint belongs to a different (target, block_size, partitions)
    CheckpointMismatch,
    /// Atomic replace still denied after every retry
    RetryExhausted,
    /// Archive bundling errors
    Archive,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
            ErrorKind::CheckpointCorrupt => "checkpoint_corrupt",
            ErrorKind::CheckpointMismatch => "checkpoint_mismatch",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::Archive => "archive",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn checkpoint_corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CheckpointCorrupt, message)
    }

    pub fn checkpoint_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CheckpointMismatch, message)
    }

    pub fn retry_exhausted(path: impl fmt::Display, attempts: u32) -> Self {
        Self::new(
            ErrorKind::RetryExhausted,
            format!("Replacing {} still denied after {} attempts", path, attempts),
        )
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Archive, message)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::io(format!("I/O error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
