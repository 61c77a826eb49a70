//! Error taxonomy for tracker operations
//!
//! Validation and not-found conditions are always surfaced to the caller.
//! Corrupt storage files never show up here: the record store recovers them
//! locally and logs a warning instead.

use thiserror::Error;

/// Error type for tracker operations
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A value outside its enumerated set, or a missing required field.
    /// Rejected before anything is written.
    #[error("{0}")]
    Validation(String),

    /// An unknown session id was referenced
    #[error("No session with ID: {0}")]
    NotFound(String),

    /// The operation is not allowed in the session's current state
    #[error("{0}")]
    StateViolation(String),

    /// Reading or writing a storage file failed
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A collection could not be serialized for writing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Stable machine-readable label for transports
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::Validation(_) => "validation_error",
            TrackerError::NotFound(_) => "not_found",
            TrackerError::StateViolation(_) => "state_violation",
            TrackerError::Io(_) | TrackerError::Serialization(_) => "storage_error",
            TrackerError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
