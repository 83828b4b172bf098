// error.rs
use thiserror::Error;

/// Errors surfaced to the user by the session components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),
}

/// Why a remote fetch produced nothing usable.
///
/// The `Display` form is exactly the text shown in the refresh error banner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No internet connection")]
    NoConnectivity,

    #[error("Server error: {0}")]
    Server(u16),

    #[error("Network error: {0}")]
    Other(String),
}

/// A reminder that could not be registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRejected {
    #[error("could not parse reminder time: {0}")]
    Parse(String),

    #[error("reminder time is not in the future")]
    PastTime,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No home directory available for config and data files")]
    NoProjectDirs,
}
