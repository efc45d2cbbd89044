/*!
Error types for the Tabkeep core.

Two families live here. [`TabkeepError`] covers infrastructure failures
(I/O, JSON, store access, configuration) and is what `Result` carries.
[`ValidationError`] and [`SyncError`] are recorded values: registry and
persistence operations append them to a readable list and signal failure
through their return value instead of propagating an error.
*/

use crate::tab::Tab;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Result type used throughout the Tabkeep core.
pub type Result<T> = std::result::Result<T, TabkeepError>;

/// Upper bound on recorded validation and sync errors; oldest are dropped first.
pub const MAX_RECORDED_ERRORS: usize = 100;

/// Errors that can occur while talking to stores, files and configuration.
#[derive(Error, Debug)]
pub enum TabkeepError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key-value store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored data does not have the snapshot shape
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging or metrics setup failures
    #[error("Observability error: {0}")]
    Observability(String),
}

impl TabkeepError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

/// Kind of a rejected registry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingTitle,
    InvalidRoute,
    Duplicate,
    MaxTabsExceeded,
    NotFound,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::InvalidRoute => "invalid_route",
            Self::Duplicate => "duplicate",
            Self::MaxTabsExceeded => "max_tabs_exceeded",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry operation that was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
    pub message: String,
    /// The entry that caused the rejection, when there is one
    pub offending: Option<Tab>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationError {
    pub fn new<S: Into<String>>(
        kind: ValidationErrorKind,
        message: S,
        offending: Option<Tab>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            offending,
            timestamp,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Which persistence step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    Save,
    Load,
    Clear,
    Remove,
}

/// A persistence failure caught at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failed at {}: {}", self.kind, self.timestamp, self.message)
    }
}

/// Append to a bounded error log, dropping the oldest entry when full.
pub(crate) fn push_bounded<T>(log: &mut VecDeque<T>, item: T) {
    if log.len() >= MAX_RECORDED_ERRORS {
        log.pop_front();
    }
    log.push_back(item);
}
