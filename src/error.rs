//! Error types for the schedule store, the sync queue and the command layer.

use serde::Serialize;

use crate::domain::models::UnknownCode;
use crate::domain::mutation::{MutationStatus, Sequence};

/// Failures of the local schedule store.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Unknown person code on read, update or delete.
    #[error("person `{0}` not found")]
    NotFound(String),

    /// Malformed create/update input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored row that no longer maps onto the domain alphabets.
    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    /// Underlying persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The mutation recording a local write could not be appended; the
    /// write was rolled back with it.
    #[error("mutation log error: {0}")]
    Journal(#[from] SyncError),
}

impl ScheduleError {
    /// Storage-level failures abort a whole batch; the others only fail one row.
    pub fn is_storage(&self) -> bool {
        matches!(self, ScheduleError::Storage(_) | ScheduleError::Journal(_))
    }
}

impl From<UnknownCode> for ScheduleError {
    fn from(e: UnknownCode) -> Self {
        ScheduleError::InvalidRow(e.to_string())
    }
}

/// Failures of the durable mutation log itself. Remote delivery failures are
/// not errors of the queue; they are reported by `drain`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("mutation #{sequence} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        sequence: Sequence,
        from: MutationStatus,
        to: MutationStatus,
    },

    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

impl From<UnknownCode> for SyncError {
    fn from(e: UnknownCode) -> Self {
        SyncError::InvalidRow(e.to_string())
    }
}

/// Failures reported by the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RemoteError {
    /// Network level failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Remote is up but temporarily unable to accept (5xx, 408, 429).
    #[error("remote unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Remote refused the payload as invalid. Retrying will not help.
    #[error("remote rejected payload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }
}

/// Configuration loading / saving errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level error of the command layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database setup failed: {0}")]
    Database(String),
}

/// Convenience result type for the command layer.
pub type Result<T> = std::result::Result<T, AppError>;
