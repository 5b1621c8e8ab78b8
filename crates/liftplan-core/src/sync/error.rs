//! Sync error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::catalog::ResolutionError;
use crate::plan::{EntityKind, PlanError};

/// Save-time validation failure; blocks the save before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {id}: {message}")]
pub struct ValidationError {
    pub kind: EntityKind,
    pub id: String,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(kind: EntityKind, id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.to_string(),
            message: message.into(),
        }
    }
}

/// Sync engine error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Tree failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Server revision differs from the one this editor last saw
    #[error("conflict: {message} (server updated at {server_time})")]
    Conflict {
        message: String,
        server_time: DateTime<Utc>,
    },

    /// Persistence call failed or the server rejected the payload
    #[error("transport error: {0}")]
    Transport(String),

    /// Inline description did not match the catalog
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Another save is already running
    #[error("a save is already in flight")]
    SaveInFlight,

    /// A conflict must be resolved by reloading before saving again
    #[error("conflict pending, reload from server first")]
    ConflictPending,

    /// Tree operation failed
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The editor worker task is gone
    #[error("editor worker has stopped")]
    WorkerStopped,
}

impl SyncError {
    /// Whether retrying the same save could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::SaveInFlight)
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Transport(format!("{:#}", err))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
