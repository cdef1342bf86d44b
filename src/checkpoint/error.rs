// ABOUTME: Error types for checkpoint creation, verification, and restore.
// ABOUTME: Corrupt checkpoints are distinguished so rollback selection can skip them.

use std::path::PathBuf;

use crate::services::ServiceError;
use crate::state::{LockError, StateError};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error("invalid checkpoint name '{0}'")]
    InvalidName(String),

    /// Stored payloads no longer match the manifest.
    #[error("checkpoint {id} is corrupt: {}", .failed.join(", "))]
    Corrupt { id: String, failed: Vec<String> },

    #[error("component '{name}' not found at {}", .path.display())]
    MissingComponent { name: String, path: PathBuf },

    #[error("component '{name}' is not in checkpoint {id}")]
    UnknownComponent { id: String, name: String },

    #[error("checkpoint creation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("restored component '{name}' does not match its checksum")]
    RestoreMismatch { name: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorKind {
    NotFound,
    Corrupt,
    LockContention,
    Timeout,
    Component,
    Io,
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> CheckpointErrorKind {
        match self {
            CheckpointError::NotFound(_) | CheckpointError::InvalidName(_) => {
                CheckpointErrorKind::NotFound
            }
            CheckpointError::Corrupt { .. }
            | CheckpointError::Manifest { .. }
            | CheckpointError::RestoreMismatch { .. } => CheckpointErrorKind::Corrupt,
            CheckpointError::Lock(LockError::Held(_)) => CheckpointErrorKind::LockContention,
            CheckpointError::Timeout { .. } => CheckpointErrorKind::Timeout,
            CheckpointError::MissingComponent { .. }
            | CheckpointError::UnknownComponent { .. }
            | CheckpointError::Service(_) => CheckpointErrorKind::Component,
            CheckpointError::Io { .. } | CheckpointError::Lock(_) | CheckpointError::State(_) => {
                CheckpointErrorKind::Io
            }
        }
    }
}
