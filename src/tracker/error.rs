// ABOUTME: Error types for deployment state tracking.
// ABOUTME: Invalid transitions carry both states so callers can report them precisely.

use std::path::PathBuf;

use super::record::DeploymentStatus;
use crate::state::StateError;
use crate::types::DeploymentId;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("deployment {0} is already tracked")]
    Duplicate(DeploymentId),

    #[error("deployment {0} not found")]
    NotFound(DeploymentId),

    #[error("deployment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("corrupt deployment log {} at line {line}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unreadable state export {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported state export version {0}")]
    UnsupportedVersion(u32),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

impl TrackerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackerError::Io {
            path: path.into(),
            source,
        }
    }
}
