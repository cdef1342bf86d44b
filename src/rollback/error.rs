// ABOUTME: Error types for rollback operations.
// ABOUTME: A failed restore names the last component that was restored successfully.

use crate::bootstrap::BootstrapError;
use crate::checkpoint::CheckpointError;
use crate::services::ServiceError;
use crate::state::{LockError, LockInfo};
use crate::tracker::TrackerError;
use crate::types::{CheckpointId, DeploymentId, PhaseId, ServiceName};

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("rollback lock contended: {0}")]
    LockContention(Box<LockInfo>),

    /// Verification failed; nothing was stopped or restored.
    #[error("checkpoint {id} failed verification: {}", .failed.join(", "))]
    CheckpointCorrupt { id: CheckpointId, failed: Vec<String> },

    #[error("no verified checkpoint available")]
    NoVerifiedCheckpoint,

    #[error("no successful deployment recorded")]
    NoSuccessfulDeployment,

    #[error("deployment {0} has no checkpoint")]
    NoCheckpoint(DeploymentId),

    #[error("failed to stop {service}: {source}")]
    Stop {
        service: ServiceName,
        #[source]
        source: ServiceError,
    },

    /// A component restore failed; services were left stopped.
    #[error(
        "restore of '{component}' failed (last restored: {}): {reason}",
        .last_restored.as_deref().unwrap_or("none")
    )]
    RollbackFailed {
        last_restored: Option<String>,
        component: String,
        reason: String,
    },

    #[error("restart failed at phase {phase}: {source}")]
    RestartFailed {
        phase: PhaseId,
        #[source]
        source: BootstrapError,
    },

    #[error("no collaborator registered for service {0}")]
    UnknownService(ServiceName),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Lock(LockError),
}

impl From<LockError> for RollbackError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held(info) => RollbackError::LockContention(info),
            other => RollbackError::Lock(other),
        }
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackErrorKind {
    LockContention,
    Corrupt,
    NoTarget,
    StopFailed,
    RestoreFailed,
    RestartFailed,
    Other,
}

impl RollbackError {
    pub fn kind(&self) -> RollbackErrorKind {
        match self {
            RollbackError::LockContention(_) => RollbackErrorKind::LockContention,
            RollbackError::CheckpointCorrupt { .. } => RollbackErrorKind::Corrupt,
            RollbackError::NoVerifiedCheckpoint
            | RollbackError::NoSuccessfulDeployment
            | RollbackError::NoCheckpoint(_) => RollbackErrorKind::NoTarget,
            RollbackError::Stop { .. } => RollbackErrorKind::StopFailed,
            RollbackError::RollbackFailed { .. } => RollbackErrorKind::RestoreFailed,
            RollbackError::RestartFailed { .. } => RollbackErrorKind::RestartFailed,
            RollbackError::Checkpoint(e) => match e.kind() {
                crate::checkpoint::CheckpointErrorKind::NotFound => RollbackErrorKind::NoTarget,
                crate::checkpoint::CheckpointErrorKind::Corrupt => RollbackErrorKind::Corrupt,
                _ => RollbackErrorKind::Other,
            },
            RollbackError::UnknownService(_)
            | RollbackError::Tracker(_)
            | RollbackError::Lock(_) => RollbackErrorKind::Other,
        }
    }
}
