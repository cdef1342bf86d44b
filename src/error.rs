// ABOUTME: Application-wide error type for keystone.
// ABOUTME: Wraps every module error and maps it to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::bootstrap::{BootstrapError, BootstrapErrorKind};
use crate::checkpoint::{CheckpointError, CheckpointErrorKind};
use crate::health::MonitorError;
use crate::planner::PlanningError;
use crate::rollback::{RollbackError, RollbackErrorKind};
use crate::state::{LockError, StateError};
use crate::tracker::TrackerError;

/// Exit code for generic failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for checkpoint or health verification failures.
pub const EXIT_VERIFICATION: i32 = 2;
/// Exit code when another operation holds the environment lock.
pub const EXIT_LOCK_CONTENTION: i32 = 3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("checkpoint {0} failed verification")]
    VerificationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl Error {
    /// Process exit code: 2 for verification failures, 3 for lock
    /// contention, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::VerificationFailed(_) => EXIT_VERIFICATION,
            Error::Bootstrap(e) if e.kind() == BootstrapErrorKind::VerificationTimeout => {
                EXIT_VERIFICATION
            }
            Error::Checkpoint(e) => match e.kind() {
                CheckpointErrorKind::Corrupt => EXIT_VERIFICATION,
                CheckpointErrorKind::LockContention => EXIT_LOCK_CONTENTION,
                _ => EXIT_FAILURE,
            },
            Error::Rollback(e) => match e.kind() {
                RollbackErrorKind::Corrupt => EXIT_VERIFICATION,
                RollbackErrorKind::LockContention => EXIT_LOCK_CONTENTION,
                _ => EXIT_FAILURE,
            },
            Error::Lock(LockError::Held(_)) => EXIT_LOCK_CONTENTION,
            _ => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LockInfo;
    use crate::types::{CheckpointId, Environment};

    #[test]
    fn exit_codes_follow_error_class() {
        let corrupt = Error::Rollback(RollbackError::CheckpointCorrupt {
            id: CheckpointId::new("pre-1"),
            failed: vec!["vault-data".to_string()],
        });
        assert_eq!(corrupt.exit_code(), EXIT_VERIFICATION);

        let held = LockInfo::new(&Environment::default(), "rollback");
        let contended = Error::Rollback(RollbackError::LockContention(Box::new(held.clone())));
        assert_eq!(contended.exit_code(), EXIT_LOCK_CONTENTION);

        let checkpoint_contended =
            Error::Checkpoint(CheckpointError::Lock(LockError::Held(Box::new(held))));
        assert_eq!(checkpoint_contended.exit_code(), EXIT_LOCK_CONTENTION);

        assert_eq!(
            Error::InvalidConfig("x".to_string()).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            Error::VerificationFailed("pre-1".to_string()).exit_code(),
            EXIT_VERIFICATION
        );
    }
}
