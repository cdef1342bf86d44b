// ABOUTME: Single repository for all durable control-plane state.
// ABOUTME: Owns the state directory layout, phase markers, and environment lease locks.

mod fsync;
mod lock;
mod markers;

pub use fsync::{fsync_dir, write_json_atomic};
pub use lock::{EnvironmentLock, LockError, LockInfo};
pub use markers::{MarkerStore, PhaseMarkerRecord};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Environment;

const CHECKPOINTS_DIR: &str = "checkpoints";
const MARKERS_DIR: &str = "markers";
const LOCKS_DIR: &str = "locks";
const DEPLOYMENTS_LOG: &str = "deployments.jsonl";

/// Errors from the state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem-backed state store rooted at `state_dir`.
///
/// Layout:
/// ```text
/// checkpoints/<id>/manifest.json
/// markers/<phase-id>.json
/// deployments.jsonl
/// locks/<environment>.lock
/// ```
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Open (and create if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StateError> {
        let root = root.into();
        for dir in [CHECKPOINTS_DIR, MARKERS_DIR, LOCKS_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| StateError::io(&path, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }

    pub fn deployments_log(&self) -> PathBuf {
        self.root.join(DEPLOYMENTS_LOG)
    }

    pub fn markers(&self) -> MarkerStore {
        MarkerStore::new(self.root.join(MARKERS_DIR))
    }

    /// Take the exclusive lease for `environment`.
    ///
    /// Fails with [`LockError::Held`] while another live holder owns it.
    pub fn lock(
        &self,
        environment: &Environment,
        operation: &str,
        lease: Duration,
    ) -> Result<EnvironmentLock, LockError> {
        EnvironmentLock::acquire(&self.root.join(LOCKS_DIR), environment, operation, lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state")).unwrap();

        assert!(store.checkpoints_dir().is_dir());
        assert!(store.root().join("markers").is_dir());
        assert!(store.root().join("locks").is_dir());
        assert_eq!(
            store.deployments_log(),
            dir.path().join("state").join("deployments.jsonl")
        );
    }
}
