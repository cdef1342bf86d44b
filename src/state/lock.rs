// ABOUTME: Per-environment exclusive lease lock for checkpoint and rollback operations.
// ABOUTME: Uses atomic file creation with holder info; abandoned leases are broken after expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Environment;

/// Information about who holds an environment lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Environment being operated on.
    pub environment: String,
    /// Operation holding the lock (`checkpoint`, `rollback`, ...).
    pub operation: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(environment: &Environment, operation: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment: environment.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Check if the lease has run out.
    pub fn is_expired(&self, lease: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().map(|age| age >= lease).unwrap_or(false)
    }

    /// Path to the lock file for an environment.
    pub fn lock_path(locks_dir: &Path, environment: &Environment) -> PathBuf {
        locks_dir.join(format!("{environment}.lock"))
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {} held by {} (pid {}) since {}",
            self.operation, self.environment, self.holder, self.pid, self.started_at
        )
    }
}

/// Errors from lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("operation already in progress: {0}")]
    Held(Box<LockInfo>),

    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    /// Holder details when the lock is contended.
    pub fn holder(&self) -> Option<&LockInfo> {
        match self {
            LockError::Held(info) => Some(info),
            LockError::Io { .. } => None,
        }
    }
}

/// A held environment lock that releases on drop.
#[derive(Debug)]
pub struct EnvironmentLock {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl EnvironmentLock {
    /// Acquire the lock for `environment`.
    ///
    /// Creation uses `create_new`, so two contenders can never both succeed.
    /// Expired or unreadable lock files are broken with a warning.
    pub fn acquire(
        locks_dir: &Path,
        environment: &Environment,
        operation: &str,
        lease: Duration,
    ) -> Result<Self, LockError> {
        let path = LockInfo::lock_path(locks_dir, environment);
        let info = LockInfo::new(environment, operation);

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path, info));
        }

        if !Self::should_break(&path, lease)? {
            return Err(Self::held_error(&path));
        }

        tracing::debug!("Removing abandoned lock at {}", path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path, source }),
        }

        if Self::try_create(&path, &info)? {
            Ok(Self::held(path, info))
        } else {
            // Someone else won the race after the break.
            Err(Self::held_error(&path))
        }
    }

    fn held(path: PathBuf, info: LockInfo) -> Self {
        tracing::debug!(operation = %info.operation, environment = %info.environment, "lock acquired");
        Self {
            path,
            info,
            released: false,
        }
    }

    /// Atomically create the lock file. Returns `false` if it already exists.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_err(e)),
        };

        let json = serde_json::to_vec(info).map_err(|e| io_err(std::io::Error::other(e)))?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(true)
    }

    /// Check if an existing lock should be broken (expired or corrupted).
    fn should_break(path: &Path, lease: Duration) -> Result<bool, LockError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            // Released between our create attempt and this read.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(source) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match serde_json::from_slice::<LockInfo>(&content) {
            Ok(existing) if existing.is_expired(lease) => {
                tracing::warn!(
                    "Breaking expired lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(_) => {
                tracing::warn!("Lock info corrupted, breaking lock");
                Ok(true)
            }
        }
    }

    fn held_error(path: &Path) -> LockError {
        let info = std::fs::read(path)
            .ok()
            .and_then(|content| serde_json::from_slice::<LockInfo>(&content).ok())
            .unwrap_or_else(|| LockInfo {
                holder: "unknown".to_string(),
                pid: 0,
                started_at: Utc::now(),
                environment: String::new(),
                operation: "operation".to_string(),
            });
        LockError::Held(Box::new(info))
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock explicitly.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for EnvironmentLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
