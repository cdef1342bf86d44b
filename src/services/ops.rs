// ABOUTME: The narrow interface through which managed services are driven.
// ABOUTME: start/stop/health plus optional consistent snapshots and recovery hooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ServiceError;
use crate::bootstrap::RecoveryStrategy;
use crate::types::ServiceName;

/// How a service is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMode {
    /// Start without the usual dependencies (first boot of a dependency cycle).
    Standalone,
    /// Start with every dependency wired in.
    #[default]
    Integrated,
}

impl fmt::Display for BootstrapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapMode::Standalone => write!(f, "standalone"),
            BootstrapMode::Integrated => write!(f, "integrated"),
        }
    }
}

/// Lifecycle operations on one managed service.
#[async_trait]
pub trait ServiceOps: Send + Sync {
    /// Name of the service this collaborator drives.
    fn name(&self) -> &ServiceName;

    /// Start (or restart) the service in the given mode.
    async fn start(&self, mode: BootstrapMode) -> Result<(), ServiceError>;

    /// Stop the service.
    async fn stop(&self) -> Result<(), ServiceError>;

    /// Single health probe. Errors count as unhealthy.
    async fn health_check(&self) -> bool;

    /// Whether [`ServiceOps::snapshot`] is available.
    fn supports_snapshot(&self) -> bool {
        false
    }

    /// Export a consistent snapshot of the service's state.
    async fn snapshot(&self) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::SnapshotUnsupported {
            service: self.name().to_string(),
        })
    }

    /// Restore state from a blob produced by [`ServiceOps::snapshot`].
    async fn restore_snapshot(&self, _blob: &[u8]) -> Result<(), ServiceError> {
        Err(ServiceError::SnapshotUnsupported {
            service: self.name().to_string(),
        })
    }

    /// Service-specific recovery. Returns `false` when the built-in
    /// behavior of `strategy` should run instead.
    async fn recover(&self, _strategy: RecoveryStrategy) -> Result<bool, ServiceError> {
        Ok(false)
    }
}
