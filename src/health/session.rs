// ABOUTME: Termination condition for a monitoring session.
// ABOUTME: The shipped implementation watches one deployment record in the tracker.

use async_trait::async_trait;

use crate::tracker::DeploymentStateTracker;
use crate::types::DeploymentId;

#[async_trait]
pub trait SessionState: Send + Sync {
    /// `true` once monitoring should stop.
    async fn is_terminal(&self) -> bool;
}

/// Session bound to a tracked deployment; ends when the record is terminal.
#[derive(Debug, Clone)]
pub struct DeploymentSession {
    tracker: DeploymentStateTracker,
    deployment: DeploymentId,
}

impl DeploymentSession {
    pub fn new(tracker: DeploymentStateTracker, deployment: DeploymentId) -> Self {
        Self {
            tracker,
            deployment,
        }
    }
}

#[async_trait]
impl SessionState for DeploymentSession {
    async fn is_terminal(&self) -> bool {
        match self.tracker.is_terminal(&self.deployment) {
            Ok(terminal) => terminal,
            Err(e) => {
                tracing::warn!(deployment = %self.deployment, error = %e, "cannot read deployment state");
                false
            }
        }
    }
}
