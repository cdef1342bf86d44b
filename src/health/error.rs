// ABOUTME: Error types for health monitoring sessions.
// ABOUTME: Rollback failures are reported in the session report, not here.

use crate::tracker::TrackerError;
use crate::types::ServiceName;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("no services to monitor")]
    NoTargets,

    #[error("no collaborator registered for service {0}")]
    UnknownService(ServiceName),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
