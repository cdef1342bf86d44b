// ABOUTME: Deployment attempt records with monotonic status transitions.
// ABOUTME: Backed by an append-only JSON Lines log under the state directory.

mod deployments;
mod error;
mod export;
mod log;
mod record;

pub use deployments::{DeploymentStateTracker, History};
pub use error::TrackerError;
pub use export::{ImportSummary, StateExport};
pub use record::{DeploymentRecord, DeploymentStatus};
