// ABOUTME: Post-deployment health monitoring with sustained-failure rollback.
// ABOUTME: Probes run concurrently each tick; counters reset on any success.

mod counters;
mod error;
mod monitor;
mod session;

pub use counters::{FailureCounters, HealthSample};
pub use error::MonitorError;
pub use monitor::{HealthMonitor, MonitorReport, MonitorTarget, StopReason};
pub use session::{DeploymentSession, SessionState};
