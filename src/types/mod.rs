// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod environment;
mod id;
mod service_name;

pub use environment::{Environment, EnvironmentError};
pub use id::{CheckpointId, DeploymentId, Id, PhaseId, RunId};
pub use service_name::{ServiceName, ServiceNameError};
