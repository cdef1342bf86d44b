// ABOUTME: Service collaborator contract and its implementations.
// ABOUTME: Exports ServiceOps, the name-keyed registry, and the shell-command collaborator.

mod command;
mod error;
mod ops;
mod probe;
mod registry;

pub use command::CommandService;
pub use error::ServiceError;
pub use ops::{BootstrapMode, ServiceOps};
pub use probe::{ProbeResult, http_probe};
pub use registry::ServiceRegistry;
