// ABOUTME: Restores a verified checkpoint and brings services back through the bootstrap phases.
// ABOUTME: Serialized per environment by the lease lock; advertises itself through a shared flag.

mod engine;
mod error;
mod flag;
mod trigger;

pub use engine::{DeploymentRollback, RollbackEngine, RollbackOutcome};
pub use error::{RollbackError, RollbackErrorKind};
pub use flag::{RollbackFlag, RollbackGuard};
pub use trigger::RollbackTrigger;
