// ABOUTME: Error types for bootstrap phase execution.
// ABOUTME: Covers action failures, verification timeouts, and halted runs.

use crate::services::ServiceError;
use crate::state::StateError;
use crate::types::{PhaseId, ServiceName};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The phase action (service start) failed.
    #[error("phase {phase}: action failed: {source}")]
    PhaseExecution {
        phase: PhaseId,
        #[source]
        source: ServiceError,
    },

    /// Health verification did not pass within the retry budget.
    #[error("phase {phase}: {service} not healthy after {attempts} attempt(s)")]
    VerificationTimeout {
        phase: PhaseId,
        service: ServiceName,
        attempts: u32,
    },

    /// The phase failed, was recovered, and failed again. The run halted.
    #[error("bootstrap halted at phase {phase}: {last_error}")]
    BootstrapFailed { phase: PhaseId, last_error: String },

    /// A phase names a service without a registered collaborator.
    #[error("no collaborator registered for service {0}")]
    UnknownService(ServiceName),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapErrorKind {
    PhaseExecution,
    VerificationTimeout,
    Halted,
    Configuration,
    State,
}

impl BootstrapError {
    pub fn kind(&self) -> BootstrapErrorKind {
        match self {
            BootstrapError::PhaseExecution { .. } => BootstrapErrorKind::PhaseExecution,
            BootstrapError::VerificationTimeout { .. } => BootstrapErrorKind::VerificationTimeout,
            BootstrapError::BootstrapFailed { .. } => BootstrapErrorKind::Halted,
            BootstrapError::UnknownService(_) => BootstrapErrorKind::Configuration,
            BootstrapError::State(_) => BootstrapErrorKind::State,
        }
    }
}
