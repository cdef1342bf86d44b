// ABOUTME: Phased bootstrap of circularly dependent services.
// ABOUTME: Exports phases, the orchestrator state machine, and the shared verification logic.

mod error;
mod orchestrator;
mod phase;
mod recovery;
mod verify;

pub use error::{BootstrapError, BootstrapErrorKind};
pub use orchestrator::{AbortSignal, BootstrapOrchestrator, BootstrapStatus, PhaseProgress, RunOutcome};
pub use phase::{Phase, PhaseKind, PhaseStatus, RecoveryStrategy};
pub use verify::{run_phase_cycle, verify_with_retry};
