// ABOUTME: Recovery strategies applied once when a phase exhausts its retries.
// ABOUTME: Dispatches on the RecoveryStrategy enum; services may supply their own hook.

use crate::services::{BootstrapMode, ServiceOps};
use crate::state::MarkerStore;

use super::error::BootstrapError;
use super::phase::{Phase, RecoveryStrategy};

/// Apply `phase.recovery` to the phase's service.
///
/// `plan` is the full phase list; `Reinitialize` drops the markers of every
/// phase belonging to the same service.
pub(super) async fn apply_recovery(
    phase: &Phase,
    service: &dyn ServiceOps,
    markers: &MarkerStore,
    plan: &[Phase],
) -> Result<(), BootstrapError> {
    let strategy = phase.recovery;
    let action_err = |source| BootstrapError::PhaseExecution {
        phase: phase.id.clone(),
        source,
    };

    if service.recover(strategy).await.map_err(action_err)? {
        return Ok(());
    }

    match strategy {
        RecoveryStrategy::RestartClean => {
            service.stop().await.map_err(action_err)?;
        }
        RecoveryStrategy::Reinitialize => {
            service.stop().await.map_err(action_err)?;
            for p in plan.iter().filter(|p| p.service == phase.service) {
                markers.remove(&p.id)?;
            }
        }
        RecoveryStrategy::ResetIntegration => {
            service.stop().await.map_err(action_err)?;
            service
                .start(BootstrapMode::Standalone)
                .await
                .map_err(action_err)?;
        }
        RecoveryStrategy::Redeploy => {
            service.stop().await.map_err(action_err)?;
            service.start(phase.mode).await.map_err(action_err)?;
        }
    }

    Ok(())
}
