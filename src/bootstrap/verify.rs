// ABOUTME: Bounded-retry health verification shared by bootstrap and rollback.
// ABOUTME: Each probe is time-boxed; failed probes back off exponentially up to a cap.

use crate::config::RetryPolicy;
use crate::services::ServiceOps;

use super::error::BootstrapError;
use super::phase::Phase;

/// Probe `service` until it reports healthy or the policy's attempts run out.
///
/// Returns the 1-based attempt that succeeded, or the number of attempts made.
pub async fn verify_with_retry(service: &dyn ServiceOps, policy: &RetryPolicy) -> Result<u32, u32> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let healthy = tokio::time::timeout(policy.attempt_timeout, service.health_check())
            .await
            .unwrap_or(false);

        if healthy {
            tracing::debug!(service = %service.name(), attempt, "health check passed");
            return Ok(attempt);
        }

        tracing::debug!(service = %service.name(), attempt, attempts, "health check failed");
        if attempt < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(attempts)
}

/// One full cycle of a phase: run its action, then verify with retries.
pub async fn run_phase_cycle(
    phase: &Phase,
    service: &dyn ServiceOps,
    policy: &RetryPolicy,
) -> Result<u32, BootstrapError> {
    service
        .start(phase.mode)
        .await
        .map_err(|source| BootstrapError::PhaseExecution {
            phase: phase.id.clone(),
            source,
        })?;

    verify_with_retry(service, policy)
        .await
        .map_err(|attempts| BootstrapError::VerificationTimeout {
            phase: phase.id.clone(),
            service: phase.service.clone(),
            attempts,
        })
}
