// ABOUTME: Rollback command implementations.
// ABOUTME: Manual rollback to a named checkpoint or the last good deployment, and automatic rollback.

use keystone::ControlPlane;
use keystone::error::Result;
use keystone::output::Output;
use keystone::rollback::RollbackOutcome;

/// Roll back to `target`, or to the last successful deployment's checkpoint.
pub async fn rollback(
    plane: &ControlPlane,
    target: Option<&str>,
    reason: &str,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let outcome = match target {
        Some(reference) => {
            output.progress(&format!("Rolling back to {reference}"));
            plane.rollback().manual_rollback(reference, reason).await?
        }
        None => {
            output.progress("Rolling back to the last successful deployment");
            plane.rollback().rollback_to_last_successful(reason).await?
        }
    };
    report(&outcome, &output);
    Ok(())
}

/// Roll back to the newest checkpoint that passes verification.
pub async fn auto_rollback(plane: &ControlPlane, reason: &str, mut output: Output) -> Result<()> {
    output.start_timer();
    output.progress("Rolling back to the newest verified checkpoint");
    let outcome = plane.rollback().auto_rollback(reason).await?;
    report(&outcome, &output);
    Ok(())
}

fn report(outcome: &RollbackOutcome, output: &Output) {
    output.data("rollback", outcome);
    for service in &outcome.stopped {
        output.progress(&format!("  → stopped {service}"));
    }
    for component in &outcome.restored {
        output.progress(&format!("  → restored {component}"));
    }
    for phase in &outcome.restarted {
        output.progress(&format!("  → replayed {phase}"));
    }
    output.success(&format!(
        "Rolled back to {} (recorded as {})",
        outcome.checkpoint, outcome.deployment
    ));
}
