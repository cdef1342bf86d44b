// ABOUTME: Health monitoring command.
// ABOUTME: Runs until the deployment is terminal or Ctrl-C, rolling back at most once.

use std::time::Duration;

use keystone::diagnostics::{Diagnostics, Warning};
use keystone::error::Result;
use keystone::health::StopReason;
use keystone::output::Output;
use keystone::types::DeploymentId;
use keystone::{ControlPlane, MonitorOptions};
use tokio::sync::watch;

pub async fn monitor_health(
    plane: &ControlPlane,
    deployment: &str,
    interval: Option<Duration>,
    max_checks: Option<u32>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let deployment = DeploymentId::new(deployment);
    let options = MonitorOptions {
        interval,
        max_failure_checks: max_checks,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let monitor = plane.monitor(&deployment, &options, shutdown_rx)?;
    output.progress(&format!("Monitoring deployment {deployment} (Ctrl-C to stop)"));
    let report = monitor.run().await?;

    if let Some(error) = &report.rollback_error {
        diag.warn(Warning::rollback_failed(format!(
            "health-triggered rollback failed: {error}"
        )));
    }

    output.data("monitor", &report);
    for sample in &report.samples {
        let state = if sample.healthy { "healthy" } else { "unhealthy" };
        output.line(&format!(
            "  {:<20} {state:<9} {} consecutive failure(s)",
            sample.service, sample.consecutive_failures
        ));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let reason = match report.stopped_by {
        StopReason::DeploymentTerminal => "deployment reached a terminal state",
        StopReason::Shutdown => "interrupted",
    };
    let rollback = if report.rollback_triggered {
        ", rollback triggered"
    } else {
        ""
    };
    output.success(&format!(
        "Monitoring stopped after {} check(s): {reason}{rollback}",
        report.ticks
    ));
    Ok(())
}
