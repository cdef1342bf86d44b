// ABOUTME: Deployment tracking commands: record lifecycle transitions, list history, export and import.
// ABOUTME: A failed deployment may trigger an automatic rollback when the configuration enables it.

use std::path::Path;

use keystone::ControlPlane;
use keystone::diagnostics::{Diagnostics, Warning};
use keystone::error::{Error, Result};
use keystone::output::Output;
use keystone::types::DeploymentId;

use super::describe_record;

pub fn track_deployment(
    plane: &ControlPlane,
    id: &str,
    checkpoint: Option<&str>,
    output: &Output,
) -> Result<()> {
    let record = plane.track_deployment(DeploymentId::new(id), checkpoint)?;
    output.data("deployment", &record);
    output.success(&format!("Tracking deployment {}", record.id));
    Ok(())
}

pub fn mark_success(plane: &ControlPlane, id: &str, output: &Output) -> Result<()> {
    let record = plane.tracker().mark_success(&DeploymentId::new(id))?;
    output.data("deployment", &record);
    output.success(&format!("Deployment {} completed", record.id));
    Ok(())
}

pub async fn mark_failure(
    plane: &ControlPlane,
    id: &str,
    reason: &str,
    output: &Output,
) -> Result<()> {
    let mut diag = Diagnostics::default();
    let id = DeploymentId::new(id);

    let outcome = match plane.mark_failure(&id, reason).await {
        Ok(outcome) => outcome,
        Err(e @ Error::Rollback(_)) => {
            // The failure itself is recorded before any rollback is attempted.
            diag.warn(Warning::rollback_failed(format!(
                "automatic rollback after {id} failed: {e}"
            )));
            for warning in diag.warnings() {
                output.warning(&warning.message);
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    output.data("deployment", &outcome.record);
    output.success(&format!(
        "Deployment {} marked failed ({})",
        outcome.record.id, outcome.record.status
    ));
    if let Some(rollback) = &outcome.rollback {
        output.data("rollback", rollback);
        output.success(&format!("Rolled back to {}", rollback.checkpoint));
    }
    Ok(())
}

pub fn list_deployments(plane: &ControlPlane, limit: usize, output: &Output) -> Result<()> {
    let history = plane.tracker().history(limit)?;
    let records: Vec<_> = history.iter().collect();
    output.data("deployments", &records);

    if records.is_empty() {
        output.progress("No deployments recorded");
    }
    for record in records {
        output.line(&describe_record(record));
    }
    Ok(())
}

pub fn get_last_successful(plane: &ControlPlane, output: &Output) -> Result<()> {
    let environment = &plane.config().environment;
    match plane.tracker().last_successful(environment)? {
        Some(record) => {
            output.data("deployment", &record);
            output.line(&describe_record(&record));
        }
        None => {
            output.data("deployment", &Option::<()>::None);
            output.progress(&format!("No successful deployment in {environment}"));
        }
    }
    Ok(())
}

pub fn export_state(plane: &ControlPlane, file: &Path, output: &Output) -> Result<()> {
    let export = plane.tracker().export_state(file)?;
    output.success(&format!(
        "Exported {} record(s) and {} marker(s) to {}",
        export.records.len(),
        export.markers.len(),
        file.display()
    ));
    Ok(())
}

pub fn import_state(plane: &ControlPlane, file: &Path, output: &Output) -> Result<()> {
    let summary = plane.import_state(file)?;
    output.data("import", &summary);
    output.success(&format!(
        "Imported {} record(s), skipped {}, restored {} marker(s)",
        summary.records_imported, summary.records_skipped, summary.markers_restored
    ));
    Ok(())
}
