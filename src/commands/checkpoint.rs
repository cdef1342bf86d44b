// ABOUTME: Checkpoint commands: create, list, verify, and prune.
// ABOUTME: Verification failures exit with the verification code rather than the generic one.

use keystone::ControlPlane;
use keystone::diagnostics::{Diagnostics, Warning};
use keystone::error::{Error, Result};
use keystone::output::Output;

pub async fn create(plane: &ControlPlane, name: &str, mut output: Output) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Creating checkpoint '{name}' for {}",
        plane.config().environment
    ));

    let meta = plane.create_checkpoint(name).await?;
    output.data("checkpoint", &meta);
    for (component, record) in &meta.components {
        output.progress(&format!(
            "  {component:<20} {} bytes  sha256:{}",
            record.size_bytes,
            short_digest(&record.checksum)
        ));
    }
    output.success(&format!("Checkpoint {} created", meta.id));
    Ok(())
}

pub fn list(plane: &ControlPlane, output: &Output) -> Result<()> {
    let checkpoints = plane.checkpoints().list()?;
    output.data("checkpoints", &checkpoints);

    if checkpoints.is_empty() {
        output.progress("No checkpoints");
        return Ok(());
    }
    for meta in &checkpoints {
        output.line(&format!(
            "{:<40} {}  {} component(s)  {} bytes",
            meta.id,
            meta.created_at.format("%Y-%m-%d %H:%M:%S"),
            meta.components.len(),
            meta.size_bytes
        ));
    }
    Ok(())
}

pub fn verify(plane: &ControlPlane, reference: &str, output: &Output) -> Result<()> {
    let meta = plane.checkpoints().resolve(reference)?;
    let report = plane.checkpoints().verify(&meta.id)?;
    output.data("verification", &report);

    for check in &report.components {
        let mark = if check.passed { "ok" } else { "FAILED" };
        output.line(&format!("  {:<20} {mark}", check.name));
    }

    if report.passed() {
        output.success(&format!("Checkpoint {} verified", meta.id));
        Ok(())
    } else {
        Err(Error::VerificationFailed(meta.id.to_string()))
    }
}

pub fn cleanup(plane: &ControlPlane, output: &Output) -> Result<()> {
    let mut diag = Diagnostics::default();
    let retention = plane.config().retention_days;
    let report = plane.checkpoints().prune(retention)?;

    if report.partials_removed > 0 {
        diag.warn(Warning::stale_staging(format!(
            "removed {} interrupted checkpoint(s)",
            report.partials_removed
        )));
    }

    output.data("cleanup", &report);
    for id in &report.removed {
        output.progress(&format!("  removed {id}"));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    output.success(&format!(
        "Removed {} checkpoint(s) older than {retention} day(s), kept {}",
        report.removed.len(),
        report.retained
    ));
    Ok(())
}

fn short_digest(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
