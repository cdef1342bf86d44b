// ABOUTME: Bootstrap commands: show the phase plan, run it, and report progress.
// ABOUTME: Ctrl-C during a run stops it cleanly before the next phase.

use keystone::ControlPlane;
use keystone::bootstrap::{AbortSignal, PhaseKind, RunOutcome};
use keystone::error::Result;
use keystone::output::Output;
use serde::Serialize;

#[derive(Serialize)]
struct PlanView<'a> {
    phases: Vec<PlanPhase<'a>>,
    deferred: Vec<String>,
}

#[derive(Serialize)]
struct PlanPhase<'a> {
    id: &'a str,
    name: &'a str,
    service: &'a str,
    mode: String,
    recovery: String,
}

pub fn plan(plane: &ControlPlane, output: &Output) -> Result<()> {
    let plan = plane.plan();

    let view = PlanView {
        phases: plan
            .phases()
            .iter()
            .map(|phase| PlanPhase {
                id: phase.id.as_str(),
                name: &phase.name,
                service: phase.service.as_str(),
                mode: phase.mode.to_string(),
                recovery: phase.recovery.to_string(),
            })
            .collect(),
        deferred: plan
            .deferred()
            .iter()
            .map(|edge| format!("{} -> {}", edge.service, edge.dependency))
            .collect(),
    };
    output.data("plan", &view);

    for (index, phase) in plan.phases().iter().enumerate() {
        let detail = match &phase.kind {
            PhaseKind::Start => format!("start {} ({})", phase.service, phase.mode),
            PhaseKind::Integration { dependency } => {
                format!("integrate {} with {}", phase.service, dependency)
            }
        };
        output.line(&format!("{:>2}. {:<28} {}", index + 1, phase.id, detail));
    }
    for edge in &view.deferred {
        output.progress(&format!("deferred dependency: {edge}"));
    }
    Ok(())
}

pub async fn run(plane: &ControlPlane, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let (abort_tx, abort) = AbortSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current phase");
            let _ = abort_tx.send(true);
        }
    });

    output.progress(&format!(
        "Bootstrapping {} phase(s) in {}",
        plane.plan().phases().len(),
        plane.config().environment
    ));

    match plane.run_bootstrap(force, Some(abort)).await? {
        RunOutcome::AllComplete { executed, skipped } => {
            output.success(&format!(
                "Bootstrap complete: {executed} executed, {skipped} already complete"
            ));
        }
        RunOutcome::Aborted { next_phase } => {
            output.warning(&format!("Bootstrap interrupted before {next_phase}"));
        }
    }
    Ok(())
}

pub fn status(plane: &ControlPlane, output: &Output) -> Result<()> {
    let status = plane.bootstrap_status()?;
    let environment = &plane.config().environment;
    let last = plane.tracker().history(1)?.iter().next().cloned();

    output.data("status", &status);
    if let Some(record) = &last {
        output.data("last_deployment", record);
    }

    output.line(&format!(
        "Environment {environment}: {}/{} phases complete ({}%)",
        status.completed, status.total, status.percent
    ));
    for phase in &status.phases {
        let when = phase
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        output.line(&format!("  {:<28} {:<9} {when}", phase.id, phase.status));
    }
    match last {
        Some(record) => output.line(&format!("Last deployment: {}", super::describe_record(&record))),
        None => output.progress("No deployments recorded"),
    }
    Ok(())
}
