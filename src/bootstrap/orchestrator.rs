// ABOUTME: Sequential bootstrap state machine over the planned phase list.
// ABOUTME: Persists a marker per completed phase, recovers once on failure, and stops cleanly on abort.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::RetryPolicy;
use crate::services::{ServiceOps, ServiceRegistry};
use crate::state::{MarkerStore, PhaseMarkerRecord};
use crate::types::{PhaseId, RunId};

use super::error::BootstrapError;
use super::phase::{Phase, PhaseStatus};
use super::recovery::apply_recovery;
use super::verify::run_phase_cycle;

/// Cooperative stop request, checked between phases.
///
/// The in-flight phase always finishes; the run then stops before the next
/// one, leaving markers consistent for a later resume.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Create a signal and the sender that raises it.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }
}

/// How a bootstrap run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every phase is complete. `executed` phases ran in this call, `skipped`
    /// already had markers.
    AllComplete { executed: usize, skipped: usize },
    /// The abort signal stopped the run before `next_phase`.
    Aborted { next_phase: PhaseId },
}

/// One phase as reported by [`BootstrapOrchestrator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct PhaseProgress {
    pub id: PhaseId,
    pub name: String,
    pub status: PhaseStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Snapshot of bootstrap progress derived from the marker store.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStatus {
    pub phases: Vec<PhaseProgress>,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

impl BootstrapStatus {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Executes planned phases in order against the registered collaborators.
pub struct BootstrapOrchestrator {
    phases: Vec<Phase>,
    registry: ServiceRegistry,
    markers: MarkerStore,
    policy: RetryPolicy,
    abort: Option<AbortSignal>,
}

impl BootstrapOrchestrator {
    pub fn new(
        phases: Vec<Phase>,
        registry: ServiceRegistry,
        markers: MarkerStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            phases,
            registry,
            markers,
            policy,
            abort: None,
        }
    }

    /// Attach an abort signal checked before each phase.
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run every incomplete phase in order.
    ///
    /// With `force`, all markers are cleared first and every phase runs again.
    /// A failed phase gets its recovery strategy applied once and one more full
    /// cycle; if that also fails the run halts with
    /// [`BootstrapError::BootstrapFailed`] and later phases stay pending.
    pub async fn run(&mut self, force: bool) -> Result<RunOutcome, BootstrapError> {
        if force {
            let cleared = self.markers.clear()?;
            tracing::info!(cleared, "forced run: cleared phase markers");
        }

        let run_id = RunId::new(format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let mut executed = 0;
        let mut skipped = 0;

        for index in 0..self.phases.len() {
            let id = self.phases[index].id.clone();

            if self.markers.is_complete(&id) {
                tracing::debug!(phase = %id, "phase already complete, skipping");
                self.phases[index].status = PhaseStatus::Complete;
                skipped += 1;
                continue;
            }

            if self.abort.as_ref().is_some_and(AbortSignal::is_raised) {
                tracing::info!(phase = %id, "abort requested, stopping before phase");
                return Ok(RunOutcome::Aborted { next_phase: id });
            }

            self.execute(index, &run_id).await?;
            executed += 1;
        }

        tracing::info!(executed, skipped, "bootstrap complete");
        Ok(RunOutcome::AllComplete { executed, skipped })
    }

    async fn execute(&mut self, index: usize, run_id: &RunId) -> Result<(), BootstrapError> {
        let phase = self.phases[index].clone();
        let service = self.collaborator(&phase)?;

        tracing::info!(phase = %phase.id, service = %phase.service, mode = %phase.mode, "phase running");
        self.phases[index].status = PhaseStatus::Running;

        let first = run_phase_cycle(&phase, service.as_ref(), &self.policy).await;
        let error = match first {
            Ok(attempts) => return self.complete(index, run_id, attempts),
            Err(e) => e,
        };

        tracing::warn!(phase = %phase.id, error = %error, strategy = %phase.recovery, "phase failed, recovering");
        self.phases[index].status = PhaseStatus::Failed;

        if let Err(e) = apply_recovery(&phase, service.as_ref(), &self.markers, &self.phases).await {
            tracing::warn!(phase = %phase.id, error = %e, "recovery action failed");
        }

        self.phases[index].status = PhaseStatus::Running;
        match run_phase_cycle(&phase, service.as_ref(), &self.policy).await {
            Ok(attempts) => self.complete(index, run_id, attempts),
            Err(e) => {
                self.phases[index].status = PhaseStatus::Failed;
                tracing::warn!(phase = %phase.id, error = %e, "phase failed after recovery, halting");
                Err(BootstrapError::BootstrapFailed {
                    phase: phase.id,
                    last_error: e.to_string(),
                })
            }
        }
    }

    fn complete(&mut self, index: usize, run_id: &RunId, attempts: u32) -> Result<(), BootstrapError> {
        let phase = &mut self.phases[index];
        self.markers.mark_complete(&PhaseMarkerRecord {
            phase_id: phase.id.clone(),
            name: phase.name.clone(),
            completed_at: Utc::now(),
            run_id: run_id.clone(),
        })?;
        phase.status = PhaseStatus::Complete;
        tracing::info!(phase = %phase.id, attempts, "phase complete");
        Ok(())
    }

    fn collaborator(&self, phase: &Phase) -> Result<Arc<dyn ServiceOps>, BootstrapError> {
        self.registry
            .get(&phase.service)
            .ok_or_else(|| BootstrapError::UnknownService(phase.service.clone()))
    }

    /// Per-phase progress from the durable markers.
    pub fn status(&self) -> Result<BootstrapStatus, BootstrapError> {
        let mut phases = Vec::with_capacity(self.phases.len());
        for phase in &self.phases {
            let marker = self.markers.get(&phase.id)?;
            let status = match (&marker, phase.status) {
                (Some(_), _) => PhaseStatus::Complete,
                (None, PhaseStatus::Failed) => PhaseStatus::Failed,
                (None, _) => PhaseStatus::Pending,
            };
            phases.push(PhaseProgress {
                id: phase.id.clone(),
                name: phase.name.clone(),
                status,
                completed_at: marker.map(|m| m.completed_at),
            });
        }

        let total = phases.len();
        let completed = phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Complete)
            .count();
        let percent = if total == 0 {
            100
        } else {
            (completed * 100 / total) as u8
        };

        Ok(BootstrapStatus {
            phases,
            completed,
            total,
            percent,
        })
    }
}

impl std::fmt::Debug for BootstrapOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapOrchestrator")
            .field("phases", &self.phases.len())
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::RecoveryStrategy;
    use crate::services::{BootstrapMode, ServiceError};
    use crate::types::ServiceName;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Flaky {
        name: ServiceName,
        healthy: Mutex<Vec<bool>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServiceOps for Flaky {
        fn name(&self) -> &ServiceName {
            &self.name
        }
        async fn start(&self, mode: BootstrapMode) -> Result<(), ServiceError> {
            self.calls.lock().push(format!("start {mode}"));
            Ok(())
        }
        async fn stop(&self) -> Result<(), ServiceError> {
            self.calls.lock().push("stop".to_string());
            Ok(())
        }
        async fn health_check(&self) -> bool {
            let mut script = self.healthy.lock();
            if script.is_empty() { true } else { script.remove(0) }
        }
    }

    fn setup(script: Vec<bool>) -> (tempfile::TempDir, Arc<Flaky>, BootstrapOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let name = ServiceName::new("vault").unwrap();
        let service = Arc::new(Flaky {
            name: name.clone(),
            healthy: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        });
        let mut registry = ServiceRegistry::new();
        registry.register(service.clone());
        let phase = Phase::start(name, "init", BootstrapMode::Integrated, RecoveryStrategy::RestartClean);
        let orchestrator = BootstrapOrchestrator::new(
            vec![phase],
            registry,
            MarkerStore::new(dir.path().to_path_buf()),
            RetryPolicy::immediate(2),
        );
        (dir, service, orchestrator)
    }

    #[tokio::test]
    async fn recovers_once_then_completes() {
        let (_dir, service, mut orchestrator) = setup(vec![false, false, true]);

        let outcome = orchestrator.run(false).await.unwrap();

        assert_eq!(outcome, RunOutcome::AllComplete { executed: 1, skipped: 0 });
        assert_eq!(
            *service.calls.lock(),
            vec!["start integrated", "stop", "start integrated"]
        );
        assert_eq!(orchestrator.status().unwrap().percent, 100);
    }

    #[tokio::test]
    async fn halts_after_second_failure() {
        let (_dir, _service, mut orchestrator) = setup(vec![false; 4]);

        let err = orchestrator.run(false).await.unwrap_err();

        assert!(matches!(err, BootstrapError::BootstrapFailed { .. }));
        assert_eq!(orchestrator.phases()[0].status, PhaseStatus::Failed);
        let status = orchestrator.status().unwrap();
        assert_eq!(status.completed, 0);
        assert_eq!(status.phases[0].status, PhaseStatus::Failed);
    }

    #[tokio::test]
    async fn abort_stops_before_next_phase() {
        let (_dir, service, orchestrator) = setup(vec![]);
        let (tx, abort) = AbortSignal::channel();
        let mut orchestrator = orchestrator.with_abort(abort);
        tx.send(true).unwrap();

        let outcome = orchestrator.run(false).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Aborted { .. }));
        assert!(service.calls.lock().is_empty());
    }
}
