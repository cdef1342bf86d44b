// ABOUTME: Control plane facade wiring planner, orchestrator, checkpoints, tracker, rollback, and monitor.
// ABOUTME: Built once from an immutable configuration; the CLI drives everything through it.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::bootstrap::{AbortSignal, BootstrapOrchestrator, BootstrapStatus, RunOutcome};
use crate::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::config::{Config, MonitorConfig};
use crate::error::Result;
use crate::health::{DeploymentSession, HealthMonitor, MonitorError, MonitorTarget};
use crate::planner::{BootstrapPlan, DependencyGraphPlanner};
use crate::rollback::{DeploymentRollback, RollbackEngine, RollbackFlag, RollbackOutcome};
use crate::services::ServiceRegistry;
use crate::state::StateStore;
use crate::tracker::{DeploymentRecord, DeploymentStateTracker, DeploymentStatus, ImportSummary};
use crate::types::DeploymentId;

/// Result of [`ControlPlane::mark_failure`].
#[derive(Debug, Clone)]
pub struct FailureOutcome {
    pub record: DeploymentRecord,
    /// Present when the failure triggered an automatic rollback.
    pub rollback: Option<RollbackOutcome>,
}

/// Overrides for a monitoring session.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub interval: Option<Duration>,
    pub max_failure_checks: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ControlPlane {
    config: Arc<Config>,
    store: StateStore,
    registry: ServiceRegistry,
    plan: BootstrapPlan,
    checkpoints: CheckpointManager,
    tracker: DeploymentStateTracker,
    rollback: RollbackEngine,
    flag: RollbackFlag,
}

impl ControlPlane {
    /// Build with command-backed collaborators from the configuration.
    ///
    /// A relative `state_dir` is resolved against `base_dir`.
    pub fn new(config: Config, base_dir: &Path) -> Result<Self> {
        let registry = ServiceRegistry::from_config(&config);
        Self::with_registry(config, base_dir, registry)
    }

    /// Build with caller-supplied collaborators.
    pub fn with_registry(config: Config, base_dir: &Path, registry: ServiceRegistry) -> Result<Self> {
        let plan = DependencyGraphPlanner::from_config(&config).plan()?;
        let store = StateStore::open(resolve_state_dir(&config.state_dir, base_dir))?;

        let checkpoints = CheckpointManager::new(
            store.clone(),
            config.environment.clone(),
            config.components.clone(),
            registry.clone(),
            config.checkpoint.clone(),
        );
        let tracker = DeploymentStateTracker::new(&store);
        let flag = RollbackFlag::new();
        let rollback = RollbackEngine::new(
            store.clone(),
            checkpoints.clone(),
            tracker.clone(),
            registry.clone(),
        )
        .with_phases(plan.phases().to_vec())
        .with_policy(config.verification.clone())
        .with_lease(config.checkpoint.lease)
        .with_flag(flag.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            registry,
            plan,
            checkpoints,
            tracker,
            rollback,
            flag,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn tracker(&self) -> &DeploymentStateTracker {
        &self.tracker
    }

    pub fn rollback(&self) -> &RollbackEngine {
        &self.rollback
    }

    pub fn orchestrator(&self) -> BootstrapOrchestrator {
        BootstrapOrchestrator::new(
            self.plan.phases().to_vec(),
            self.registry.clone(),
            self.store.markers(),
            self.config.verification.clone(),
        )
    }

    /// Run the bootstrap under the environment lock.
    ///
    /// Every run that ends in an error is recorded as a failed deployment.
    /// Lock contention is returned before anything runs and is not recorded.
    pub async fn run_bootstrap(&self, force: bool, abort: Option<AbortSignal>) -> Result<RunOutcome> {
        let lock = self.store.lock(
            &self.config.environment,
            "bootstrap",
            self.config.checkpoint.lease,
        )?;
        let mut orchestrator = self.orchestrator();
        if let Some(abort) = abort {
            orchestrator = orchestrator.with_abort(abort);
        }

        match orchestrator.run(force).await {
            Ok(outcome) => {
                lock.release()?;
                Ok(outcome)
            }
            Err(e) => {
                self.record_fatal("bootstrap", &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Merge an exported state file, holding the environment lock while
    /// phase markers are written.
    pub fn import_state(&self, path: &Path) -> Result<ImportSummary> {
        let lock = self.store.lock(
            &self.config.environment,
            "import-state",
            self.config.checkpoint.lease,
        )?;
        let summary = self.tracker.import_state(path)?;
        lock.release()?;
        Ok(summary)
    }

    pub fn bootstrap_status(&self) -> Result<BootstrapStatus> {
        Ok(self.orchestrator().status()?)
    }

    pub async fn create_checkpoint(&self, name: &str) -> Result<CheckpointMeta> {
        Ok(self.checkpoints.create(name).await?)
    }

    /// Track a deployment, optionally tied to a checkpoint given by id or name.
    pub fn track_deployment(
        &self,
        id: DeploymentId,
        checkpoint: Option<&str>,
    ) -> Result<DeploymentRecord> {
        let meta = checkpoint
            .map(|reference| self.checkpoints.resolve(reference))
            .transpose()?;
        Ok(self
            .tracker
            .track_deployment(id, &self.config.environment, meta.as_ref())?)
    }

    /// Mark a deployment failed, rolling back when the policy asks for it.
    ///
    /// A successful automatic rollback moves the record on to `rolled_back`.
    pub async fn mark_failure(&self, id: &DeploymentId, reason: &str) -> Result<FailureOutcome> {
        let record = self.tracker.mark_failure(id, reason)?;
        if !self.config.rollback.auto_on_failure {
            return Ok(FailureOutcome {
                record,
                rollback: None,
            });
        }

        let outcome = self
            .rollback
            .auto_rollback_for(id, &format!("deployment {id} failed: {reason}"))
            .await?;
        Ok(FailureOutcome {
            record: self.tracker.get(id)?,
            rollback: Some(outcome),
        })
    }

    /// Build a monitor for `deployment` over every configured service.
    pub fn monitor(
        &self,
        deployment: &DeploymentId,
        options: &MonitorOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Result<HealthMonitor> {
        self.tracker.get(deployment)?;

        let targets = self
            .config
            .services
            .iter()
            .map(|service| {
                self.registry
                    .get(&service.name)
                    .map(|ops| MonitorTarget::new(ops, service.tier))
                    .ok_or_else(|| MonitorError::UnknownService(service.name.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let config = MonitorConfig {
            interval: options.interval.unwrap_or(self.config.monitor.interval),
            max_failure_checks: options
                .max_failure_checks
                .unwrap_or(self.config.monitor.max_failure_checks),
        };
        let session = DeploymentSession::new(self.tracker.clone(), deployment.clone());

        let trigger = DeploymentRollback::new(self.rollback.clone(), deployment.clone());

        Ok(HealthMonitor::new(
            targets,
            Arc::new(trigger),
            &config,
            self.config.verification.attempt_timeout,
        )
        .with_flag(self.flag.clone())
        .with_session(Arc::new(session))
        .with_shutdown(shutdown))
    }

    fn record_fatal(&self, operation: &str, reason: &str) {
        let id = DeploymentId::new(format!(
            "{operation}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        if let Err(e) = self.tracker.record_terminal(
            id,
            &self.config.environment,
            DeploymentStatus::Failed,
            None,
            reason,
        ) {
            tracing::warn!(error = %e, "failed to record {operation} failure");
        }
    }
}

fn resolve_state_dir(state_dir: &Path, base_dir: &Path) -> PathBuf {
    if state_dir.is_absolute() {
        state_dir.to_path_buf()
    } else {
        base_dir.join(state_dir)
    }
}
