// ABOUTME: Rollback engine: verify, stop in reverse order, restore, restart through the phases.
// ABOUTME: Every outcome is written to the deployment tracker as a terminal record.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::error::RollbackError;
use super::flag::RollbackFlag;
use super::trigger::RollbackTrigger;
use crate::bootstrap::{Phase, run_phase_cycle};
use crate::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::config::RetryPolicy;
use crate::services::{ServiceOps, ServiceRegistry};
use crate::state::StateStore;
use crate::tracker::{DeploymentStateTracker, DeploymentStatus};
use crate::types::{CheckpointId, DeploymentId, Environment, PhaseId, ServiceName};

/// What a successful rollback did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackOutcome {
    pub checkpoint: CheckpointId,
    pub deployment: DeploymentId,
    pub stopped: Vec<ServiceName>,
    pub restored: Vec<String>,
    pub restarted: Vec<PhaseId>,
}

enum Target<'a> {
    Reference(&'a str),
    NewestVerified,
    LastSuccessful,
}

/// Restores checkpoints for one environment.
#[derive(Debug, Clone)]
pub struct RollbackEngine {
    store: StateStore,
    environment: Environment,
    checkpoints: CheckpointManager,
    tracker: DeploymentStateTracker,
    registry: ServiceRegistry,
    phases: Vec<Phase>,
    policy: RetryPolicy,
    lease: Duration,
    flag: RollbackFlag,
}

impl RollbackEngine {
    pub fn new(
        store: StateStore,
        checkpoints: CheckpointManager,
        tracker: DeploymentStateTracker,
        registry: ServiceRegistry,
    ) -> Self {
        Self {
            environment: checkpoints.environment().clone(),
            store,
            checkpoints,
            tracker,
            registry,
            phases: Vec::new(),
            policy: RetryPolicy::default(),
            lease: Duration::from_secs(3600),
            flag: RollbackFlag::new(),
        }
    }

    /// Bootstrap phases replayed, in order, to restart services.
    pub fn with_phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_flag(mut self, flag: RollbackFlag) -> Self {
        self.flag = flag;
        self
    }

    pub fn flag(&self) -> &RollbackFlag {
        &self.flag
    }

    /// Roll back to a checkpoint given by id or name.
    pub async fn manual_rollback(
        &self,
        reference: &str,
        reason: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        self.rollback(Target::Reference(reference), reason).await
    }

    /// Roll back to the newest checkpoint that passes verification.
    pub async fn auto_rollback(&self, reason: &str) -> Result<RollbackOutcome, RollbackError> {
        tracing::warn!(reason, "automatic rollback requested");
        self.rollback(Target::NewestVerified, reason).await
    }

    /// Automatic rollback on behalf of a tracked deployment.
    ///
    /// The deployment ends `rolled_back` on success. On failure it ends
    /// `failed` unless it is already terminal.
    pub async fn auto_rollback_for(
        &self,
        deployment: &DeploymentId,
        reason: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        let result = self.auto_rollback(reason).await;
        let settled = match &result {
            Ok(outcome) => self
                .tracker
                .mark_rolled_back(deployment, &outcome.checkpoint, reason)
                .map(|_| ()),
            Err(e) => match self.tracker.is_terminal(deployment) {
                Ok(false) => self
                    .tracker
                    .mark_failure(deployment, &format!("automatic rollback failed: {e}"))
                    .map(|_| ()),
                Ok(true) => Ok(()),
                Err(lookup) => Err(lookup),
            },
        };
        if let Err(e) = settled {
            tracing::warn!(deployment = %deployment, error = %e, "failed to settle deployment after rollback");
        }
        result
    }

    /// Roll back to the checkpoint of the last completed deployment.
    pub async fn rollback_to_last_successful(
        &self,
        reason: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        self.rollback(Target::LastSuccessful, reason).await
    }

    async fn rollback(
        &self,
        target: Target<'_>,
        reason: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        let lock = self
            .store
            .lock(&self.environment, "rollback", self.lease)?;
        let _raised = self.flag.raise();

        let result = match self.select(&target) {
            Ok(meta) => match self.execute(&meta, reason).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => Err((Some(meta), e)),
            },
            Err(e) => Err((None, e)),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err((meta, error)) => {
                self.record_failure(meta.as_ref(), reason, &error);
                return Err(error);
            }
        };

        lock.release()?;
        Ok(outcome)
    }

    fn select(&self, target: &Target<'_>) -> Result<CheckpointMeta, RollbackError> {
        match target {
            Target::Reference(reference) => Ok(self.checkpoints.resolve(reference)?),
            Target::NewestVerified => {
                for meta in self.checkpoints.list()? {
                    let report = self.checkpoints.verify(&meta.id)?;
                    if report.passed() {
                        return Ok(meta);
                    }
                    tracing::warn!(
                        checkpoint = %meta.id,
                        failed = ?report.failures(),
                        "skipping corrupt checkpoint"
                    );
                }
                Err(RollbackError::NoVerifiedCheckpoint)
            }
            Target::LastSuccessful => {
                let record = self
                    .tracker
                    .last_successful(&self.environment)?
                    .ok_or(RollbackError::NoSuccessfulDeployment)?;
                let id = record
                    .checkpoint_id
                    .ok_or_else(|| RollbackError::NoCheckpoint(record.id.clone()))?;
                Ok(self.checkpoints.get(&id)?)
            }
        }
    }

    async fn execute(
        &self,
        meta: &CheckpointMeta,
        reason: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        let report = self.checkpoints.verify(&meta.id)?;
        if !report.passed() {
            return Err(RollbackError::CheckpointCorrupt {
                id: meta.id.clone(),
                failed: report.failures(),
            });
        }

        let mut stop_order = self.start_order();
        stop_order.reverse();
        let services = stop_order
            .iter()
            .map(|name| self.collaborator(name))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(checkpoint = %meta.id, reason, "rolling back");

        for service in &services {
            service.stop().await.map_err(|source| RollbackError::Stop {
                service: service.name().clone(),
                source,
            })?;
            tracing::debug!(service = %service.name(), "stopped for rollback");
        }

        let mut restored: Vec<String> = Vec::new();
        for name in meta.components.keys() {
            if let Err(e) = self.checkpoints.restore_component(meta, name).await {
                tracing::warn!(component = %name, error = %e, "restore failed, services left stopped");
                return Err(RollbackError::RollbackFailed {
                    last_restored: restored.last().cloned(),
                    component: name.clone(),
                    reason: e.to_string(),
                });
            }
            restored.push(name.clone());
        }

        let mut restarted = Vec::with_capacity(self.phases.len());
        for phase in &self.phases {
            let service = self.collaborator(&phase.service)?;
            run_phase_cycle(phase, service.as_ref(), &self.policy)
                .await
                .map_err(|source| RollbackError::RestartFailed {
                    phase: phase.id.clone(),
                    source,
                })?;
            restarted.push(phase.id.clone());
        }

        let deployment = self.record_id();
        self.tracker.record_terminal(
            deployment.clone(),
            &self.environment,
            DeploymentStatus::RolledBack,
            Some(meta),
            reason,
        )?;

        tracing::info!(checkpoint = %meta.id, deployment = %deployment, "rollback complete");
        Ok(RollbackOutcome {
            checkpoint: meta.id.clone(),
            deployment,
            stopped: stop_order,
            restored,
            restarted,
        })
    }

    /// Services in the order the plan starts them.
    fn start_order(&self) -> Vec<ServiceName> {
        self.phases
            .iter()
            .filter(|p| p.is_start())
            .map(|p| p.service.clone())
            .collect()
    }

    fn collaborator(&self, name: &ServiceName) -> Result<Arc<dyn ServiceOps>, RollbackError> {
        self.registry
            .get(name)
            .ok_or_else(|| RollbackError::UnknownService(name.clone()))
    }

    fn record_id(&self) -> DeploymentId {
        DeploymentId::new(format!(
            "rollback-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ))
    }

    /// Failures are terminal and never retried; they are only recorded.
    fn record_failure(&self, meta: Option<&CheckpointMeta>, reason: &str, error: &RollbackError) {
        let detail = format!("rollback failed ({reason}): {error}");
        if let Err(e) = self.tracker.record_terminal(
            self.record_id(),
            &self.environment,
            DeploymentStatus::Failed,
            meta,
            &detail,
        ) {
            tracing::warn!(error = %e, "failed to record rollback failure");
        }
    }
}

#[async_trait]
impl RollbackTrigger for RollbackEngine {
    async fn trigger_rollback(&self, reason: &str) -> Result<(), RollbackError> {
        self.auto_rollback(reason).await.map(|_| ())
    }
}

/// Rollback trigger that settles the deployment a monitor is watching.
#[derive(Debug, Clone)]
pub struct DeploymentRollback {
    engine: RollbackEngine,
    deployment: DeploymentId,
}

impl DeploymentRollback {
    pub fn new(engine: RollbackEngine, deployment: DeploymentId) -> Self {
        Self { engine, deployment }
    }
}

#[async_trait]
impl RollbackTrigger for DeploymentRollback {
    async fn trigger_rollback(&self, reason: &str) -> Result<(), RollbackError> {
        self.engine
            .auto_rollback_for(&self.deployment, reason)
            .await
            .map(|_| ())
    }
}
