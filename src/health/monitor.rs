// ABOUTME: Health monitor loop: concurrent probes per tick, one rollback per session at most.
// ABOUTME: Cancellable through a watch channel; suspended while a rollback is already running.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::counters::{FailureCounters, HealthSample};
use super::error::MonitorError;
use super::session::SessionState;
use crate::config::{MonitorConfig, Tier};
use crate::rollback::{RollbackFlag, RollbackTrigger};
use crate::services::ServiceOps;

/// A service to probe and its criticality.
#[derive(Clone)]
pub struct MonitorTarget {
    pub service: Arc<dyn ServiceOps>,
    pub tier: Tier,
}

impl MonitorTarget {
    pub fn new(service: Arc<dyn ServiceOps>, tier: Tier) -> Self {
        Self { service, tier }
    }
}

impl std::fmt::Debug for MonitorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTarget")
            .field("service", self.service.name())
            .field("tier", &self.tier)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DeploymentTerminal,
    Shutdown,
}

/// Summary of a finished monitoring session.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub ticks: u64,
    /// Latest sample per target, in target order.
    pub samples: Vec<HealthSample>,
    pub rollback_triggered: bool,
    pub rollback_error: Option<String>,
    pub stopped_by: StopReason,
}

pub struct HealthMonitor {
    targets: Vec<MonitorTarget>,
    trigger: Arc<dyn RollbackTrigger>,
    interval: Duration,
    max_failure_checks: u32,
    probe_timeout: Duration,
    flag: RollbackFlag,
    session: Option<Arc<dyn SessionState>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl HealthMonitor {
    pub fn new(
        targets: Vec<MonitorTarget>,
        trigger: Arc<dyn RollbackTrigger>,
        config: &MonitorConfig,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            targets,
            trigger,
            interval: config.interval,
            max_failure_checks: config.max_failure_checks.max(1),
            probe_timeout,
            flag: RollbackFlag::new(),
            session: None,
            shutdown: None,
        }
    }

    /// Share the engine's "rollback in progress" flag.
    pub fn with_flag(mut self, flag: RollbackFlag) -> Self {
        self.flag = flag;
        self
    }

    /// Stop once `session` reports terminal.
    pub fn with_session(mut self, session: Arc<dyn SessionState>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Poll until the session ends or shutdown is requested.
    pub async fn run(mut self) -> Result<MonitorReport, MonitorError> {
        if self.targets.is_empty() {
            return Err(MonitorError::NoTargets);
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut counters = FailureCounters::new();
        let mut report = MonitorReport {
            ticks: 0,
            samples: Vec::new(),
            rollback_triggered: false,
            rollback_error: None,
            stopped_by: StopReason::Shutdown,
        };

        tracing::info!(
            targets = self.targets.len(),
            interval = ?self.interval,
            max_failure_checks = self.max_failure_checks,
            "health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_requested(&mut self.shutdown) => {
                    tracing::debug!("health monitor shutting down");
                    report.stopped_by = StopReason::Shutdown;
                    break;
                }
            }

            if let Some(session) = &self.session
                && session.is_terminal().await
            {
                tracing::info!("watched deployment is terminal, monitor stopping");
                report.stopped_by = StopReason::DeploymentTerminal;
                break;
            }

            let results = self.probe_all().await;
            report.ticks += 1;
            report.samples = results
                .iter()
                .map(|(target, healthy)| counters.record(target.service.name(), *healthy))
                .collect();

            for sample in report.samples.iter().filter(|s| !s.healthy) {
                tracing::debug!(
                    service = %sample.service,
                    consecutive_failures = sample.consecutive_failures,
                    "health probe failed"
                );
            }

            if report.rollback_triggered {
                continue;
            }
            if self.flag.is_raised() {
                tracing::debug!("rollback in progress, triggering suspended");
                continue;
            }

            let failing = results
                .iter()
                .zip(&report.samples)
                .find(|((target, _), sample)| {
                    target.tier == Tier::Critical
                        && sample.consecutive_failures >= self.max_failure_checks
                })
                .map(|(_, sample)| sample.clone());

            if let Some(sample) = failing {
                report.rollback_triggered = true;
                let reason = format!(
                    "{} failed {} consecutive health checks",
                    sample.service, sample.consecutive_failures
                );
                tracing::warn!(service = %sample.service, "{reason}, triggering rollback");
                if let Err(e) = self.trigger.trigger_rollback(&reason).await {
                    tracing::warn!(error = %e, "automatic rollback failed");
                    report.rollback_error = Some(e.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Probe every target concurrently, each bounded by the probe timeout.
    async fn probe_all(&self) -> Vec<(&MonitorTarget, bool)> {
        join_all(self.targets.iter().map(|target| async move {
            let healthy = tokio::time::timeout(self.probe_timeout, target.service.health_check())
                .await
                .unwrap_or(false);
            (target, healthy)
        }))
        .await
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("targets", &self.targets)
            .field("interval", &self.interval)
            .field("max_failure_checks", &self.max_failure_checks)
            .finish()
    }
}

/// Resolves once shutdown is signalled. Never resolves without a receiver
/// or after the sender is dropped.
async fn shutdown_requested(rx: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = rx {
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending::<()>().await
}
