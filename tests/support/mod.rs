// ABOUTME: Shared fixtures for integration tests.
// ABOUTME: Scripted in-memory services, a shared call journal, and config builders.

#![allow(dead_code)]

use async_trait::async_trait;
use keystone::bootstrap::RecoveryStrategy;
use keystone::config::Config;
use keystone::services::{BootstrapMode, ServiceError, ServiceOps, ServiceRegistry};
use keystone::types::ServiceName;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Ordered record of every call made to any fake sharing it.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }
}

/// In-memory service whose health answers follow a script.
///
/// Once the script is exhausted the service reports `fallback`.
pub struct FakeService {
    name: ServiceName,
    journal: Journal,
    health: Mutex<VecDeque<bool>>,
    fallback: Mutex<bool>,
    snapshot: Option<Mutex<Vec<u8>>>,
    recover_hook: Option<RecoveryStrategy>,
    snapshot_delay: Duration,
}

impl FakeService {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: ServiceName::new(name).unwrap(),
            journal: journal.clone(),
            health: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(true),
            snapshot: None,
            recover_hook: None,
            snapshot_delay: Duration::ZERO,
        }
    }

    /// Health answers consumed one per probe.
    pub fn with_health(self, script: impl IntoIterator<Item = bool>) -> Self {
        *self.health.lock() = script.into_iter().collect();
        self
    }

    pub fn always_unhealthy(self) -> Self {
        *self.fallback.lock() = false;
        self
    }

    /// Support snapshots, starting from `state`.
    pub fn with_snapshot(mut self, state: &[u8]) -> Self {
        self.snapshot = Some(Mutex::new(state.to_vec()));
        self
    }

    /// Take `delay` to produce each snapshot.
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = delay;
        self
    }

    /// Handle `strategy` in the service itself instead of the built-in behavior.
    pub fn with_recover_hook(mut self, strategy: RecoveryStrategy) -> Self {
        self.recover_hook = Some(strategy);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.health.lock().clear();
        *self.fallback.lock() = healthy;
    }

    pub fn snapshot_state(&self) -> Option<Vec<u8>> {
        self.snapshot.as_ref().map(|s| s.lock().clone())
    }

    pub fn set_snapshot_state(&self, state: &[u8]) {
        if let Some(snapshot) = &self.snapshot {
            *snapshot.lock() = state.to_vec();
        }
    }

    fn log(&self, action: impl std::fmt::Display) {
        self.journal.push(format!("{} {action}", self.name));
    }
}

#[async_trait]
impl ServiceOps for FakeService {
    fn name(&self) -> &ServiceName {
        &self.name
    }

    async fn start(&self, mode: BootstrapMode) -> Result<(), ServiceError> {
        self.log(format!("start {mode}"));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.log("stop");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let next = self.health.lock().pop_front();
        next.unwrap_or(*self.fallback.lock())
    }

    fn supports_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    async fn snapshot(&self) -> Result<Vec<u8>, ServiceError> {
        tokio::time::sleep(self.snapshot_delay).await;
        match &self.snapshot {
            Some(state) => Ok(state.lock().clone()),
            None => Err(ServiceError::SnapshotUnsupported {
                service: self.name.to_string(),
            }),
        }
    }

    async fn restore_snapshot(&self, blob: &[u8]) -> Result<(), ServiceError> {
        self.log("restore-snapshot");
        self.set_snapshot_state(blob);
        Ok(())
    }

    async fn recover(&self, strategy: RecoveryStrategy) -> Result<bool, ServiceError> {
        self.log(format!("recover {strategy}"));
        Ok(self.recover_hook == Some(strategy))
    }
}

/// Build a registry from fakes, returning the shared handles too.
pub fn registry(services: Vec<FakeService>) -> (ServiceRegistry, Vec<Arc<FakeService>>) {
    let mut registry = ServiceRegistry::new();
    let handles: Vec<Arc<FakeService>> = services.into_iter().map(Arc::new).collect();
    for handle in &handles {
        registry.register(handle.clone());
    }
    (registry, handles)
}

/// The scheduler, secret store, and proxy trio with immediate retries.
///
/// `extra` is appended verbatim to the top level (components, rollback, ...).
pub fn trio_config(state_dir: &Path, extra: &str) -> Config {
    let yaml = format!(
        r#"
environment: staging
state_dir: {state}
verification:
  attempts: 2
  backoff: 0s
  max_backoff: 0s
  attempt_timeout: 1s
monitor:
  interval: 10ms
  max_failure_checks: 3
services:
  - name: nomad
    depends_on: [vault]
    bootstrap_mode: standalone
    tier: critical
    start: "true"
    stop: "true"
    health:
      cmd: "true"
  - name: vault
    depends_on: [nomad]
    tier: critical
    phase: init
    start: "true"
    stop: "true"
    health:
      cmd: "true"
  - name: traefik
    depends_on: [nomad, vault]
    phase: deploy
    start: "true"
    stop: "true"
    health:
      cmd: "true"
{extra}
"#,
        state = state_dir.display()
    );
    Config::from_yaml(&yaml).unwrap()
}

/// Fakes for the trio, all healthy.
pub fn trio_fakes(journal: &Journal) -> Vec<FakeService> {
    vec![
        FakeService::new("nomad", journal),
        FakeService::new("vault", journal),
        FakeService::new("traefik", journal),
    ]
}
