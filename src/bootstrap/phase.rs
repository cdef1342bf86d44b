// ABOUTME: Bootstrap phase definitions and per-phase status.
// ABOUTME: A phase starts one service in one mode and is verified by that service's health check.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::BootstrapMode;
use crate::types::{PhaseId, ServiceName};

/// Lifecycle of a single phase: `pending -> running -> complete | failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Complete => "complete",
            PhaseStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What to do once a phase has exhausted its verification retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// Stop the service so the retry starts it from scratch.
    RestartClean,
    /// Stop the service and forget every completed phase of it.
    Reinitialize,
    /// Fall back to standalone mode before retrying the integration.
    ResetIntegration,
    /// Stop and start the service again in the phase's mode.
    Redeploy,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryStrategy::RestartClean => "restart-clean",
            RecoveryStrategy::Reinitialize => "reinitialize",
            RecoveryStrategy::ResetIntegration => "reset-integration",
            RecoveryStrategy::Redeploy => "redeploy",
        };
        f.write_str(s)
    }
}

/// Whether a phase brings a service up or wires a deferred dependency in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PhaseKind {
    Start,
    Integration { dependency: ServiceName },
}

/// One ordered step of the bootstrap sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    pub service: ServiceName,
    pub mode: BootstrapMode,
    pub kind: PhaseKind,
    pub recovery: RecoveryStrategy,
    #[serde(default)]
    pub status: PhaseStatus,
}

impl Phase {
    /// Start phase for `service`, id `<service>-<suffix>`.
    pub fn start(
        service: ServiceName,
        suffix: &str,
        mode: BootstrapMode,
        recovery: RecoveryStrategy,
    ) -> Self {
        Self {
            id: PhaseId::new(format!("{service}-{suffix}")),
            name: format!("start {service} ({mode})"),
            service,
            mode,
            kind: PhaseKind::Start,
            recovery,
            status: PhaseStatus::Pending,
        }
    }

    /// Integration phase restarting `service` in integrated mode once `dependency` is up.
    pub fn integration(service: ServiceName, dependency: ServiceName) -> Self {
        Self {
            id: PhaseId::new(format!("{service}-{dependency}-integration")),
            name: format!("integrate {service} with {dependency}"),
            service,
            mode: BootstrapMode::Integrated,
            kind: PhaseKind::Integration { dependency },
            recovery: RecoveryStrategy::ResetIntegration,
            status: PhaseStatus::Pending,
        }
    }

    pub fn is_start(&self) -> bool {
        self.kind == PhaseKind::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    #[test]
    fn phase_ids_follow_naming_scheme() {
        let start = Phase::start(
            name("vault"),
            "init",
            BootstrapMode::Integrated,
            RecoveryStrategy::Reinitialize,
        );
        assert_eq!(start.id.as_str(), "vault-init");
        assert!(start.is_start());

        let integration = Phase::integration(name("nomad"), name("vault"));
        assert_eq!(integration.id.as_str(), "nomad-vault-integration");
        assert_eq!(integration.recovery, RecoveryStrategy::ResetIntegration);
        assert_eq!(integration.mode, BootstrapMode::Integrated);
    }

    #[test]
    fn recovery_strategy_uses_kebab_case() {
        let parsed: RecoveryStrategy = serde_yaml::from_str("reset-integration").unwrap();
        assert_eq!(parsed, RecoveryStrategy::ResetIntegration);
        assert_eq!(RecoveryStrategy::RestartClean.to_string(), "restart-clean");
    }
}
