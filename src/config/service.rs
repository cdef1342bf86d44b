// ABOUTME: Per-service and per-component configuration entries.
// ABOUTME: Declares dependencies, bootstrap mode, lifecycle commands, and tracked state.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use super::HealthcheckConfig;
use crate::bootstrap::RecoveryStrategy;
use crate::services::BootstrapMode;
use crate::types::ServiceName;

/// Criticality of a service for health-triggered rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Sustained failure triggers auto-rollback.
    Critical,
    /// Failures are reported but never trigger rollback.
    #[default]
    Standard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceName,

    #[serde(default)]
    pub depends_on: BTreeSet<ServiceName>,

    #[serde(default)]
    pub bootstrap_mode: BootstrapMode,

    #[serde(default)]
    pub tier: Tier,

    pub start: String,

    pub stop: String,

    #[serde(with = "serde_yaml::with::singleton_map")]
    pub health: HealthcheckConfig,

    /// Start-phase suffix (`init` yields `vault-init`).
    #[serde(default)]
    pub phase: Option<String>,

    /// Recovery strategy for the start phase, overriding the planner default.
    #[serde(default)]
    pub recovery: Option<RecoveryStrategy>,

    #[serde(default)]
    pub snapshot: Option<SnapshotCommands>,

    /// Commands that replace the built-in behavior of a recovery strategy.
    #[serde(default)]
    pub recover: HashMap<RecoveryStrategy, String>,
}

/// Consistent-snapshot commands exposed by a service (e.g. a raft snapshot).
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotCommands {
    /// Writes the snapshot blob to stdout.
    pub export: String,
    /// Reads the snapshot blob from stdin.
    pub restore: String,
}

/// A piece of state captured by checkpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    pub name: String,

    pub path: PathBuf,

    /// Owning service; its snapshot API is preferred over copying `path`.
    #[serde(default)]
    pub service: Option<ServiceName>,
}
