// ABOUTME: Configuration types and parsing for keystone.yml.
// ABOUTME: Handles YAML parsing, defaults, and cross-field validation.

mod deserialize;
mod healthcheck;
mod init;
mod service;
mod verification;

pub use healthcheck::HealthcheckConfig;
pub use init::init_config;
pub use service::{ComponentConfig, ServiceConfig, SnapshotCommands, Tier};
pub use verification::RetryPolicy;

use crate::error::{Error, Result};
use crate::types::{Environment, ServiceName};
use deserialize::deserialize_services;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "keystone.yml";
pub const CONFIG_FILENAME_ALT: &str = "keystone.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".keystone/config.yml";

/// Control plane configuration, read once at startup and shared immutably.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(deserialize_with = "deserialize_services")]
    pub services: NonEmpty<ServiceConfig>,

    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    #[serde(default)]
    pub verification: RetryPolicy,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub rollback: RollbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_max_failure_checks")]
    pub max_failure_checks: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_monitor_interval(),
            max_failure_checks: default_max_failure_checks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Overall bound on checkpoint creation; partial artifacts are deleted after it.
    #[serde(default = "default_checkpoint_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Age after which an environment lock is considered abandoned.
    #[serde(default = "default_lease", with = "humantime_serde")]
    pub lease: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            timeout: default_checkpoint_timeout(),
            lease: default_lease(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RollbackConfig {
    /// Roll back to the newest verified checkpoint when a deployment is marked failed.
    #[serde(default)]
    pub auto_on_failure: bool,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".keystone")
}

fn default_retention_days() -> u32 {
    7
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_failure_checks() -> u32 {
    3
}

fn default_checkpoint_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_lease() -> Duration {
    Duration::from_secs(3600)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Look up a declared service.
    pub fn service(&self, name: &ServiceName) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| &s.name == name)
    }

    /// Cross-field checks that serde cannot express.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(&service.name) {
                return Err(Error::InvalidConfig(format!(
                    "service '{}' declared more than once",
                    service.name
                )));
            }
            if let Some(suffix) = &service.phase {
                ServiceName::new(suffix).map_err(|e| {
                    Error::InvalidConfig(format!(
                        "invalid phase suffix for '{}': {}",
                        service.name, e
                    ))
                })?;
            }
        }

        let mut components = HashSet::new();
        for component in &self.components {
            if !components.insert(component.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "component '{}' declared more than once",
                    component.name
                )));
            }
            if component.name.is_empty() || component.name.contains(['/', '\\']) {
                return Err(Error::InvalidConfig(format!(
                    "invalid component name '{}'",
                    component.name
                )));
            }
            if let Some(owner) = &component.service
                && !seen.contains(owner)
            {
                return Err(Error::InvalidConfig(format!(
                    "component '{}' references unknown service '{}'",
                    component.name, owner
                )));
            }
        }

        if self.verification.attempts == 0 {
            return Err(Error::InvalidConfig(
                "verification.attempts must be at least 1".to_string(),
            ));
        }

        if self.monitor.max_failure_checks == 0 {
            return Err(Error::InvalidConfig(
                "monitor.max_failure_checks must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
