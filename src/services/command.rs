// ABOUTME: Service collaborator backed by configured shell commands.
// ABOUTME: Runs start/stop/snapshot/recovery commands and probes health by URL or command.

use async_trait::async_trait;
use snafu::ResultExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::{ServiceError, SpawnSnafu};
use super::ops::{BootstrapMode, ServiceOps};
use super::probe::http_probe;
use crate::bootstrap::RecoveryStrategy;
use crate::config::{HealthcheckConfig, ServiceConfig};
use crate::types::ServiceName;

/// Drives a service through the shell commands declared in `keystone.yml`.
#[derive(Debug, Clone)]
pub struct CommandService {
    config: ServiceConfig,
    probe_timeout: Duration,
}

impl CommandService {
    pub fn new(config: ServiceConfig, probe_timeout: Duration) -> Self {
        Self {
            config,
            probe_timeout,
        }
    }

    fn shell(&self, command: &str, mode: Option<BootstrapMode>) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("KEYSTONE_SERVICE", self.config.name.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(mode) = mode {
            cmd.env("KEYSTONE_MODE", mode.to_string());
        }
        cmd
    }

    /// Run a command to completion, returning stdout on success.
    async fn run(&self, command: &str, mode: Option<BootstrapMode>) -> Result<Vec<u8>, ServiceError> {
        tracing::debug!(service = %self.config.name, %command, "running service command");

        let output = self
            .shell(command, mode)
            .output()
            .await
            .context(SpawnSnafu {
                service: self.config.name.to_string(),
                command: command.to_string(),
            })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ServiceError::CommandFailed {
                service: self.config.name.to_string(),
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ServiceOps for CommandService {
    fn name(&self) -> &ServiceName {
        &self.config.name
    }

    async fn start(&self, mode: BootstrapMode) -> Result<(), ServiceError> {
        self.run(&self.config.start, Some(mode)).await.map(|_| ())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.run(&self.config.stop, None).await.map(|_| ())
    }

    async fn health_check(&self) -> bool {
        match &self.config.health {
            HealthcheckConfig::Url(url) => http_probe(url, self.probe_timeout).await.is_healthy(),
            HealthcheckConfig::Cmd(command) => {
                let status = tokio::time::timeout(
                    self.probe_timeout,
                    self.shell(command, None)
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .kill_on_drop(true)
                        .status(),
                )
                .await;
                matches!(status, Ok(Ok(status)) if status.success())
            }
        }
    }

    fn supports_snapshot(&self) -> bool {
        self.config.snapshot.is_some()
    }

    async fn snapshot(&self) -> Result<Vec<u8>, ServiceError> {
        let Some(commands) = &self.config.snapshot else {
            return Err(ServiceError::SnapshotUnsupported {
                service: self.config.name.to_string(),
            });
        };
        self.run(&commands.export, None).await
    }

    async fn restore_snapshot(&self, blob: &[u8]) -> Result<(), ServiceError> {
        let Some(commands) = &self.config.snapshot else {
            return Err(ServiceError::SnapshotUnsupported {
                service: self.config.name.to_string(),
            });
        };
        let context = SpawnSnafu {
            service: self.config.name.to_string(),
            command: commands.restore.clone(),
        };

        let mut child = self
            .shell(&commands.restore, None)
            .stdin(Stdio::piped())
            .spawn()
            .context(context.clone())?;

        // Feed stdin while draining stdout and stderr; a command that talks
        // before it reads would otherwise block on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(blob).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.context(context.clone())?;

        if output.status.success() {
            fed.context(context)
        } else {
            Err(ServiceError::CommandFailed {
                service: self.config.name.to_string(),
                command: commands.restore.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn recover(&self, strategy: RecoveryStrategy) -> Result<bool, ServiceError> {
        match self.config.recover.get(&strategy) {
            Some(command) => {
                tracing::info!(service = %self.config.name, %strategy, "running recovery hook");
                self.run(command, None).await.map(|_| true)
            }
            None => Ok(false),
        }
    }
}
