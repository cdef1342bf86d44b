// ABOUTME: Config scaffolding for new control planes.
// ABOUTME: Writes a keystone.yml template for the scheduler, secret store, and proxy trio.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Environment;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, environment: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let environment = match environment {
        Some(name) => Environment::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => Environment::default(),
    };

    let yaml = template_yaml(&environment);
    // Never write a template we cannot load back.
    Config::from_yaml(&yaml)?;
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn template_yaml(environment: &Environment) -> String {
    format!(
        r#"environment: {environment}
state_dir: .keystone
retention_days: 7

services:
  - name: nomad
    depends_on: [vault]
    # Nomad needs Vault tokens, but Vault runs as a Nomad job:
    # the first boot starts Nomad without its Vault integration.
    bootstrap_mode: standalone
    tier: critical
    start: "systemctl restart nomad"
    stop: "systemctl stop nomad"
    health:
      url: "http://127.0.0.1:4646/v1/status/leader"

  - name: vault
    depends_on: [nomad]
    tier: critical
    phase: init
    recovery: reinitialize
    start: "nomad job run jobs/vault.nomad"
    stop: "nomad job stop vault"
    health:
      url: "http://127.0.0.1:8200/v1/sys/health"
    snapshot:
      export: "vault operator raft snapshot save /dev/stdout"
      restore: "vault operator raft snapshot restore -force /dev/stdin"

  - name: traefik
    depends_on: [nomad, vault]
    start: "nomad job run jobs/traefik.nomad"
    stop: "nomad job stop traefik"
    health:
      cmd: "curl -fsS http://127.0.0.1:8080/ping"

components:
  - name: nomad-config
    path: /etc/nomad.d
  - name: vault-data
    path: /opt/vault/data
    service: vault
  - name: traefik-config
    path: /etc/traefik

verification:
  attempts: 5
  backoff: 2s
  max_backoff: 30s
  attempt_timeout: 5s

monitor:
  interval: 10s
  max_failure_checks: 3

checkpoint:
  timeout: 5m
  lease: 1h

rollback:
  auto_on_failure: true
"#
    )
}
