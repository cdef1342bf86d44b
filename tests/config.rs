// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, cross-field checks, discovery, and scaffolding.

use keystone::bootstrap::RecoveryStrategy;
use keystone::config::*;
use keystone::services::BootstrapMode;
use keystone::types::ServiceName;
use std::path::PathBuf;
use std::time::Duration;

const MINIMAL: &str = r#"
services:
  - name: app
    start: "systemctl start app"
    stop: "systemctl stop app"
    health:
      url: "http://127.0.0.1:8080/health"
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.environment.as_str(), "production");
        assert_eq!(config.state_dir, PathBuf::from(".keystone"));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.services.len(), 1);
        assert!(config.components.is_empty());
        assert_eq!(config.verification, RetryPolicy::default());
        assert_eq!(config.monitor.interval, Duration::from_secs(10));
        assert_eq!(config.monitor.max_failure_checks, 3);
        assert!(!config.rollback.auto_on_failure);

        let app = &config.services.head;
        assert_eq!(app.bootstrap_mode, BootstrapMode::Integrated);
        assert_eq!(app.tier, Tier::Standard);
        assert_eq!(
            app.health,
            HealthcheckConfig::Url("http://127.0.0.1:8080/health".to_string())
        );
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
environment: staging
state_dir: /var/lib/keystone
retention_days: 14

verification:
  attempts: 10
  backoff: 2s
  max_backoff: 1m
  attempt_timeout: 3s

monitor:
  interval: 30s
  max_failure_checks: 5

checkpoint:
  timeout: 10m
  lease: 2h

rollback:
  auto_on_failure: true

services:
  - name: nomad
    depends_on: [vault]
    bootstrap_mode: standalone
    tier: critical
    start: "systemctl restart nomad"
    stop: "systemctl stop nomad"
    health:
      url: "http://127.0.0.1:4646/v1/status/leader"
    recover:
      reset-integration: "nomad-reset.sh"

  - name: vault
    depends_on: [nomad]
    tier: critical
    phase: init
    recovery: reinitialize
    start: "nomad job run vault.nomad"
    stop: "nomad job stop vault"
    health:
      cmd: "vault status"
    snapshot:
      export: "vault operator raft snapshot save /dev/stdout"
      restore: "vault operator raft snapshot restore -force /dev/stdin"

components:
  - name: vault-data
    path: /opt/vault/data
    service: vault
  - name: nomad-jobs
    path: /etc/nomad/jobs
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.environment.as_str(), "staging");
        assert_eq!(config.retention_days, 14);
        assert_eq!(config.verification.attempts, 10);
        assert_eq!(config.verification.backoff, Duration::from_secs(2));
        assert_eq!(config.verification.max_backoff, Duration::from_secs(60));
        assert_eq!(config.monitor.interval, Duration::from_secs(30));
        assert_eq!(config.checkpoint.timeout, Duration::from_secs(600));
        assert_eq!(config.checkpoint.lease, Duration::from_secs(7200));
        assert!(config.rollback.auto_on_failure);

        let nomad = config.service(&ServiceName::new("nomad").unwrap()).unwrap();
        assert_eq!(nomad.bootstrap_mode, BootstrapMode::Standalone);
        assert_eq!(nomad.tier, Tier::Critical);
        assert_eq!(
            nomad.recover.get(&RecoveryStrategy::ResetIntegration).map(String::as_str),
            Some("nomad-reset.sh")
        );

        let vault = config.service(&ServiceName::new("vault").unwrap()).unwrap();
        assert_eq!(vault.phase.as_deref(), Some("init"));
        assert_eq!(vault.recovery, Some(RecoveryStrategy::Reinitialize));
        assert!(vault.snapshot.is_some());

        assert_eq!(config.components.len(), 2);
        assert_eq!(config.components[0].service.as_ref().unwrap().as_str(), "vault");
    }
}

mod validation {
    use super::*;

    fn rejected(yaml: &str) -> String {
        Config::from_yaml(yaml).unwrap_err().to_string()
    }

    #[test]
    fn empty_service_list_is_rejected() {
        assert!(Config::from_yaml("services: []\n").is_err());
    }

    #[test]
    fn duplicate_services_are_rejected() {
        let yaml = format!("{MINIMAL}{}", MINIMAL.replace("services:\n", ""));
        assert!(rejected(&yaml).contains("more than once"));
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        assert!(Config::from_yaml(&MINIMAL.replace("name: app", "name: My_App")).is_err());
    }

    #[test]
    fn component_with_unknown_owner_is_rejected() {
        let yaml = format!("{MINIMAL}components:\n  - name: data\n    path: /data\n    service: ghost\n");
        assert!(rejected(&yaml).contains("unknown service"));
    }

    #[test]
    fn component_name_with_path_separator_is_rejected() {
        let yaml = format!("{MINIMAL}components:\n  - name: a/b\n    path: /data\n");
        assert!(rejected(&yaml).contains("invalid component name"));
    }

    #[test]
    fn zero_verification_attempts_are_rejected() {
        let yaml = format!("{MINIMAL}verification:\n  attempts: 0\n");
        assert!(rejected(&yaml).contains("verification.attempts"));
    }

    #[test]
    fn zero_failure_checks_are_rejected() {
        let yaml = format!("{MINIMAL}monitor:\n  max_failure_checks: 0\n");
        assert!(rejected(&yaml).contains("max_failure_checks"));
    }

    #[test]
    fn unknown_recovery_strategy_is_rejected() {
        let yaml = MINIMAL.replace("    start:", "    recovery: pray\n    start:");
        assert!(Config::from_yaml(&yaml).is_err());
    }
}

mod discovery {
    use super::*;

    #[test]
    fn discovers_alternate_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".keystone")).unwrap();
        std::fs::write(dir.path().join(".keystone/config.yml"), MINIMAL).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.services.len(), 1);
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn init_template_loads_and_plans() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("staging"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.environment.as_str(), "staging");
        assert_eq!(config.services.len(), 3);

        let plan = keystone::planner::DependencyGraphPlanner::from_config(&config)
            .plan()
            .unwrap();
        assert_eq!(plan.deferred().len(), 1);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, false).unwrap();

        assert!(init_config(dir.path(), None, false).is_err());
        assert!(init_config(dir.path(), None, true).is_ok());
    }
}
