// ABOUTME: Integration tests for deployment tracking and state export/import.
// ABOUTME: Exercises the lifecycle rules, durable replay, torn-tail tolerance, and migration.

use chrono::Utc;
use keystone::state::{PhaseMarkerRecord, StateStore};
use keystone::tracker::{DeploymentStateTracker, DeploymentStatus, TrackerError};
use keystone::types::{CheckpointId, DeploymentId, Environment, PhaseId, RunId};
use std::fs::{self, OpenOptions};
use std::io::Write;

fn tracker() -> (tempfile::TempDir, StateStore, DeploymentStateTracker) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path().join("state")).unwrap();
    let tracker = DeploymentStateTracker::new(&store);
    (dir, store, tracker)
}

fn env(name: &str) -> Environment {
    Environment::new(name).unwrap()
}

mod lifecycle {
    use super::*;

    #[test]
    fn tracked_deployment_starts_in_progress() {
        let (_dir, _, tracker) = tracker();
        let record = tracker
            .track_deployment(DeploymentId::new("d1"), &env("staging"), None)
            .unwrap();

        assert_eq!(record.status, DeploymentStatus::InProgress);
        assert!(record.completed_at.is_none());
        assert!(!tracker.is_terminal(&record.id).unwrap());
    }

    #[test]
    fn success_sets_completion_time() {
        let (_dir, _, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();

        let record = tracker.mark_success(&id).unwrap();

        assert_eq!(record.status, DeploymentStatus::Completed);
        assert!(record.completed_at.is_some());
        assert!(tracker.is_terminal(&id).unwrap());
    }

    #[test]
    fn failure_keeps_reason() {
        let (_dir, _, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();

        let record = tracker.mark_failure(&id, "vault sealed").unwrap();

        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.reason.as_deref(), Some("vault sealed"));
    }

    #[test]
    fn terminal_records_cannot_transition() {
        let (_dir, _, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();
        tracker.mark_success(&id).unwrap();

        let err = tracker.mark_failure(&id, "late").unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[test]
    fn rolled_back_is_reachable_from_in_progress_and_failed() {
        let (_dir, _, tracker) = tracker();
        let checkpoint = CheckpointId::new("pre-deploy-20260101T000000Z");
        let live = DeploymentId::new("d1");
        let failed = DeploymentId::new("d2");
        tracker.track_deployment(live.clone(), &env("staging"), None).unwrap();
        tracker.track_deployment(failed.clone(), &env("staging"), None).unwrap();
        tracker.mark_failure(&failed, "smoke tests").unwrap();

        let record = tracker
            .mark_rolled_back(&live, &checkpoint, "nomad unhealthy")
            .unwrap();
        assert_eq!(record.status, DeploymentStatus::RolledBack);
        assert!(record.completed_at.is_some());
        assert!(record.reason.as_deref().unwrap().contains("pre-deploy-20260101T000000Z"));

        let record = tracker
            .mark_rolled_back(&failed, &checkpoint, "smoke tests")
            .unwrap();
        assert_eq!(record.status, DeploymentStatus::RolledBack);
    }

    #[test]
    fn completed_deployment_cannot_be_rolled_back() {
        let (_dir, _, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();
        tracker.mark_success(&id).unwrap();

        let err = tracker
            .mark_rolled_back(&id, &CheckpointId::new("c1"), "late")
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (_dir, _, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();

        let err = tracker
            .track_deployment(id, &env("staging"), None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::Duplicate(_)));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (_dir, _, tracker) = tracker();
        let err = tracker.mark_success(&DeploymentId::new("ghost")).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }
}

mod queries {
    use super::*;

    #[test]
    fn history_is_newest_first_and_limited() {
        let (_dir, _, tracker) = tracker();
        for n in 1..=4 {
            tracker
                .track_deployment(DeploymentId::new(format!("d{n}")), &env("staging"), None)
                .unwrap();
        }

        let history = tracker.history(2).unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.id.to_string()).collect();

        assert_eq!(ids, ["d4", "d3"]);
        assert_eq!(history.len(), 2);
        // Iteration restarts from the newest record every time.
        assert_eq!(history.iter().next().unwrap().id.as_str(), "d4");
    }

    #[test]
    fn last_successful_is_scoped_to_environment() {
        let (_dir, _, tracker) = tracker();
        let staging = DeploymentId::new("s1");
        let prod = DeploymentId::new("p1");
        tracker.track_deployment(staging.clone(), &env("staging"), None).unwrap();
        tracker.track_deployment(prod.clone(), &env("production"), None).unwrap();
        tracker.mark_success(&staging).unwrap();
        tracker.mark_success(&prod).unwrap();

        let last = tracker.last_successful(&env("staging")).unwrap().unwrap();
        assert_eq!(last.id, staging);
        assert!(tracker.last_successful(&env("dev")).unwrap().is_none());
    }

    #[test]
    fn records_survive_a_new_tracker() {
        let (_dir, store, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();
        tracker.mark_failure(&id, "boom").unwrap();
        drop(tracker);

        let reopened = DeploymentStateTracker::new(&store);
        assert_eq!(reopened.get(&id).unwrap().status, DeploymentStatus::Failed);
    }
}

mod durability {
    use super::*;

    #[test]
    fn torn_final_line_is_ignored_and_repaired() {
        let (_dir, _, tracker) = tracker();
        tracker
            .track_deployment(DeploymentId::new("d1"), &env("staging"), None)
            .unwrap();

        let mut log = OpenOptions::new()
            .append(true)
            .open(tracker.log_path())
            .unwrap();
        log.write_all(br#"{"id":"d2","environ"#).unwrap();
        drop(log);

        assert_eq!(tracker.history(10).unwrap().len(), 1);

        tracker
            .track_deployment(DeploymentId::new("d3"), &env("staging"), None)
            .unwrap();
        let ids: Vec<_> = tracker
            .history(10)
            .unwrap()
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, ["d3", "d1"]);
    }

    #[test]
    fn corrupt_middle_line_is_an_error() {
        let (_dir, _, tracker) = tracker();
        tracker
            .track_deployment(DeploymentId::new("d1"), &env("staging"), None)
            .unwrap();
        let content = fs::read_to_string(tracker.log_path()).unwrap();
        fs::write(tracker.log_path(), format!("garbage\n{content}")).unwrap();

        let err = tracker.history(10).unwrap_err();
        assert!(matches!(err, TrackerError::Corrupt { .. }));
    }
}

mod migration {
    use super::*;

    #[test]
    fn export_then_import_into_fresh_state() {
        let (dir, store, tracker) = tracker();
        let id = DeploymentId::new("d1");
        tracker.track_deployment(id.clone(), &env("staging"), None).unwrap();
        tracker.mark_success(&id).unwrap();
        store
            .markers()
            .mark_complete(&PhaseMarkerRecord {
                phase_id: PhaseId::new("vault-init"),
                name: "start vault (integrated)".to_string(),
                completed_at: Utc::now(),
                run_id: RunId::new("run-1"),
            })
            .unwrap();

        let file = dir.path().join("export.json");
        let export = tracker.export_state(&file).unwrap();
        assert_eq!(export.records.len(), 1);
        assert_eq!(export.markers.len(), 1);

        let (_other_dir, other_store, other) = super::tracker();
        let summary = other.import_state(&file).unwrap();

        assert_eq!(summary.records_imported, 1);
        assert_eq!(summary.markers_restored, 1);
        assert_eq!(other.get(&id).unwrap().status, DeploymentStatus::Completed);
        assert!(other_store.markers().is_complete(&PhaseId::new("vault-init")));

        let again = other.import_state(&file).unwrap();
        assert_eq!(again.records_imported, 0);
        assert_eq!(again.records_skipped, 1);
        assert_eq!(again.markers_restored, 0);
    }

    #[test]
    fn unsupported_export_version_is_rejected() {
        let (dir, _, tracker) = tracker();
        let file = dir.path().join("export.json");
        fs::write(
            &file,
            r#"{"version":99,"exported_at":"2026-01-01T00:00:00Z","records":[],"markers":[]}"#,
        )
        .unwrap();

        let err = tracker.import_state(&file).unwrap_err();
        assert!(matches!(err, TrackerError::UnsupportedVersion(99)));
    }
}
