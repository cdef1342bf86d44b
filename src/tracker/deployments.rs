// ABOUTME: Deployment state tracker over the record log and phase markers.
// ABOUTME: Enforces unique ids, terminal statuses, and checkpoint existence for tracked deployments.

use chrono::Utc;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use super::error::TrackerError;
use super::export::{EXPORT_VERSION, ImportSummary, StateExport};
use super::log::RecordLog;
use super::record::{DeploymentRecord, DeploymentStatus};
use crate::checkpoint::CheckpointMeta;
use crate::state::{MarkerStore, StateStore, write_json_atomic};
use crate::types::{CheckpointId, DeploymentId, Environment};

/// Records deployment attempts and their outcomes.
///
/// Clones share a write mutex so concurrent tasks in one process never
/// interleave a read-check-append sequence.
#[derive(Debug, Clone)]
pub struct DeploymentStateTracker {
    log: RecordLog,
    markers: MarkerStore,
    write: Arc<Mutex<()>>,
}

impl DeploymentStateTracker {
    pub fn new(store: &StateStore) -> Self {
        Self {
            log: RecordLog::new(store.deployments_log()),
            markers: store.markers(),
            write: Arc::new(Mutex::new(())),
        }
    }

    /// Start tracking a deployment in `in_progress`.
    ///
    /// The checkpoint is taken as metadata from the checkpoint manager, so a
    /// record can only reference a checkpoint that exists.
    pub fn track_deployment(
        &self,
        id: DeploymentId,
        environment: &Environment,
        checkpoint: Option<&CheckpointMeta>,
    ) -> Result<DeploymentRecord, TrackerError> {
        let _guard = self.write.lock();
        if self.find(&id)?.is_some() {
            return Err(TrackerError::Duplicate(id));
        }

        let record = DeploymentRecord {
            id,
            environment: environment.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: DeploymentStatus::InProgress,
            checkpoint_id: checkpoint.map(|meta| meta.id.clone()),
            reason: None,
        };
        self.log.append(&record)?;
        tracing::info!(deployment = %record.id, checkpoint = ?record.checkpoint_id, "tracking deployment");
        Ok(record)
    }

    pub fn mark_success(&self, id: &DeploymentId) -> Result<DeploymentRecord, TrackerError> {
        self.transition(id, DeploymentStatus::Completed, None)
    }

    pub fn mark_failure(
        &self,
        id: &DeploymentId,
        reason: &str,
    ) -> Result<DeploymentRecord, TrackerError> {
        self.transition(id, DeploymentStatus::Failed, Some(reason.to_string()))
    }

    /// Record that the deployment was undone by restoring `checkpoint`.
    ///
    /// Allowed from `in_progress` and from `failed`, since a failure is
    /// recorded before the rollback it triggers.
    pub fn mark_rolled_back(
        &self,
        id: &DeploymentId,
        checkpoint: &CheckpointId,
        reason: &str,
    ) -> Result<DeploymentRecord, TrackerError> {
        self.transition(
            id,
            DeploymentStatus::RolledBack,
            Some(format!("rolled back to {checkpoint}: {reason}")),
        )
    }

    fn transition(
        &self,
        id: &DeploymentId,
        to: DeploymentStatus,
        reason: Option<String>,
    ) -> Result<DeploymentRecord, TrackerError> {
        let _guard = self.write.lock();
        let mut record = self
            .find(id)?
            .ok_or_else(|| TrackerError::NotFound(id.clone()))?;

        let allowed = match record.status {
            DeploymentStatus::InProgress => true,
            DeploymentStatus::Failed => to == DeploymentStatus::RolledBack,
            DeploymentStatus::Completed | DeploymentStatus::RolledBack => false,
        };
        if !allowed {
            return Err(TrackerError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to,
            });
        }

        record.status = to;
        record.completed_at = Some(Utc::now());
        record.reason = reason;
        self.log.append(&record)?;
        tracing::info!(deployment = %id, status = %to, "deployment finished");
        Ok(record)
    }

    /// Write a record that is terminal from the start (rollback outcomes).
    pub fn record_terminal(
        &self,
        id: DeploymentId,
        environment: &Environment,
        status: DeploymentStatus,
        checkpoint: Option<&CheckpointMeta>,
        reason: &str,
    ) -> Result<DeploymentRecord, TrackerError> {
        let _guard = self.write.lock();
        if self.find(&id)?.is_some() {
            return Err(TrackerError::Duplicate(id));
        }

        let now = Utc::now();
        let record = DeploymentRecord {
            id,
            environment: environment.to_string(),
            started_at: now,
            completed_at: Some(now),
            status,
            checkpoint_id: checkpoint.map(|meta| meta.id.clone()),
            reason: Some(reason.to_string()),
        };
        self.log.append(&record)?;
        tracing::info!(deployment = %record.id, status = %status, "recorded deployment outcome");
        Ok(record)
    }

    pub fn get(&self, id: &DeploymentId) -> Result<DeploymentRecord, TrackerError> {
        self.find(id)?
            .ok_or_else(|| TrackerError::NotFound(id.clone()))
    }

    fn find(&self, id: &DeploymentId) -> Result<Option<DeploymentRecord>, TrackerError> {
        Ok(self.log.replay()?.into_iter().find(|r| &r.id == id))
    }

    /// Most recent completed deployment in `environment`.
    pub fn last_successful(
        &self,
        environment: &Environment,
    ) -> Result<Option<DeploymentRecord>, TrackerError> {
        let env = environment.to_string();
        Ok(self
            .log
            .replay()?
            .into_iter()
            .filter(|r| r.status == DeploymentStatus::Completed && r.environment == env)
            .max_by_key(|r| r.completed_at.unwrap_or(r.started_at)))
    }

    /// Records newest first, at most `limit` of them.
    pub fn history(&self, limit: usize) -> Result<History, TrackerError> {
        let mut records = self.log.replay()?;
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(History { records, limit })
    }

    /// Write every record and phase marker to `path` as JSON.
    pub fn export_state(&self, path: &Path) -> Result<StateExport, TrackerError> {
        let export = StateExport {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            records: self.log.replay()?,
            markers: self.markers.list()?,
        };
        write_json_atomic(path, &export).map_err(|e| TrackerError::io(path, e))?;
        tracing::info!(
            records = export.records.len(),
            markers = export.markers.len(),
            "exported state to {}",
            path.display()
        );
        Ok(export)
    }

    /// Merge an export into local state.
    ///
    /// Records with unknown ids are appended; known ids are skipped. Markers
    /// are restored only where none exists locally.
    pub fn import_state(&self, path: &Path) -> Result<ImportSummary, TrackerError> {
        let content = std::fs::read(path).map_err(|e| TrackerError::io(path, e))?;
        let export: StateExport =
            serde_json::from_slice(&content).map_err(|source| TrackerError::Export {
                path: path.to_path_buf(),
                source,
            })?;
        if export.version != EXPORT_VERSION {
            return Err(TrackerError::UnsupportedVersion(export.version));
        }

        let _guard = self.write.lock();
        let known: std::collections::HashSet<DeploymentId> =
            self.log.replay()?.into_iter().map(|r| r.id).collect();
        let mut summary = ImportSummary::default();

        for record in &export.records {
            if known.contains(&record.id) {
                summary.records_skipped += 1;
                continue;
            }
            self.log.append(record)?;
            summary.records_imported += 1;
        }

        for marker in &export.markers {
            if self.markers.is_complete(&marker.phase_id) {
                continue;
            }
            self.markers.mark_complete(marker)?;
            summary.markers_restored += 1;
        }

        tracing::info!(
            imported = summary.records_imported,
            skipped = summary.records_skipped,
            markers = summary.markers_restored,
            "imported state from {}",
            path.display()
        );
        Ok(summary)
    }

    /// Whether the deployment has reached a terminal status.
    pub fn is_terminal(&self, id: &DeploymentId) -> Result<bool, TrackerError> {
        Ok(self.get(id)?.is_terminal())
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }
}

/// Reverse-chronological view over deployment records.
///
/// Iteration is lazy and can be restarted: every call to [`History::iter`]
/// starts again from the newest record.
#[derive(Debug, Clone)]
pub struct History {
    records: Vec<DeploymentRecord>,
    limit: usize,
}

impl History {
    pub fn iter(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.iter().take(self.limit)
    }

    pub fn len(&self) -> usize {
        self.records.len().min(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a DeploymentRecord;
    type IntoIter = std::iter::Take<std::slice::Iter<'a, DeploymentRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter().take(self.limit)
    }
}
