// ABOUTME: Checkpoint lifecycle: create, list, verify, prune, resolve, drift, restore.
// ABOUTME: Creation holds the environment lock and stages into a .partial directory renamed on success.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::digest::{copy_tree, digest_path, sha256_bytes, size_of};
use super::error::CheckpointError;
use super::manifest::{
    COMPONENTS_DIR, CheckpointMeta, ComponentCheck, ComponentRecord, ComponentSource,
    MANIFEST_FILE, VerificationReport,
};
use crate::config::{CheckpointConfig, ComponentConfig};
use crate::services::{ServiceOps, ServiceRegistry};
use crate::state::{StateStore, fsync_dir, write_json_atomic};
use crate::types::{CheckpointId, Environment};

const PARTIAL_SUFFIX: &str = ".partial";
const SNAPSHOT_EXT: &str = "snap";

/// Newest checkpoints kept by [`CheckpointManager::prune`] regardless of age.
pub const MIN_RETAINED: usize = 3;

/// Outcome of [`CheckpointManager::prune`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub removed: Vec<CheckpointId>,
    pub retained: usize,
    pub partials_removed: usize,
}

/// Live state compared against a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub changed: Vec<String>,
    pub missing: Vec<String>,
    pub unchanged: Vec<String>,
    /// Snapshot-captured components, which cannot be compared byte for byte.
    pub skipped: Vec<String>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.changed.is_empty() || !self.missing.is_empty()
    }
}

/// Creates and inspects checkpoints under `<state_dir>/checkpoints`.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    store: StateStore,
    environment: Environment,
    components: Vec<ComponentConfig>,
    registry: ServiceRegistry,
    config: CheckpointConfig,
}

impl CheckpointManager {
    pub fn new(
        store: StateStore,
        environment: Environment,
        components: Vec<ComponentConfig>,
        registry: ServiceRegistry,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            store,
            environment,
            components,
            registry,
            config,
        }
    }

    fn dir_for(&self, id: &CheckpointId) -> PathBuf {
        self.store.checkpoints_dir().join(id.as_str())
    }

    /// Capture every tracked component.
    ///
    /// Holds the environment lock for the whole operation. On error or
    /// timeout the staging directory is removed and nothing is published.
    pub async fn create(&self, name: &str) -> Result<CheckpointMeta, CheckpointError> {
        validate_name(name)?;
        let lock = self
            .store
            .lock(&self.environment, "checkpoint", self.config.lease)?;

        let id = self.next_id(name);
        let staging = self
            .store
            .checkpoints_dir()
            .join(format!("{id}{PARTIAL_SUFFIX}"));
        tracing::info!(checkpoint = %id, components = self.components.len(), "creating checkpoint");

        let copies = CopyTasks::default();
        let captured = tokio::time::timeout(
            self.config.timeout,
            self.capture(&id, name, &staging, &copies),
        )
        .await;

        let meta = match captured {
            Ok(Ok(meta)) => meta,
            Ok(Err(e)) => {
                copies.cancel_and_drain().await;
                remove_dir_quietly(&staging);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(checkpoint = %id, "checkpoint timed out, discarding staged data");
                copies.cancel_and_drain().await;
                remove_dir_quietly(&staging);
                return Err(CheckpointError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                });
            }
        };

        let final_dir = self.dir_for(&id);
        std::fs::rename(&staging, &final_dir).map_err(|e| CheckpointError::io(&final_dir, e))?;
        let root = self.store.checkpoints_dir();
        fsync_dir(&root).map_err(|e| CheckpointError::io(&root, e))?;
        lock.release()?;

        tracing::info!(checkpoint = %id, size_bytes = meta.size_bytes, "checkpoint created");
        Ok(meta)
    }

    /// `<name>-<timestamp>`, suffixed when two checkpoints land in the same second.
    fn next_id(&self, name: &str) -> CheckpointId {
        let base = format!("{name}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
        let taken = |candidate: &str| {
            let root = self.store.checkpoints_dir();
            root.join(candidate).exists()
                || root.join(format!("{candidate}{PARTIAL_SUFFIX}")).exists()
        };

        if !taken(&base) {
            return CheckpointId::new(base);
        }
        let mut n = 2;
        while taken(&format!("{base}-{n}")) {
            n += 1;
        }
        CheckpointId::new(format!("{base}-{n}"))
    }

    async fn capture(
        &self,
        id: &CheckpointId,
        name: &str,
        staging: &Path,
        copies: &CopyTasks,
    ) -> Result<CheckpointMeta, CheckpointError> {
        let components_dir = staging.join(COMPONENTS_DIR);
        std::fs::create_dir_all(&components_dir)
            .map_err(|e| CheckpointError::io(&components_dir, e))?;

        let mut records = BTreeMap::new();
        for component in &self.components {
            let record = match self.snapshot_owner(component) {
                Some(service) => {
                    capture_snapshot(component, service.as_ref(), &components_dir).await?
                }
                None => capture_copy(component, &components_dir, copies).await?,
            };
            tracing::debug!(component = %component.name, checksum = %record.checksum, "component captured");
            records.insert(component.name.clone(), record);
        }

        // Re-read every staged payload before publishing.
        for (component, record) in &records {
            let stored = staging.join(&record.stored);
            let actual = digest_path(&stored).map_err(|e| CheckpointError::io(&stored, e))?;
            if actual != record.checksum {
                return Err(CheckpointError::Corrupt {
                    id: id.to_string(),
                    failed: vec![component.clone()],
                });
            }
        }

        let meta = CheckpointMeta {
            id: id.clone(),
            name: name.to_string(),
            environment: self.environment.to_string(),
            created_at: Utc::now(),
            size_bytes: records.values().map(|r| r.size_bytes).sum(),
            components: records,
            verified: true,
        };

        let manifest = staging.join(MANIFEST_FILE);
        write_json_atomic(&manifest, &meta).map_err(|e| CheckpointError::io(&manifest, e))?;
        Ok(meta)
    }

    fn snapshot_owner(&self, component: &ComponentConfig) -> Option<Arc<dyn ServiceOps>> {
        let owner = component.service.as_ref()?;
        self.registry
            .get(owner)
            .filter(|service| service.supports_snapshot())
    }

    /// All checkpoints, newest first. Only manifests are read.
    pub fn list(&self) -> Result<Vec<CheckpointMeta>, CheckpointError> {
        let root = self.store.checkpoints_dir();
        let entries = std::fs::read_dir(&root).map_err(|e| CheckpointError::io(&root, e))?;

        let mut metas = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CheckpointError::io(&root, e))?.path();
            if !path.is_dir() || is_partial(&path) {
                continue;
            }
            match CheckpointMeta::read(&path) {
                Ok(meta) => metas.push(meta),
                Err(e) => tracing::warn!("skipping unreadable checkpoint {}: {}", path.display(), e),
            }
        }

        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(metas)
    }

    pub fn get(&self, id: &CheckpointId) -> Result<CheckpointMeta, CheckpointError> {
        let dir = self.dir_for(id);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(CheckpointError::NotFound(id.to_string()));
        }
        CheckpointMeta::read(&dir)
    }

    /// Look a checkpoint up by id, or by name (newest with that name).
    pub fn resolve(&self, reference: &str) -> Result<CheckpointMeta, CheckpointError> {
        let id = CheckpointId::new(reference);
        if self.dir_for(&id).join(MANIFEST_FILE).is_file() {
            return self.get(&id);
        }
        self.list()?
            .into_iter()
            .find(|meta| meta.name == reference)
            .ok_or_else(|| CheckpointError::NotFound(reference.to_string()))
    }

    /// Re-hash every stored payload against the manifest.
    pub fn verify(&self, id: &CheckpointId) -> Result<VerificationReport, CheckpointError> {
        let meta = self.get(id)?;
        let dir = self.dir_for(id);

        let components = meta
            .components
            .iter()
            .map(|(name, record)| {
                let stored = dir.join(&record.stored);
                let actual = if stored.exists() {
                    digest_path(&stored).ok()
                } else {
                    None
                };
                ComponentCheck {
                    name: name.clone(),
                    passed: actual.as_deref() == Some(record.checksum.as_str()),
                    expected: record.checksum.clone(),
                    actual,
                }
            })
            .collect();

        let report = VerificationReport {
            checkpoint: meta.id,
            components,
        };
        if !report.passed() {
            tracing::warn!(checkpoint = %id, failed = ?report.failures(), "checkpoint verification failed");
        }
        Ok(report)
    }

    /// Delete checkpoints older than `retention_days`, always keeping the
    /// newest [`MIN_RETAINED`]. Stale staging directories are removed too.
    pub fn prune(&self, retention_days: u32) -> Result<PruneReport, CheckpointError> {
        let _lock = self
            .store
            .lock(&self.environment, "cleanup", self.config.lease)?;
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let mut report = PruneReport::default();

        for (index, meta) in self.list()?.into_iter().enumerate() {
            if index < MIN_RETAINED || meta.created_at >= cutoff {
                report.retained += 1;
                continue;
            }
            let dir = self.dir_for(&meta.id);
            std::fs::remove_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
            tracing::info!(checkpoint = %meta.id, "pruned checkpoint");
            report.removed.push(meta.id);
        }

        let root = self.store.checkpoints_dir();
        let entries = std::fs::read_dir(&root).map_err(|e| CheckpointError::io(&root, e))?;
        for entry in entries {
            let path = entry.map_err(|e| CheckpointError::io(&root, e))?.path();
            if path.is_dir() && is_partial(&path) {
                std::fs::remove_dir_all(&path).map_err(|e| CheckpointError::io(&path, e))?;
                report.partials_removed += 1;
            }
        }

        fsync_dir(&root).map_err(|e| CheckpointError::io(&root, e))?;
        Ok(report)
    }

    /// Compare live component state with a checkpoint. Read-only.
    pub fn drift(&self, id: &CheckpointId) -> Result<DriftReport, CheckpointError> {
        let meta = self.get(id)?;
        let mut report = DriftReport::default();

        for (name, record) in &meta.components {
            if matches!(record.source, ComponentSource::Snapshot { .. }) {
                report.skipped.push(name.clone());
                continue;
            }
            if !record.path.exists() {
                report.missing.push(name.clone());
                continue;
            }
            match digest_path(&record.path) {
                Ok(digest) if digest == record.checksum => report.unchanged.push(name.clone()),
                _ => report.changed.push(name.clone()),
            }
        }
        Ok(report)
    }

    /// Put one component back to its checkpointed state.
    ///
    /// The owning service must already be stopped for copy-captured
    /// components. The restored content is re-hashed afterwards.
    pub async fn restore_component(
        &self,
        meta: &CheckpointMeta,
        name: &str,
    ) -> Result<(), CheckpointError> {
        let record = meta
            .components
            .get(name)
            .ok_or_else(|| CheckpointError::UnknownComponent {
                id: meta.id.to_string(),
                name: name.to_string(),
            })?;
        let stored = self.dir_for(&meta.id).join(&record.stored);

        match &record.source {
            ComponentSource::Snapshot { service } => {
                let collaborator = self
                    .registry
                    .get(service)
                    .ok_or_else(|| CheckpointError::UnknownComponent {
                        id: meta.id.to_string(),
                        name: name.to_string(),
                    })?;
                let blob = std::fs::read(&stored).map_err(|e| CheckpointError::io(&stored, e))?;
                if sha256_bytes(&blob) != record.checksum {
                    return Err(CheckpointError::RestoreMismatch {
                        name: name.to_string(),
                    });
                }
                collaborator.restore_snapshot(&blob).await?;
            }
            ComponentSource::File | ComponentSource::Directory => {
                let target = record.path.clone();
                let source = record.source.clone();
                tokio::task::spawn_blocking(move || restore_copy(&stored, &target, &source))
                    .await
                    .map_err(|e| CheckpointError::io(&record.path, std::io::Error::other(e)))?
                    .map_err(|e| CheckpointError::io(&record.path, e))?;

                let actual = digest_path(&record.path)
                    .map_err(|e| CheckpointError::io(&record.path, e))?;
                if actual != record.checksum {
                    return Err(CheckpointError::RestoreMismatch {
                        name: name.to_string(),
                    });
                }
            }
        }

        tracing::info!(checkpoint = %meta.id, component = name, "component restored");
        Ok(())
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

async fn capture_snapshot(
    component: &ComponentConfig,
    service: &dyn ServiceOps,
    components_dir: &Path,
) -> Result<ComponentRecord, CheckpointError> {
    let blob = service.snapshot().await?;
    let file_name = format!("{}.{SNAPSHOT_EXT}", component.name);
    let path = components_dir.join(&file_name);
    std::fs::write(&path, &blob).map_err(|e| CheckpointError::io(&path, e))?;

    Ok(ComponentRecord {
        path: component.path.clone(),
        stored: Path::new(COMPONENTS_DIR).join(file_name),
        checksum: sha256_bytes(&blob),
        source: ComponentSource::Snapshot {
            service: service.name().clone(),
        },
        size_bytes: blob.len() as u64,
    })
}

/// Blocking copies started by one capture.
///
/// Dropping the capture future does not stop a `spawn_blocking` task, so the
/// handles are kept until the staging directory is gone.
#[derive(Default)]
struct CopyTasks {
    cancelled: Arc<AtomicBool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl CopyTasks {
    fn spawn<T, F>(&self, work: F) -> oneshot::Receiver<std::io::Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicBool) -> std::io::Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancelled = self.cancelled.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _ = tx.send(work(&cancelled));
        });
        self.handles.lock().push(handle);
        rx
    }

    /// Stop pending copies and wait until none is still writing.
    async fn cancel_and_drain(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("checkpoint copy task failed: {}", e);
            }
        }
    }
}

async fn capture_copy(
    component: &ComponentConfig,
    components_dir: &Path,
    copies: &CopyTasks,
) -> Result<ComponentRecord, CheckpointError> {
    let live = component.path.clone();
    if !live.exists() {
        return Err(CheckpointError::MissingComponent {
            name: component.name.clone(),
            path: live,
        });
    }

    let target = components_dir.join(&component.name);
    let is_dir = live.is_dir();
    let copy_from = live.clone();
    let copy_to = target.clone();
    let (checksum, size_bytes) = copies
        .spawn(move |cancelled| {
            if is_dir {
                copy_tree(&copy_from, &copy_to, cancelled)?;
            } else {
                std::fs::copy(&copy_from, &copy_to)?;
            }
            Ok((digest_path(&copy_from)?, size_of(&copy_to)?))
        })
        .await
        .map_err(|e| CheckpointError::io(&live, std::io::Error::other(e)))?
        .map_err(|e| CheckpointError::io(&live, e))?;

    Ok(ComponentRecord {
        path: live,
        stored: Path::new(COMPONENTS_DIR).join(&component.name),
        checksum,
        source: if is_dir {
            ComponentSource::Directory
        } else {
            ComponentSource::File
        },
        size_bytes,
    })
}

/// Replace `target` with the stored copy.
fn restore_copy(stored: &Path, target: &Path, source: &ComponentSource) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match source {
        ComponentSource::Directory => {
            if target.exists() {
                std::fs::remove_dir_all(target)?;
            }
            copy_tree(stored, target, &AtomicBool::new(false))?;
        }
        _ => {
            let tmp = target.with_extension("keystone-restore");
            std::fs::copy(stored, &tmp)?;
            std::fs::rename(&tmp, target)?;
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), CheckpointError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(PARTIAL_SUFFIX)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidName(name.to_string()))
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!("failed to remove {}: {}", path.display(), e);
    }
}
