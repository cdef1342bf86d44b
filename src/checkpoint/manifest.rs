// ABOUTME: On-disk checkpoint manifest and verification report types.
// ABOUTME: The manifest is the only file read when listing checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::CheckpointError;
use crate::types::{CheckpointId, ServiceName};

pub(super) const MANIFEST_FILE: &str = "manifest.json";
pub(super) const COMPONENTS_DIR: &str = "components";

/// How a component was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ComponentSource {
    /// Consistent snapshot exported by the owning service.
    Snapshot { service: ServiceName },
    /// Copy of a single file.
    File,
    /// Recursive copy of a directory.
    Directory,
}

/// One captured component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Live location of the component.
    pub path: PathBuf,
    /// Location of the payload relative to the checkpoint directory.
    pub stored: PathBuf,
    pub checksum: String,
    pub source: ComponentSource,
    pub size_bytes: u64,
}

/// Checkpoint metadata as written to `manifest.json`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub id: CheckpointId,
    pub name: String,
    pub environment: String,
    pub created_at: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentRecord>,
    pub size_bytes: u64,
    /// Every payload was re-hashed after staging and matched.
    pub verified: bool,
}

impl CheckpointMeta {
    pub(super) fn read(dir: &Path) -> Result<Self, CheckpointError> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read(&path).map_err(|e| CheckpointError::io(&path, e))?;
        serde_json::from_slice(&content).map_err(|source| CheckpointError::Manifest { path, source })
    }
}

/// Result of checking one stored component against the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    pub name: String,
    pub passed: bool,
    pub expected: String,
    /// `None` when the stored payload is missing or unreadable.
    pub actual: Option<String>,
}

/// Per-component verification outcome for one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub checkpoint: CheckpointId,
    pub components: Vec<ComponentCheck>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.components.iter().all(|c| c.passed)
    }

    /// Names of failing components.
    pub fn failures(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.clone())
            .collect()
    }
}
