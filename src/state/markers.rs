// ABOUTME: Durable phase-complete markers, one JSON file per completed bootstrap phase.
// ABOUTME: Markers make bootstrap runs resumable and idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::StateError;
use super::fsync::{fsync_dir, write_json_atomic};
use crate::types::{PhaseId, RunId};

/// Contents of a phase marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMarkerRecord {
    pub phase_id: PhaseId,
    pub name: String,
    pub completed_at: DateTime<Utc>,
    pub run_id: RunId,
}

/// Directory of phase markers.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, phase: &PhaseId) -> PathBuf {
        self.dir.join(format!("{phase}.json"))
    }

    pub fn is_complete(&self, phase: &PhaseId) -> bool {
        self.path_for(phase).is_file()
    }

    pub fn get(&self, phase: &PhaseId) -> Result<Option<PhaseMarkerRecord>, StateError> {
        let path = self.path_for(phase);
        match std::fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content)
                .map(Some)
                .map_err(|source| StateError::Corrupt { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(&path, e)),
        }
    }

    pub fn mark_complete(&self, marker: &PhaseMarkerRecord) -> Result<(), StateError> {
        let path = self.path_for(&marker.phase_id);
        write_json_atomic(&path, marker).map_err(|e| StateError::io(&path, e))
    }

    /// Remove one marker. Missing markers are not an error.
    pub fn remove(&self, phase: &PhaseId) -> Result<(), StateError> {
        let path = self.path_for(phase);
        match std::fs::remove_file(&path) {
            Ok(()) => fsync_dir(&self.dir).map_err(|e| StateError::io(&self.dir, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&path, e)),
        }
    }

    /// All markers, sorted by completion time.
    pub fn list(&self) -> Result<Vec<PhaseMarkerRecord>, StateError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StateError::io(&self.dir, e))?;

        let mut markers = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StateError::io(&self.dir, e))?.path();
            if !is_marker_file(&path) {
                continue;
            }
            let content = std::fs::read(&path).map_err(|e| StateError::io(&path, e))?;
            let marker: PhaseMarkerRecord = serde_json::from_slice(&content)
                .map_err(|source| StateError::Corrupt { path, source })?;
            markers.push(marker);
        }
        markers.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(markers)
    }

    pub fn clear(&self) -> Result<usize, StateError> {
        let markers = self.list()?;
        for marker in &markers {
            self.remove(&marker.phase_id)?;
        }
        Ok(markers.len())
    }
}

fn is_marker_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str) -> PhaseMarkerRecord {
        PhaseMarkerRecord {
            phase_id: PhaseId::new(id),
            name: format!("phase {id}"),
            completed_at: Utc::now(),
            run_id: RunId::new("run-1"),
        }
    }

    #[test]
    fn markers_persist_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkerStore::new(dir.path().to_path_buf());
        let id = PhaseId::new("nomad-standalone");

        assert!(!store.is_complete(&id));
        store.mark_complete(&marker("nomad-standalone")).unwrap();
        store.mark_complete(&marker("vault-init")).unwrap();

        assert!(store.is_complete(&id));
        assert_eq!(store.get(&id).unwrap().unwrap().run_id.as_str(), "run-1");
        assert_eq!(store.list().unwrap().len(), 2);

        assert_eq!(store.clear().unwrap(), 2);
        assert!(!store.is_complete(&id));
    }

    #[test]
    fn removing_missing_marker_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkerStore::new(dir.path().to_path_buf());
        store.remove(&PhaseId::new("absent")).unwrap();
    }
}
