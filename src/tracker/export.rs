// ABOUTME: Portable JSON export of deployment records and phase markers.
// ABOUTME: Imports are additive: known ids and existing markers are left untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::DeploymentRecord;
use crate::state::PhaseMarkerRecord;

pub(super) const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<DeploymentRecord>,
    pub markers: Vec<PhaseMarkerRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub records_imported: usize,
    pub records_skipped: usize,
    pub markers_restored: usize,
}
