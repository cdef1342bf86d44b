// ABOUTME: Append-only JSON Lines log of deployment record states.
// ABOUTME: Replay keeps the latest line per id; a torn final line from a crash is dropped.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::TrackerError;
use super::record::DeploymentRecord;
use crate::types::DeploymentId;

#[derive(Debug, Clone)]
pub(super) struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub(super) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record state and fsync it.
    pub(super) fn append(&self, record: &DeploymentRecord) -> Result<(), TrackerError> {
        self.truncate_torn_tail()?;

        let json = serde_json::to_string(record)
            .map_err(|e| TrackerError::io(&self.path, std::io::Error::other(e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TrackerError::io(&self.path, e))?;
        writeln!(file, "{json}").map_err(|e| TrackerError::io(&self.path, e))?;
        file.sync_all().map_err(|e| TrackerError::io(&self.path, e))
    }

    /// Latest state of every record, in order of first appearance.
    pub(super) fn replay(&self) -> Result<Vec<DeploymentRecord>, TrackerError> {
        Ok(self.read()?.records)
    }

    fn read(&self) -> Result<Replay, TrackerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Replay::default());
            }
            Err(e) => return Err(TrackerError::io(&self.path, e)),
        };

        let mut replay = Replay::default();
        let mut index: HashMap<DeploymentId, usize> = HashMap::new();
        let mut offset = 0;
        let lines: Vec<&str> = content.split_inclusive('\n').collect();

        for (number, line) in lines.iter().enumerate() {
            let complete = line.ends_with('\n');
            let text = line.trim_end();
            if text.is_empty() {
                offset += line.len();
                continue;
            }

            let record: DeploymentRecord = match serde_json::from_str(text) {
                Ok(record) => record,
                Err(_) if !complete && number + 1 == lines.len() => {
                    tracing::warn!(
                        "ignoring torn final line in {} (crash during write?)",
                        self.path.display()
                    );
                    break;
                }
                Err(source) => {
                    return Err(TrackerError::Corrupt {
                        path: self.path.clone(),
                        line: number + 1,
                        source,
                    });
                }
            };

            offset += line.len();
            match index.get(&record.id) {
                Some(&i) => replay.records[i] = record,
                None => {
                    index.insert(record.id.clone(), replay.records.len());
                    replay.records.push(record);
                }
            }
        }

        replay.valid_len = offset as u64;
        replay.total_len = content.len() as u64;
        Ok(replay)
    }

    fn truncate_torn_tail(&self) -> Result<(), TrackerError> {
        let replay = self.read()?;
        if replay.valid_len == replay.total_len {
            return Ok(());
        }
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| TrackerError::io(&self.path, e))?;
        file.set_len(replay.valid_len)
            .map_err(|e| TrackerError::io(&self.path, e))?;
        file.sync_all().map_err(|e| TrackerError::io(&self.path, e))
    }
}

#[derive(Default)]
struct Replay {
    records: Vec<DeploymentRecord>,
    valid_len: u64,
    total_len: u64,
}
