// ABOUTME: Command module aggregator for the keystone CLI.
// ABOUTME: Each submodule drives one area of the control plane and renders its results.

mod bootstrap;
mod checkpoint;
mod monitor;
mod rollback;
mod state;

pub use bootstrap::{plan, run, status};
pub use checkpoint::{cleanup, create, list, verify};
pub use monitor::monitor_health;
pub use rollback::{auto_rollback, rollback};
pub use state::{
    export_state, get_last_successful, import_state, list_deployments, mark_failure, mark_success,
    track_deployment,
};

use keystone::tracker::DeploymentRecord;

/// One-line human rendering of a deployment record.
fn describe_record(record: &DeploymentRecord) -> String {
    let mut line = format!(
        "{}  {}  started {}",
        record.id,
        record.status,
        record.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(checkpoint) = &record.checkpoint_id {
        line.push_str(&format!("  checkpoint {checkpoint}"));
    }
    if let Some(reason) = &record.reason {
        line.push_str(&format!("  ({reason})"));
    }
    line
}
