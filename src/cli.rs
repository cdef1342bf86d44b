// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "Phased bootstrap and checkpoint rollback for circularly dependent services")]
#[command(version)]
pub struct Cli {
    /// Path to keystone.yml (default: discovered in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Environment name, overriding the configuration
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print results
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new keystone.yml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the bootstrap phase plan
    Plan,

    /// Run the bootstrap phases, resuming after the last completed one
    Run {
        /// Clear phase markers and run every phase again
        #[arg(short, long)]
        force: bool,
    },

    /// Show phase progress and the last deployment
    Status,

    /// Create a checkpoint of every tracked component
    Checkpoint {
        /// Checkpoint name
        #[arg(default_value = "manual")]
        name: String,
    },

    /// List checkpoints, newest first
    List,

    /// Verify the stored components of a checkpoint
    Verify {
        /// Checkpoint id or name
        id: String,
    },

    /// Prune checkpoints beyond the retention policy
    Cleanup,

    /// Roll back to a checkpoint (default: the last successful deployment's)
    Rollback {
        /// Checkpoint id or name
        target: Option<String>,

        /// Reason recorded with the rollback
        #[arg(short, long, default_value = "manual rollback")]
        reason: String,
    },

    /// Roll back to the newest verified checkpoint
    AutoRollback {
        /// Reason recorded with the rollback
        reason: String,
    },

    /// Start tracking a deployment
    TrackDeployment {
        /// Deployment id
        id: String,

        /// Checkpoint id or name taken before the deployment
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Mark a deployment as completed
    MarkSuccess {
        /// Deployment id
        id: String,
    },

    /// Mark a deployment as failed
    MarkFailure {
        /// Deployment id
        id: String,

        /// Failure reason
        #[arg(long, default_value = "unspecified")]
        reason: String,
    },

    /// List deployment records, newest first
    ListDeployments {
        /// Maximum number of records
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the last successful deployment
    GetLastSuccessful,

    /// Export deployment records and phase markers to a JSON file
    ExportState {
        /// Output file
        file: PathBuf,
    },

    /// Import deployment records and phase markers from a JSON file
    ImportState {
        /// Input file
        file: PathBuf,
    },

    /// Monitor service health and roll back on sustained failure
    MonitorHealth {
        /// Deployment to watch; monitoring stops when it is terminal
        #[arg(long)]
        deployment: String,

        /// Seconds between checks (e.g. 10s, 1m)
        #[arg(long, value_parser = parse_interval)]
        interval: Option<Duration>,

        /// Consecutive failures of a critical service that trigger rollback
        #[arg(long)]
        max_checks: Option<u32>,
    },
}

/// Accept bare seconds (`10`) or a humantime duration (`10s`, `1m`).
fn parse_interval(value: &str) -> Result<Duration, String> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
