// ABOUTME: Entry point for the keystone CLI application.
// ABOUTME: Parses arguments, loads configuration, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use keystone::ControlPlane;
use keystone::config::{self, Config};
use keystone::error::{Error, Result};
use keystone::output::{Output, OutputMode};
use keystone::types::Environment;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));
    let mode = output.mode();

    if let Err(e) = run(cli, output).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;

    if let Commands::Init { force } = cli.command {
        config::init_config(&cwd, cli.environment.as_deref(), force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let plane = load_plane(&cwd, cli.config.as_deref(), cli.environment.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Plan => commands::plan(&plane, &output),
        Commands::Run { force } => commands::run(&plane, force, output).await,
        Commands::Status => commands::status(&plane, &output),
        Commands::Checkpoint { name } => commands::create(&plane, &name, output).await,
        Commands::List => commands::list(&plane, &output),
        Commands::Verify { id } => commands::verify(&plane, &id, &output),
        Commands::Cleanup => commands::cleanup(&plane, &output),
        Commands::Rollback { target, reason } => {
            commands::rollback(&plane, target.as_deref(), &reason, output).await
        }
        Commands::AutoRollback { reason } => commands::auto_rollback(&plane, &reason, output).await,
        Commands::TrackDeployment { id, checkpoint } => {
            commands::track_deployment(&plane, &id, checkpoint.as_deref(), &output)
        }
        Commands::MarkSuccess { id } => commands::mark_success(&plane, &id, &output),
        Commands::MarkFailure { id, reason } => {
            commands::mark_failure(&plane, &id, &reason, &output).await
        }
        Commands::ListDeployments { limit } => commands::list_deployments(&plane, limit, &output),
        Commands::GetLastSuccessful => commands::get_last_successful(&plane, &output),
        Commands::ExportState { file } => commands::export_state(&plane, &file, &output),
        Commands::ImportState { file } => commands::import_state(&plane, &file, &output),
        Commands::MonitorHealth {
            deployment,
            interval,
            max_checks,
        } => commands::monitor_health(&plane, &deployment, interval, max_checks, output).await,
    }
}

/// Load the configuration and build the control plane.
///
/// A relative `state_dir` resolves against the directory holding the config file.
fn load_plane(cwd: &Path, path: Option<&Path>, environment: Option<&str>) -> Result<ControlPlane> {
    let (mut config, base_dir) = match path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            (Config::load(path)?, base)
        }
        None => (Config::discover(cwd)?, cwd.to_path_buf()),
    };

    if let Some(name) = environment {
        config.environment =
            Environment::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    ControlPlane::new(config, &base_dir)
}

