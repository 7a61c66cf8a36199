//! xenosync command-line synchronization tool.
//!
//! Provides subcommands for running the remote transfer, version control,
//! and database diff pipelines, and for validating the configuration file.

mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use xenosync_core::{
    AppConfig, CommandRunner, CoreError, EventBus, SyncAction, Synchronizer, NO_WORK_EXIT_CODE,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// xenosync command-line synchronization tool.
#[derive(Parser, Debug)]
#[command(
    name = "xenosync",
    version,
    about = "Run unattended synchronization pipelines over external tools"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./xenosync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize the configured directory pairs with the remote host.
    Remote,

    /// Synchronize the remote host, then run the git pipeline.
    RemoteGit,

    /// Synchronize the remote host, then run the Mercurial pipeline.
    RemoteHg,

    /// Diff the source database against the destination and apply.
    Database,

    /// Validate a configuration file.
    Validate,
}

impl Commands {
    fn action(&self) -> Option<SyncAction> {
        match self {
            Commands::Remote => Some(SyncAction::RemoteOnly),
            Commands::RemoteGit => Some(SyncAction::RemoteThenGit),
            Commands::RemoteHg => Some(SyncAction::RemoteThenMercurial),
            Commands::Database => Some(SyncAction::DatabaseOnly),
            Commands::Validate => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    splash();

    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(NO_WORK_EXIT_CODE) => {
            println!("Nothing to synchronize.");
            ExitCode::SUCCESS
        }
        Ok(code) => {
            eprintln!("{}", style(format!("Pipeline failed with exit code {code}.")).red());
            ExitCode::FAILURE
        }
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn splash() {
    println!("xenosync {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn run(cli: Cli) -> Result<i32> {
    let config = AppConfig::load_and_validate(&cli.config)
        .map_err(CoreError::from)
        .context("failed to load configuration file")?;

    init_tracing(&config);

    let Some(action) = cli.command.action() else {
        cmd_validate(&cli.config, &config)?;
        return Ok(0);
    };

    let mut bus = EventBus::new();
    render::attach_console(&mut bus);
    render::attach_file_log(&mut bus, &config.log.directory)
        .context("failed to prepare the run log directory")?;

    let runner = CommandRunner;
    let code = Synchronizer::new(&config, &runner, &bus)
        .run(action)
        .await?;
    Ok(code)
}

fn init_tracing(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone())),
        )
        .with_target(false)
        .without_time()
        .init();
}

/// Print the error; remediable ones (bad configuration, missing tools)
/// get usage guidance alongside.
fn report_error(e: &anyhow::Error) {
    let remediable = e
        .downcast_ref::<CoreError>()
        .is_some_and(CoreError::is_remediable);

    if remediable {
        eprintln!("{}", style("Ooops! Something went wrong:").red().bold());
        eprintln!("{}", style(format!("  {e:#}")).red());
        eprintln!();
        eprintln!("Check the configuration file (see --config) and verify that the");
        eprintln!("configured external tools exist at their designated locations.");
        eprintln!("Run 'xenosync validate' to inspect the active configuration.");
    } else {
        eprintln!("{}", style(format!("Error: {e:#}")).red());
    }
}

// ---------------------------------------------------------------------------
// Validate subcommand
// ---------------------------------------------------------------------------

fn cmd_validate(path: &PathBuf, config: &AppConfig) -> Result<()> {
    println!("Validating configuration: {}", path.display());
    println!();
    println!("  [OK] TOML structure is valid");
    println!("  [OK] All required fields are valid");
    println!();
    println!("Configuration summary:");
    println!("  Transfer tool   : {}", config.remote.executable.display());
    println!(
        "  Directory pairs : {} local / {} remote",
        config.remote.local_directories.len(),
        config.remote.remote_directories.len()
    );
    println!("  Git executable  : {}", config.git.executable.display());
    println!("  Git repository  : {}", config.git.repository.display());
    println!("  Git branch      : {}", config.git.branch);
    println!("  Query tool      : {}", config.database.query_tool.display());
    println!("  Diff tool       : {}", config.database.diff_tool.display());
    println!(
        "  Script storage  : {}",
        config.database.script_storage.display()
    );
    println!(
        "  Connections     : {}",
        config
            .connections
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Log directory   : {}", config.log.directory.display());
    println!();
    println!("Configuration is valid.");
    Ok(())
}
