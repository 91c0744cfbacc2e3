//! Mycelium — self-updating supervisor.
//!
//! Usage:
//!   mycelium run       Poll the remote and restart when new code lands (default)
//!   mycelium check     One-shot update check
//!   mycelium status    Show configuration, working copy and last update

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mycelium::config::{self, LogLevel, SupervisorConfig};
use mycelium::git_ops;
use mycelium::heartbeat::HeartbeatDaemon;
use mycelium::restart::{self, Restarter};
use mycelium::state::{StateStore, UpdateRecord};
use mycelium::supervisor::{self, Supervisor};
use mycelium::types::exit_codes::{EXIT_CONFIG, EXIT_FAILURE, EXIT_SUCCESS};
use mycelium::types::{LoopExit, UpdateCheckResult};
use mycelium::upstream::{GitSynchronizer, GitTracker, UpdateTracker};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "mycelium")]
#[command(version)]
#[command(about = "Keep a deployed agent in sync with its repository and restart on new code")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file (defaults to ./mycelium.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Run the supervisor loop.
    Run,

    /// Check the remote once and report whether an update is available.
    Check,

    /// Show configuration, working copy state and the last applied update.
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = config::load(cli.config.as_deref());
    let level = cli
        .log_level
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level))
        .unwrap_or(LogLevel::Info);
    init_logging(level, cli.log_format);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return exit_code(EXIT_CONFIG);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(config).await,
        Commands::Check => cmd_check(config).await,
        Commands::Status => cmd_status(config).await,
    };

    match result {
        Ok(code) => exit_code(code),
        Err(e) => {
            error!("Fatal error: {e:#}");
            exit_code(EXIT_FAILURE)
        }
    }
}

fn init_logging(level: LogLevel, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init(),
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: SupervisorConfig) -> Result<i32> {
    let current = match supervisor::running_revision(&config).await {
        Ok(rev) => rev,
        Err(e) => {
            // A repo_path that is not a working copy can never succeed.
            error!("Configuration error: {e:#}");
            return Ok(EXIT_CONFIG);
        }
    };

    let store = StateStore::new(config.resolved_state_dir());
    let last = store.load().unwrap_or_else(|e| {
        warn!("Ignoring unreadable update record: {e:#}");
        None
    });
    restart::log_incarnation(&current, last.as_ref());

    info!("Repository: {}", config.repo_url);
    info!("Branch: {}", config.branch);
    info!("Working copy: {}", config.resolved_repo_path().display());
    info!("Update check interval: {}s", config.poll_interval_secs);

    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_cancel.cancel();
    });

    let heartbeat_handle = HeartbeatDaemon::new(&config, current.clone())
        .map(|daemon| tokio::spawn(daemon.run(cancel.clone())));

    let mut supervisor = Supervisor::new(
        &config,
        GitTracker::from_config(&config),
        GitSynchronizer::from_config(&config),
        current,
    );
    let exit = supervisor.run(cancel.clone()).await;

    // Stop the heartbeat before handing over.
    cancel.cancel();
    if let Some(handle) = heartbeat_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Heartbeat task did not stop in time");
        }
    }

    match exit {
        LoopExit::Stopped => {
            info!("Supervisor stopped");
            Ok(EXIT_SUCCESS)
        }
        LoopExit::Restart { previous, applied } => {
            let record = UpdateRecord::next(last.as_ref(), previous, applied.clone());
            if let Err(e) = store.save(&record) {
                warn!("Failed to persist update record: {e:#}");
            }
            let code = Restarter::new(config.restart_mode)
                .handover(&applied)
                .context("Restart failed")?;
            Ok(code)
        }
    }
}

async fn cmd_check(config: SupervisorConfig) -> Result<i32> {
    let current = supervisor::running_revision(&config).await?;
    let tracker = GitTracker::from_config(&config);

    match tracker.check_for_update(&current).await {
        Ok(UpdateCheckResult::NoChange) => {
            println!("{} up to date at {}", "✓".green().bold(), current.short());
            Ok(EXIT_SUCCESS)
        }
        Ok(UpdateCheckResult::ChangeAvailable(rev)) => {
            println!(
                "{} update available: {} -> {}",
                "↑".yellow().bold(),
                current.short(),
                rev
            );
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Ok(EXIT_FAILURE)
        }
    }
}

async fn cmd_status(config: SupervisorConfig) -> Result<i32> {
    let repo = config.resolved_repo_path();
    let timeout = config.git_timeout();

    let head = git_ops::head_revision(&repo, timeout).await;
    let dirty = git_ops::dirty_paths(&repo, timeout).await;
    let last = StateStore::new(config.resolved_state_dir()).load()?;

    println!();
    println!("{}", "=== Mycelium Status ===".bold());
    println!();
    println!("  {}:", "Config".bold());
    println!("    Repository: {}", config.repo_url);
    println!("    Branch:     {}", config.branch);
    println!("    Interval:   {}s (git timeout {:?})", config.poll_interval_secs, timeout);
    println!("    Restart:    {}", config.restart_mode);
    println!();
    println!("  {}:", "Working copy".bold());
    println!("    Path:       {}", repo.display());
    match &head {
        Ok(rev) => println!("    HEAD:       {}", rev),
        Err(e) => println!("    HEAD:       {}", e.to_string().red()),
    }
    match &dirty {
        Ok(paths) if paths.is_empty() => println!("    State:      {}", "clean".green()),
        Ok(paths) => println!(
            "    State:      {} ({} paths)",
            "dirty".red().bold(),
            paths.len()
        ),
        Err(e) => println!("    State:      {}", e.to_string().red()),
    }
    println!();
    println!("  {}:", "Last update".bold());
    match last {
        Some(record) => {
            println!("    Revision:   {}", record.revision);
            println!("    Previous:   {}", record.previous);
            println!("    Applied at: {}", record.applied_at.to_rfc3339());
            println!("    Updates:    {}", record.incarnation);
        }
        None => println!("    {}", "never".dimmed()),
    }
    println!();

    Ok(EXIT_SUCCESS)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
