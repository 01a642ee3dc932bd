//! WoW Sync - command-line entry point.
//!
//! # Overview
//!
//! Initializes, in order:
//! - Configuration ([`ConfigManager`]) rooted at `~/.wow_sync` or `--app-dir`
//! - Logging (daily rotating file in `<app dir>/logs`, console with `--verbose`)
//! - The single-instance lock ([`InstanceLock`])
//! - A tokio runtime for the orchestrator's blocking sync work
//!
//! then runs one subcommand and shuts down.
//!
//! # Exit codes
//!
//! - `0`: success
//! - `1`: error
//! - `2`: another instance is running
//! - `3`: a merge conflict is still waiting for `wowsync resolve`

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use wowsync::cli::{
    Cli, Command, ConfigAction, PullArgs, SelectArgs, TerminalTokenPrompt,
    prompt_conflict_resolution,
};
use wowsync::logging::{SyncLog, setup_logging_with_console};
use wowsync::models::validate_repo_url;
use wowsync::services::{CredentialResolver, scan_installation};
use wowsync::{
    APP_NAME, ConfigManager, InstanceLock, Metrics, StateChange, StateManager, SyncContext,
    SyncError, SyncOrchestrator, VERSION,
};

const EXIT_ALREADY_RUNNING: u8 = 2;
const EXIT_CONFLICT_PENDING: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let app_dir = match cli.app_dir {
        Some(dir) => dir,
        None => ConfigManager::default_app_dir()?,
    };
    let config_manager = ConfigManager::new(&app_dir)?;

    let _log_guard = setup_logging_with_console(
        &config_manager.log_dir(),
        APP_NAME,
        cli.debug,
        cli.verbose,
    )?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let Some(_lock) = InstanceLock::acquire(&config_manager.lock_path())
        .context("Failed to acquire instance lock")?
    else {
        eprintln!("WoW Sync is already running.");
        return Ok(ExitCode::from(EXIT_ALREADY_RUNNING));
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("wowsync-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(dispatch(cli.command, &config_manager, Arc::clone(&metrics)));

    runtime.shutdown_timeout(Duration::from_secs(5));
    metrics.log_summary();
    tracing::info!("Shutdown complete");

    result
}

async fn dispatch(
    command: Command,
    config_manager: &ConfigManager,
    metrics: Arc<Metrics>,
) -> Result<ExitCode> {
    match command {
        Command::Config { action } => config_command(action, config_manager)?,
        Command::Scan => scan_command(config_manager).await?,
        Command::Select(args) => select_command(&args, config_manager).await?,
        Command::Init => {
            let orchestrator = build_orchestrator(config_manager, metrics)?;
            orchestrator.init_repository().await?;
            println!("Repository ready at {}", orchestrator.repo_path());
        }
        Command::Pull(args) => {
            let orchestrator = build_orchestrator(config_manager, metrics)?;
            return pull_command(&orchestrator, args).await;
        }
        Command::Push(args) => {
            let orchestrator = build_orchestrator(config_manager, metrics)?;
            if orchestrator.collect_and_push(args.force).await? {
                println!("Changes pushed.");
            } else {
                println!("Nothing to push.");
            }
        }
        Command::Resolve(args) => {
            let orchestrator = build_orchestrator(config_manager, metrics)?;
            orchestrator.resolve_conflict(args.side.into()).await?;
            println!("Conflict resolved.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn config_command(action: ConfigAction, config_manager: &ConfigManager) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = config_manager.load_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set(args) => {
            if let Some(url) = &args.repo_url {
                validate_repo_url(url)?;
            }
            let mut changed = false;
            config_manager.update(|config| changed = args.apply(config))?;
            if changed {
                println!("Saved {}", config_manager.config_path());
            } else {
                println!("Nothing to change.");
            }
        }
    }
    Ok(())
}

async fn scan_installation_from_config(
    config_manager: &ConfigManager,
) -> Result<wowsync::models::ScanResult> {
    let config = config_manager.load_config()?;
    let wow_path = config
        .wow_path()
        .ok_or(SyncError::MissingInstallPath)?
        .to_path_buf();
    let scan = tokio::task::spawn_blocking(move || scan_installation(&wow_path)).await??;
    Ok(scan)
}

async fn scan_command(config_manager: &ConfigManager) -> Result<()> {
    let config = config_manager.load_config()?;
    let scan = scan_installation_from_config(config_manager).await?;

    if scan.is_empty() {
        println!("No game versions found.");
        return Ok(());
    }

    for version in &scan.versions {
        let enabled = if config.is_version_enabled(*version) {
            ""
        } else {
            " (sync disabled)"
        };
        println!("{}{}", version, enabled);
        for character in scan.characters_for(*version) {
            let mark = if config.selection.is_character_included(character) {
                'x'
            } else {
                ' '
            };
            println!("  [{}] {}", mark, character.key());
        }
    }
    if !config.selection.has_explicit_selection() {
        println!("No selection saved yet: every character is synced.");
    }
    Ok(())
}

async fn select_command(args: &SelectArgs, config_manager: &ConfigManager) -> Result<()> {
    let scan = scan_installation_from_config(config_manager).await?;
    let characters = args.characters(&scan)?;
    let count = characters.len();

    config_manager.update(|config| config.selection.replace(characters))?;
    println!("Selected {} character(s).", count);
    Ok(())
}

async fn pull_command(orchestrator: &SyncOrchestrator, args: PullArgs) -> Result<ExitCode> {
    match orchestrator.pull_and_apply().await {
        Ok(report) => {
            println!("{}", report.outcome);
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::Conflict) => {
            let resolution = match args.on_conflict {
                Some(side) => Some(side.into()),
                None => tokio::task::spawn_blocking(prompt_conflict_resolution).await?,
            };
            match resolution {
                Some(resolution) => {
                    orchestrator.resolve_conflict(resolution).await?;
                    println!("Conflict resolved ({}).", resolution);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    println!("Conflict left unresolved. Run `wowsync resolve remote|local`.");
                    Ok(ExitCode::from(EXIT_CONFLICT_PENDING))
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn build_orchestrator(
    config_manager: &ConfigManager,
    metrics: Arc<Metrics>,
) -> Result<SyncOrchestrator> {
    let config = config_manager.load_config()?;
    let context = SyncContext::from_config(&config, config_manager.repo_path())?;

    let credentials = CredentialResolver::new(config_manager.token_path())
        .with_prompt(Arc::new(TerminalTokenPrompt));
    let log = SyncLog::new(|line| println!("{}", line));

    let state = Arc::new(StateManager::new());
    spawn_state_listener(&state);

    Ok(SyncOrchestrator::new(
        context,
        Arc::new(credentials),
        log,
        state,
        metrics,
    ))
}

/// Follow state changes in the log file.
fn spawn_state_listener(state: &StateManager) {
    let mut rx = state.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = rx.recv().await {
            match change {
                StateChange::ConflictDetected => {
                    tracing::warn!("Merge conflict detected, waiting for a resolution")
                }
                StateChange::SyncFinished {
                    direction,
                    success: false,
                    message,
                } => tracing::warn!("{} failed: {}", direction, message),
                other => tracing::debug!("State change: {:?}", other),
            }
        }
    });
}
