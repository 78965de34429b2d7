//! HostKit - Entry Point
//!
//! Runs one governance command and exits: 0 on success, 1 on any error.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;

use hostkit::app::cli::{execute, execute_standalone, render, Cli};
use hostkit::app::options::AppOptions;
use hostkit::app::state::AppState;
use hostkit::errors::HostKitError;
use hostkit::filesys::file::File;
use hostkit::logs::{init_logging, LogOptions};
use hostkit::storage::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.command.is_standalone() {
        return exit_code(render(execute_standalone(&cli.command), cli.json));
    }

    let (state, _log_guard) = match bootstrap(&cli.settings).await {
        Ok(started) => started,
        Err(e) => {
            error!("Failed to start HostKit: {:#}", e);
            return exit_code(render(Err(e.into()), cli.json));
        }
    };

    let result: Result<_, HostKitError> = execute(&state, cli.command).await;
    state.shutdown().await;
    exit_code(render(result, cli.json))
}

/// Load settings, start logging and build the application state
async fn bootstrap(settings_path: &Path) -> anyhow::Result<(AppState, Option<WorkerGuard>)> {
    let settings = Settings::load(&File::new(settings_path))
        .await
        .with_context(|| format!("loading {}", settings_path.display()))?;

    let log_options = LogOptions {
        log_level: settings.log_level,
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions {
        config_dir: config_dir_of(settings_path),
        ..Default::default()
    };
    let state = AppState::init(&settings, options)
        .await
        .context("initializing application state")?;
    Ok((state, log_guard))
}

fn config_dir_of(settings_path: &Path) -> std::path::PathBuf {
    settings_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppOptions::default().config_dir)
}

fn exit_code(code: i32) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
