//! Command-line surface
//!
//! Parses arguments, runs one command against [`AppState`] and renders either
//! the JSON envelope or human output. No governance logic lives here.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hostkit_models::{Envelope, ErrorBody};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::state::AppState;
use crate::deploy::auto_pause::AutoPauseUpdate;
use crate::deploy::classify::classify;
use crate::deploy::migrate::MigrateOptions;
use crate::deploy::pipeline::DeployRequest;
use crate::deploy::rate_limit::RateLimitUpdate;
use crate::errors::HostKitError;
use crate::utils::version_info;

/// HostKit - deploy governance for self-hosted projects
#[derive(Parser, Debug)]
#[command(name = "hostkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print the JSON envelope instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file
    #[arg(
        long,
        global = true,
        env = "HOSTKIT_SETTINGS",
        default_value = "/etc/hostkit/settings.json"
    )]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show how a source directory would be deployed
    Classify {
        /// Source directory
        dir: PathBuf,
    },

    /// Deploy a source directory into a project
    Deploy {
        project: String,

        /// Source directory
        #[arg(short, long)]
        source: PathBuf,

        /// Who is deploying, stored in the history
        #[arg(long, env = "USER", default_value = "unknown")]
        actor: String,

        /// Origin label stored in the history
        #[arg(long, default_value = "local")]
        source_type: String,

        /// Deploy even if the rate limit or cooldown blocks it
        #[arg(long)]
        override_rate_limit: bool,

        /// Run the project's migration after syncing
        #[arg(long)]
        migrate: bool,
    },

    /// Show deploy history, most recent first
    History {
        project: String,

        /// Only records at or after this RFC 3339 timestamp
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete a project's deploy history
    HistoryClear { project: String },

    /// Rate limit configuration and status
    RateLimit {
        #[command(subcommand)]
        command: RateLimitCommands,
    },

    /// Pause deploys for a project
    Pause {
        project: String,

        #[arg(long, default_value = "Paused by operator")]
        reason: String,
    },

    /// Resume deploys for a paused project
    Resume {
        project: String,

        /// Also clear the deploy history so old failures cannot re-trip the breaker
        #[arg(long)]
        reset_failures: bool,
    },

    /// Auto-pause configuration and status
    AutoPause {
        #[command(subcommand)]
        command: AutoPauseCommands,
    },

    /// Run a project's database migration
    Migrate {
        project: String,

        /// Framework to use instead of detection
        #[arg(long, conflicts_with = "command")]
        framework: Option<String>,

        /// Shell command to run instead of a framework
        #[arg(long)]
        command: Option<String>,

        /// Print the resolved command without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Project registry
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Database checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum RateLimitCommands {
    /// Show config and current status
    Show { project: String },

    /// Change one or more values
    Set {
        project: String,

        /// Deploys allowed per window; 0 or less means unlimited
        #[arg(long, allow_negative_numbers = true)]
        max_deploys: Option<i64>,

        #[arg(long)]
        window_minutes: Option<i64>,

        #[arg(long)]
        cooldown_minutes: Option<i64>,

        #[arg(long)]
        failure_limit: Option<i64>,
    },

    /// Go back to the defaults
    Reset { project: String },
}

#[derive(Subcommand, Debug)]
pub enum AutoPauseCommands {
    /// Show config, pause state and recent failures
    Show { project: String },

    /// Change one or more values
    Set {
        project: String,

        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        threshold: Option<i64>,

        #[arg(long)]
        window_minutes: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register a project (or update an existing one)
    Register {
        name: String,

        /// Owner for synced files, defaults to the project name
        #[arg(long)]
        owner: Option<String>,

        /// The project has a database; migrations are checkpointed
        #[arg(long)]
        has_database: bool,
    },

    /// List registered projects
    List,

    /// Forget a project
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Restore a checkpoint by id
    Restore { project: String, id: i64 },
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

impl Commands {
    /// Commands that run without settings, database or logging
    pub fn is_standalone(&self) -> bool {
        matches!(self, Commands::Classify { .. } | Commands::Version)
    }
}

/// Run a command that needs no application state
pub fn execute_standalone(command: &Commands) -> Result<Value, HostKitError> {
    match command {
        Commands::Classify { dir } => to_data(classify(dir)),
        Commands::Version => to_data(version_info()),
        other => Err(HostKitError::Internal(format!(
            "{other:?} needs application state"
        ))),
    }
}

/// Run a command and return its data
pub async fn execute(state: &AppState, command: Commands) -> Result<Value, HostKitError> {
    match command {
        Commands::Classify { .. } | Commands::Version => execute_standalone(&command),

        Commands::Deploy {
            project,
            source,
            actor,
            source_type,
            override_rate_limit,
            migrate,
        } => {
            let request = DeployRequest {
                project,
                source_dir: source,
                actor,
                source_type,
                override_rate_limit,
                run_migrations: migrate,
            };
            to_data(state.deployer.deploy(&request).await?)
        }

        Commands::History {
            project,
            since,
            limit,
        } => to_data(state.ledger.query(&project, since, limit).await?),

        Commands::HistoryClear { project } => {
            let deleted = state.ledger.delete_for_project(&project).await?;
            Ok(json!({ "project": project, "deleted": deleted }))
        }

        Commands::RateLimit { command } => match command {
            RateLimitCommands::Show { project } => {
                let config = state.rate_limiter.get_config(&project).await?;
                let status = state.rate_limiter.status(&project).await?;
                Ok(json!({ "config": config, "status": status }))
            }
            RateLimitCommands::Set {
                project,
                max_deploys,
                window_minutes,
                cooldown_minutes,
                failure_limit,
            } => {
                let update = RateLimitUpdate {
                    max_deploys,
                    window_minutes,
                    failure_cooldown_minutes: cooldown_minutes,
                    consecutive_failure_limit: failure_limit,
                };
                to_data(state.rate_limiter.set_config(&project, update).await?)
            }
            RateLimitCommands::Reset { project } => {
                to_data(state.rate_limiter.reset_config(&project).await?)
            }
        },

        Commands::Pause { project, reason } => {
            to_data(state.auto_pause.pause(&project, &reason).await?)
        }

        Commands::Resume {
            project,
            reset_failures,
        } => to_data(state.auto_pause.resume(&project, reset_failures).await?),

        Commands::AutoPause { command } => match command {
            AutoPauseCommands::Show { project } => {
                to_data(state.auto_pause.status(&project).await?)
            }
            AutoPauseCommands::Set {
                project,
                enabled,
                threshold,
                window_minutes,
            } => {
                let update = AutoPauseUpdate {
                    enabled,
                    failure_threshold: threshold,
                    window_minutes,
                };
                to_data(state.auto_pause.set_config(&project, update).await?)
            }
        },

        Commands::Migrate {
            project,
            framework,
            command,
            dry_run,
        } => {
            let options = MigrateOptions {
                framework,
                command,
                dry_run,
            };
            to_data(
                state
                    .migrations
                    .migrate_with_checkpoint(&project, &options)
                    .await?,
            )
        }

        Commands::Project { command } => match command {
            ProjectCommands::Register {
                name,
                owner,
                has_database,
            } => to_data(
                state
                    .registry
                    .register(&name, owner.as_deref(), has_database, state.clock.now())
                    .await?,
            ),
            ProjectCommands::List => to_data(state.registry.list().await?),
            ProjectCommands::Remove { name } => {
                state.registry.remove(&name).await?;
                Ok(json!({ "project": name, "removed": true }))
            }
        },

        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Restore { project, id } => {
                state.checkpoints.restore(&project, id).await?;
                Ok(json!({ "project": project, "checkpoint_id": id, "restored": true }))
            }
        },
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, HostKitError> {
    Ok(serde_json::to_value(value)?)
}

/// Render a command result. Returns the process exit code.
pub fn render(result: Result<Value, HostKitError>, json_output: bool) -> i32 {
    let code = if result.is_ok() { 0 } else { 1 };
    let envelope = match result {
        Ok(data) => Envelope::ok(data),
        Err(err) => Envelope::err(err.to_body()),
    };

    if json_output {
        match serde_json::to_string(&envelope) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("unable to serialize output: {e}"),
        }
        return code;
    }

    match (envelope.data, envelope.error) {
        (Some(data), _) => match serde_json::to_string_pretty(&data) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("unable to serialize output: {e}"),
        },
        (None, Some(error)) => print_error(&error),
        (None, None) => {}
    }
    code
}

fn print_error(error: &ErrorBody) {
    let code = format!("[{}]", error.code);
    eprintln!(
        "{} {} {}",
        "error".red().bold(),
        code.as_str().dimmed(),
        error.message
    );
    if let Some(suggestion) = &error.suggestion {
        eprintln!("  {} {}", "hint:".yellow(), suggestion);
    }
}
