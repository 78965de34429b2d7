//! Migration runner
//!
//! Finds a project's schema-migration command and runs it inside the app
//! directory with the project's environment. The runner cannot roll anything
//! back; [`MigrationService::migrate_with_checkpoint`] takes an external
//! checkpoint first when the project has a database.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use hostkit_models::MigrationResult;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointService, MIGRATE_TRIGGER, PRE_MIGRATE_LABEL, PRE_MIGRATION_TYPE};
use crate::clock::Clock;
use crate::errors::HostKitError;
use crate::notify::{Alert, AlertEvent, Notifier};
use crate::storage::layout::StorageLayout;
use crate::storage::projects::ProjectRegistry;
use crate::storage::settings::MigrationSettings;

/// Framework name reported for a caller-supplied command
pub const CUSTOM_FRAMEWORK: &str = "custom";

const PYTHON_PLACEHOLDER: &str = "{python}";

/// A supported migration framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framework {
    pub name: &'static str,
    /// Matches when any of these exist in the app dir
    pub markers: &'static [&'static str],
    pub command: &'static str,
}

/// Supported frameworks in detection priority order
pub const FRAMEWORKS: &[Framework] = &[
    Framework {
        name: "alembic",
        markers: &["alembic.ini"],
        command: "{python} -m alembic upgrade head",
    },
    Framework {
        name: "django",
        markers: &["manage.py"],
        command: "{python} manage.py migrate --noinput",
    },
    Framework {
        name: "prisma",
        markers: &["prisma/schema.prisma"],
        command: "npx prisma migrate deploy",
    },
    Framework {
        name: "drizzle",
        markers: &["drizzle.config.ts", "drizzle.config.js"],
        command: "npx drizzle-kit migrate",
    },
    Framework {
        name: "knex",
        markers: &["knexfile.js", "knexfile.ts"],
        command: "npx knex migrate:latest",
    },
    Framework {
        name: "sequelize",
        markers: &[".sequelizerc"],
        command: "npx sequelize-cli db:migrate",
    },
];

/// First framework whose markers are present in `app_dir`
pub fn detect_in(app_dir: &Path) -> Option<&'static Framework> {
    FRAMEWORKS
        .iter()
        .find(|fw| fw.markers.iter().any(|m| app_dir.join(m).exists()))
}

/// Look a framework up by name
pub fn framework_named(name: &str) -> Option<&'static Framework> {
    FRAMEWORKS.iter().find(|fw| fw.name == name)
}

/// What to run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrateOptions {
    /// Framework to use instead of detection
    pub framework: Option<String>,
    /// Shell command to use instead of any framework
    pub command: Option<String>,
    /// Resolve the command without running it
    pub dry_run: bool,
}

/// Detects and runs migrations for projects laid out per [`StorageLayout`]
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    layout: StorageLayout,
    fallback_python: String,
    timeout: Duration,
}

impl MigrationRunner {
    pub fn new(layout: StorageLayout, settings: &MigrationSettings) -> Self {
        Self {
            layout,
            fallback_python: settings.fallback_python.clone(),
            timeout: settings.timeout(),
        }
    }

    /// Replace the wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn detect_framework(&self, project: &str) -> Option<&'static Framework> {
        detect_in(self.layout.app_dir(project).path())
    }

    /// Run (or, for a dry run, resolve) the project's migration
    pub async fn migrate(
        &self,
        project: &str,
        options: &MigrateOptions,
    ) -> Result<MigrationResult, HostKitError> {
        let working_dir = self.layout.app_dir(project).path().to_path_buf();
        let (framework, command) = self.resolve(project, options).await?;

        if options.dry_run {
            debug!("Dry run for {}: {} in {}", project, command, working_dir.display());
            return Ok(MigrationResult {
                project: project.to_string(),
                framework,
                command,
                working_dir,
                success: true,
                output: String::new(),
                dry_run: true,
            });
        }

        info!("Running {} migration for {}: {}", framework, project, command);
        let (exit_code, output) = self.execute(project, &command, &working_dir).await?;

        if exit_code != Some(0) {
            error!("Migration for {} exited with {:?}", project, exit_code);
            return Err(HostKitError::MigrationFailed {
                project: project.to_string(),
                exit_code,
                output,
                checkpoint_id: None,
            });
        }

        info!("Migration for {} completed", project);
        Ok(MigrationResult {
            project: project.to_string(),
            framework,
            command,
            working_dir,
            success: true,
            output,
            dry_run: false,
        })
    }

    async fn resolve(
        &self,
        project: &str,
        options: &MigrateOptions,
    ) -> Result<(String, String), HostKitError> {
        if let Some(command) = options.command.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok((CUSTOM_FRAMEWORK.to_string(), command.to_string()));
        }

        let framework = match options.framework.as_deref() {
            Some(name) => framework_named(name)
                .ok_or_else(|| HostKitError::UnknownFramework(name.to_string()))?,
            None => self.detect_framework(project).ok_or_else(|| {
                HostKitError::NoFrameworkDetected(
                    self.layout.app_dir(project).path().display().to_string(),
                )
            })?,
        };

        let command = if framework.command.contains(PYTHON_PLACEHOLDER) {
            let python = self.python_for(project).await;
            framework.command.replace(PYTHON_PLACEHOLDER, &python)
        } else {
            framework.command.to_string()
        };
        Ok((framework.name.to_string(), command))
    }

    async fn python_for(&self, project: &str) -> String {
        let venv = self.layout.venv_python(project);
        if venv.exists().await {
            venv.path().display().to_string()
        } else {
            self.fallback_python.clone()
        }
    }

    async fn execute(
        &self,
        project: &str,
        command: &str,
        working_dir: &Path,
    ) -> Result<(Option<i32>, String), HostKitError> {
        if !working_dir.is_dir() {
            return Err(HostKitError::ProjectNotFound(project.to_string()));
        }

        let home: PathBuf = self.layout.project_home(project).path().to_path_buf();
        let env = self.layout.env_file(project).read_env().await?;
        let path = search_path(
            self.layout.node_bin_dir(project).path(),
            env.get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok()),
        );

        // stderr shares the stdout pipe so the captured output keeps its order
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{command}"))
            .current_dir(working_dir)
            .envs(&env)
            .env("HOME", &home)
            .env("USER", project)
            .env("LOGNAME", project)
            .env("PROJECT_NAME", project)
            .env("PATH", path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let group = child.id();

        let mut stdout = child.stdout.take();
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut buf).await.ok();
            }
            buf
        });

        let status = match timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "Migration for {} exceeded {:?}, killing its process group",
                    project, self.timeout
                );
                if let Err(e) = kill_process_group(group) {
                    warn!("Unable to kill process group of {}: {}", project, e);
                }
                child.kill().await.ok();
                reader.abort();
                return Err(HostKitError::MigrationTimeout {
                    project: project.to_string(),
                    command: command.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                    checkpoint_id: None,
                });
            }
        };

        // Leftover background jobs would hold the pipe open
        if let Err(e) = kill_process_group(group) {
            debug!("No leftover processes for {}: {}", project, e);
        }
        let output = reader.await.unwrap_or_default();
        Ok((status.code(), String::from_utf8_lossy(&output).into_owned()))
    }
}

/// SIGKILL every process in the group led by `leader`
fn kill_process_group(leader: Option<u32>) -> Result<(), Errno> {
    let pid = leader
        .and_then(|id| i32::try_from(id).ok())
        .ok_or(Errno::ESRCH)?;
    killpg(Pid::from_raw(pid), Signal::SIGKILL)
}

/// Project-local Node binaries first, so `npx` resolves the app's own tools
fn search_path(node_bin: &Path, inherited: Option<String>) -> String {
    match inherited.filter(|p| !p.is_empty()) {
        Some(rest) => format!("{}:{}", node_bin.display(), rest),
        None => node_bin.display().to_string(),
    }
}

/// Outcome of a checkpointed migration
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointedMigration {
    #[serde(flatten)]
    pub result: MigrationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<i64>,
}

/// Migration runner wrapped in checkpoint and alerting policy
pub struct MigrationService {
    runner: MigrationRunner,
    registry: ProjectRegistry,
    checkpoints: Arc<dyn CheckpointService>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
}

impl MigrationService {
    pub fn new(
        runner: MigrationRunner,
        registry: ProjectRegistry,
        checkpoints: Arc<dyn CheckpointService>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runner,
            registry,
            checkpoints,
            notifier,
            clock,
        }
    }

    pub fn runner(&self) -> &MigrationRunner {
        &self.runner
    }

    /// Checkpoint (when the project has a database), then migrate.
    ///
    /// On failure the returned error names the checkpoint to restore and a
    /// `migration_failed` alert is queued.
    pub async fn migrate_with_checkpoint(
        &self,
        project: &str,
        options: &MigrateOptions,
    ) -> Result<CheckpointedMigration, HostKitError> {
        let registered = self.registry.require(project).await?;

        let checkpoint_id = if registered.has_database && !options.dry_run {
            let checkpoint = self
                .checkpoints
                .create_checkpoint(project, PRE_MIGRATE_LABEL, PRE_MIGRATION_TYPE, MIGRATE_TRIGGER)
                .await
                .map_err(|e| match e {
                    HostKitError::CheckpointError(_) => e,
                    other => HostKitError::CheckpointError(other.to_string()),
                })?;
            Some(checkpoint.id)
        } else {
            None
        };

        match self.runner.migrate(project, options).await {
            Ok(result) => Ok(CheckpointedMigration {
                result,
                checkpoint_id,
            }),
            Err(err) => {
                let err = attach_checkpoint(err, checkpoint_id);
                self.notifier.notify(Alert::new(
                    project,
                    AlertEvent::MigrationFailed,
                    self.clock.now(),
                    json!({
                        "code": err.code(),
                        "message": err.to_string(),
                        "checkpoint_id": checkpoint_id,
                    }),
                ));
                Err(err)
            }
        }
    }
}

fn attach_checkpoint(err: HostKitError, id: Option<i64>) -> HostKitError {
    match err {
        HostKitError::MigrationFailed {
            project,
            exit_code,
            output,
            ..
        } => HostKitError::MigrationFailed {
            project,
            exit_code,
            output,
            checkpoint_id: id,
        },
        HostKitError::MigrationTimeout {
            project,
            command,
            timeout_secs,
            ..
        } => HostKitError::MigrationTimeout {
            project,
            command,
            timeout_secs,
            checkpoint_id: id,
        },
        other => other,
    }
}
