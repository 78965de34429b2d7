//! Error types for HostKit

use hostkit_models::ErrorBody;
use thiserror::Error;

/// Main error type for HostKit.
///
/// Every variant maps to a stable code (see [`HostKitError::code`]) so that callers,
/// human or agent, can branch on the failure without parsing the message.
#[derive(Error, Debug)]
pub enum HostKitError {
    // Admission
    #[error("{message}")]
    RateLimitExceeded { message: String },

    #[error("{message}")]
    CooldownActive { message: String },

    #[error("Project '{project}' is paused since {paused_at}: {reason}")]
    ProjectPaused {
        project: String,
        reason: String,
        paused_at: String,
    },

    #[error("Project '{0}' is not paused")]
    NotPaused(String),

    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    // Normalizer
    #[error("Build is {0}, not a standalone Next.js build")]
    NotStandalone(String),

    #[error("Standalone server entry not found: {0}")]
    ServerNotFound(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    // Migration
    #[error("No migration framework detected in {0}")]
    NoFrameworkDetected(String),

    #[error("Unknown migration framework: {0}")]
    UnknownFramework(String),

    #[error("Migration for '{project}' timed out after {timeout_secs}s: {command}")]
    MigrationTimeout {
        project: String,
        command: String,
        timeout_secs: u64,
        checkpoint_id: Option<i64>,
    },

    #[error("Migration for '{project}' failed (exit code {exit_code:?}): {output}")]
    MigrationFailed {
        project: String,
        exit_code: Option<i32>,
        output: String,
        checkpoint_id: Option<i64>,
    },

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    // Infrastructure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostKitError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            HostKitError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            HostKitError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            HostKitError::ProjectPaused { .. } => "PROJECT_PAUSED",
            HostKitError::NotPaused(_) => "NOT_PAUSED",
            HostKitError::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            HostKitError::NotStandalone(_) => "NOT_STANDALONE",
            HostKitError::ServerNotFound(_) => "SERVER_NOT_FOUND",
            HostKitError::SyncError(_) => "SYNC_FAILED",
            HostKitError::NoFrameworkDetected(_) => "NO_FRAMEWORK_DETECTED",
            HostKitError::UnknownFramework(_) => "UNKNOWN_FRAMEWORK",
            HostKitError::MigrationTimeout { .. } => "MIGRATION_TIMEOUT",
            HostKitError::MigrationFailed { .. } => "MIGRATION_FAILED",
            HostKitError::CheckpointError(_) => "CHECKPOINT_FAILED",
            HostKitError::IoError(_) => "IO_ERROR",
            HostKitError::JsonError(_) => "INTERNAL_ERROR",
            HostKitError::DatabaseError(_) => "DATABASE_ERROR",
            HostKitError::HttpError(_) => "INTERNAL_ERROR",
            HostKitError::ConfigError(_) => "CONFIG_ERROR",
            HostKitError::InvalidArgument(_) => "INVALID_ARGUMENT",
            HostKitError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// What the operator (or agent) can do about it, if anything
    pub fn suggestion(&self) -> Option<String> {
        match self {
            HostKitError::RateLimitExceeded { .. } => Some(
                "Wait for the window to roll over, raise the limit with 'hostkit rate-limit set', \
                 or retry with --override-rate-limit"
                    .to_string(),
            ),
            HostKitError::CooldownActive { .. } => Some(
                "Fix the failing deploy and wait for the cooldown to end, \
                 or retry with --override-rate-limit"
                    .to_string(),
            ),
            HostKitError::ProjectPaused { project, .. } => Some(format!(
                "Investigate the failures, then run 'hostkit resume {project} --reset-failures'"
            )),
            HostKitError::NotPaused(project) => Some(format!(
                "Check the state with 'hostkit auto-pause show {project}'"
            )),
            HostKitError::ProjectNotFound(_) => {
                Some("List known projects with 'hostkit project list'".to_string())
            }
            HostKitError::NotStandalone(_) | HostKitError::ServerNotFound(_) => {
                Some("Classify the build first with 'hostkit classify <dir>'".to_string())
            }
            HostKitError::NoFrameworkDetected(_) => Some(
                "Pass --framework explicitly or supply --command with the migration command"
                    .to_string(),
            ),
            HostKitError::UnknownFramework(_) => Some(
                "Supported frameworks: alembic, django, prisma, drizzle, knex, sequelize"
                    .to_string(),
            ),
            HostKitError::MigrationFailed {
                project,
                checkpoint_id: Some(id),
                ..
            }
            | HostKitError::MigrationTimeout {
                project,
                checkpoint_id: Some(id),
                ..
            } => Some(format!(
                "Restore the pre-migration checkpoint with 'hostkit checkpoint restore {project} {id}'"
            )),
            HostKitError::MigrationTimeout { .. } => Some(
                "The migration was killed; check for locks and consider raising migration.timeout_secs"
                    .to_string(),
            ),
            HostKitError::MigrationFailed { .. } => {
                Some("Inspect the migration output and fix the migration before retrying".to_string())
            }
            HostKitError::ConfigError(_) => {
                Some("Check /etc/hostkit/settings.json or HOSTKIT_SETTINGS".to_string())
            }
            _ => None,
        }
    }

    /// The uniform `{code, message, suggestion?}` shape
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            suggestion: self.suggestion(),
        }
    }

    /// Admission errors stop an attempt before any mutation happens
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            HostKitError::RateLimitExceeded { .. }
                | HostKitError::CooldownActive { .. }
                | HostKitError::ProjectPaused { .. }
        )
    }
}

/// Recovers a wrapped [`HostKitError`] (context is dropped, the code survives)
impl From<anyhow::Error> for HostKitError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HostKitError>() {
            Ok(inner) => inner,
            Err(other) => HostKitError::Internal(format!("{other:#}")),
        }
    }
}

impl From<tokio::task::JoinError> for HostKitError {
    fn from(err: tokio::task::JoinError) -> Self {
        HostKitError::Internal(format!("task join error: {err}"))
    }
}
