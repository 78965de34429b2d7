//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use hostkit_models::{AutoPauseConfig, RateLimitConfig};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::HostKitError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;
use crate::utils::validate_minutes;

/// HostKit settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit console logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// SQLite database holding the deploy ledger and gate configuration
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Parent directory of all project homes
    #[serde(default = "default_projects_root")]
    pub projects_root: PathBuf,

    /// Child-process tools used for syncing
    #[serde(default)]
    pub sync: SyncSettings,

    /// Migration runner configuration
    #[serde(default)]
    pub migration: MigrationSettings,

    /// Rate limit values used until a project gets its own row
    #[serde(default)]
    pub rate_limit_defaults: RateLimitDefaults,

    /// Auto-pause values used until a project gets its own row
    #[serde(default)]
    pub auto_pause_defaults: AutoPauseDefaults,

    /// Alert webhook
    #[serde(default)]
    pub alerts: AlertSettings,

    /// Checkpoint service
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_database_path() -> PathBuf {
    PathBuf::from("/var/lib/hostkit/hostkit.db")
}

fn default_projects_root() -> PathBuf {
    PathBuf::from("/home")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            json_logs: false,
            database_path: default_database_path(),
            projects_root: default_projects_root(),
            sync: SyncSettings::default(),
            migration: MigrationSettings::default(),
            rate_limit_defaults: RateLimitDefaults::default(),
            auto_pause_defaults: AutoPauseDefaults::default(),
            alerts: AlertSettings::default(),
            checkpoint: CheckpointSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, HostKitError> {
        let settings: Settings = if file.exists().await {
            file.read_json().await.map_err(|e| {
                HostKitError::ConfigError(format!(
                    "unable to read {}: {}",
                    file.path().display(),
                    e
                ))
            })?
        } else {
            debug!("No settings file at {}, using defaults", file.path().display());
            Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make the gates or clients misbehave
    pub fn validate(&self) -> Result<(), HostKitError> {
        let windows = [
            ("rate_limit_defaults.window_minutes", self.rate_limit_defaults.window_minutes),
            (
                "rate_limit_defaults.failure_cooldown_minutes",
                self.rate_limit_defaults.failure_cooldown_minutes,
            ),
            ("auto_pause_defaults.window_minutes", self.auto_pause_defaults.window_minutes),
        ];
        for (name, value) in windows {
            validate_minutes(name, value).map_err(|e| match e {
                HostKitError::InvalidArgument(msg) => HostKitError::ConfigError(msg),
                other => other,
            })?;
        }

        let positive = [
            (
                "rate_limit_defaults.consecutive_failure_limit",
                self.rate_limit_defaults.consecutive_failure_limit,
            ),
            ("auto_pause_defaults.failure_threshold", self.auto_pause_defaults.failure_threshold),
        ];
        for (name, value) in positive {
            if value < 1 {
                return Err(HostKitError::ConfigError(format!("{name} must be >= 1")));
            }
        }

        if self.migration.timeout_secs == 0 {
            return Err(HostKitError::ConfigError(
                "migration.timeout_secs must be >= 1".to_string(),
            ));
        }

        for (name, value) in [
            ("alerts.webhook_url", &self.alerts.webhook_url),
            ("checkpoint.endpoint", &self.checkpoint.endpoint),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| HostKitError::ConfigError(format!("{name}: {e}")))?;
            }
        }

        Ok(())
    }

    /// Storage layout derived from these settings
    pub fn layout(&self, config_dir: impl Into<PathBuf>) -> StorageLayout {
        StorageLayout::new(config_dir, &self.database_path, &self.projects_root)
    }
}

/// Sync tool settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Delete-mirroring directory sync binary
    #[serde(default = "default_rsync_bin")]
    pub rsync_bin: String,

    /// Ownership-change binary
    #[serde(default = "default_chown_bin")]
    pub chown_bin: String,
}

fn default_rsync_bin() -> String {
    "rsync".to_string()
}

fn default_chown_bin() -> String {
    "chown".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            rsync_bin: default_rsync_bin(),
            chown_bin: default_chown_bin(),
        }
    }
}

/// Migration runner settings
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationSettings {
    /// Hard wall-clock limit for one migration
    #[serde(default = "default_migration_timeout")]
    pub timeout_secs: u64,

    /// Interpreter used when the project has no virtualenv
    #[serde(default = "default_fallback_python")]
    pub fallback_python: String,
}

fn default_migration_timeout() -> u64 {
    300
}

fn default_fallback_python() -> String {
    "python3".to_string()
}

impl MigrationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_migration_timeout(),
            fallback_python: default_fallback_python(),
        }
    }
}

/// Default rate limit applied to projects without a stored config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitDefaults {
    #[serde(default = "default_max_deploys")]
    pub max_deploys: i64,

    #[serde(default = "default_rate_window")]
    pub window_minutes: i64,

    #[serde(default = "default_failure_cooldown")]
    pub failure_cooldown_minutes: i64,

    #[serde(default = "default_consecutive_failure_limit")]
    pub consecutive_failure_limit: i64,
}

fn default_max_deploys() -> i64 {
    10
}

fn default_rate_window() -> i64 {
    60
}

fn default_failure_cooldown() -> i64 {
    5
}

fn default_consecutive_failure_limit() -> i64 {
    3
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            max_deploys: default_max_deploys(),
            window_minutes: default_rate_window(),
            failure_cooldown_minutes: default_failure_cooldown(),
            consecutive_failure_limit: default_consecutive_failure_limit(),
        }
    }
}

impl RateLimitDefaults {
    pub fn config_for(&self, project: &str) -> RateLimitConfig {
        RateLimitConfig {
            project: project.to_string(),
            max_deploys: self.max_deploys,
            window_minutes: self.window_minutes,
            failure_cooldown_minutes: self.failure_cooldown_minutes,
            consecutive_failure_limit: self.consecutive_failure_limit,
        }
    }
}

/// Default auto-pause values applied to projects without a stored config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AutoPauseDefaults {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i64,

    #[serde(default = "default_pause_window")]
    pub window_minutes: i64,
}

fn default_failure_threshold() -> i64 {
    5
}

fn default_pause_window() -> i64 {
    10
}

impl Default for AutoPauseDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: default_failure_threshold(),
            window_minutes: default_pause_window(),
        }
    }
}

impl AutoPauseDefaults {
    pub fn config_for(&self, project: &str) -> AutoPauseConfig {
        AutoPauseConfig {
            project: project.to_string(),
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            window_minutes: self.window_minutes,
            paused: false,
            paused_at: None,
            paused_reason: None,
        }
    }
}

/// Alert webhook settings
#[derive(Debug, Default, Deserialize)]
pub struct AlertSettings {
    /// Endpoint receiving alert payloads; alerts are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Bearer token sent with each alert
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub webhook_token: Option<SecretString>,
}

/// Checkpoint service settings
#[derive(Debug, Default, Deserialize)]
pub struct CheckpointSettings {
    /// Base URL of the checkpoint service
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}
