//! Auto-pause circuit breaker
//!
//! A latch, not a rolling window: once tripped a project stays paused until
//! [`AutoPause::resume`] is called, however long ago the failures were.

use std::sync::Arc;

use hostkit_models::{AutoPauseConfig, AutoPauseStatus};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::deploy::ledger::DeployLedger;
use crate::errors::HostKitError;
use crate::notify::{Alert, AlertEvent, Notifier};
use crate::storage::db::Database;
use crate::storage::projects::ProjectRegistry;
use crate::storage::settings::AutoPauseDefaults;
use crate::utils::{from_millis, minutes_before, to_millis, validate_minutes};

/// Partial update of the breaker settings; pause state is not settable here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoPauseUpdate {
    pub enabled: Option<bool>,
    pub failure_threshold: Option<i64>,
    pub window_minutes: Option<i64>,
}

/// Result of a resume
#[derive(Debug, Clone, Serialize)]
pub struct ResumeResult {
    pub config: AutoPauseConfig,
    /// Ledger rows purged, when a reset was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures_cleared: Option<usize>,
}

/// Circuit breaker over the deploy ledger
pub struct AutoPause {
    db: Database,
    ledger: DeployLedger,
    registry: ProjectRegistry,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    defaults: AutoPauseDefaults,
}

impl AutoPause {
    pub fn new(
        db: Database,
        ledger: DeployLedger,
        registry: ProjectRegistry,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
        defaults: AutoPauseDefaults,
    ) -> Self {
        Self {
            db,
            ledger,
            registry,
            notifier,
            clock,
            defaults,
        }
    }

    /// Stored config, or the defaults when the project has none. Never writes.
    pub async fn get_config(&self, project: &str) -> Result<AutoPauseConfig, HostKitError> {
        let name = project.to_string();
        let stored = self
            .db
            .call(move |conn| {
                let config = conn
                    .query_row(
                        "SELECT project, enabled, failure_threshold, window_minutes, paused, \
                         paused_at_ms, paused_reason FROM auto_pause_config WHERE project = ?1",
                        params![name],
                        |row| {
                            Ok(AutoPauseConfig {
                                project: row.get(0)?,
                                enabled: row.get(1)?,
                                failure_threshold: row.get(2)?,
                                window_minutes: row.get(3)?,
                                paused: row.get(4)?,
                                paused_at: row.get::<_, Option<i64>>(5)?.map(from_millis),
                                paused_reason: row.get(6)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(config)
            })
            .await?;

        Ok(stored.unwrap_or_else(|| self.defaults.config_for(project)))
    }

    /// Update the breaker settings. Pause state is left untouched.
    pub async fn set_config(
        &self,
        project: &str,
        update: AutoPauseUpdate,
    ) -> Result<AutoPauseConfig, HostKitError> {
        let mut config = self.get_config(project).await?;
        if let Some(v) = update.enabled {
            config.enabled = v;
        }
        if let Some(v) = update.failure_threshold {
            config.failure_threshold = v;
        }
        if let Some(v) = update.window_minutes {
            config.window_minutes = v;
        }
        if config.failure_threshold < 1 {
            return Err(HostKitError::InvalidArgument(format!(
                "failure_threshold must be >= 1 (got {})",
                config.failure_threshold
            )));
        }
        validate_minutes("window_minutes", config.window_minutes)?;

        let row = config.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO auto_pause_config (project, enabled, failure_threshold, \
                     window_minutes) VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(project) DO UPDATE SET enabled = excluded.enabled, \
                     failure_threshold = excluded.failure_threshold, \
                     window_minutes = excluded.window_minutes",
                    params![
                        row.project,
                        row.enabled,
                        row.failure_threshold,
                        row.window_minutes
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(config)
    }

    pub async fn is_paused(&self, project: &str) -> Result<bool, HostKitError> {
        Ok(self.get_config(project).await?.paused)
    }

    /// Fail with PROJECT_PAUSED if the breaker is tripped
    pub async fn check_before_deploy(&self, project: &str) -> Result<(), HostKitError> {
        let config = self.get_config(project).await?;
        if !config.paused {
            return Ok(());
        }
        Err(HostKitError::ProjectPaused {
            project: project.to_string(),
            reason: config
                .paused_reason
                .unwrap_or_else(|| "no reason recorded".to_string()),
            paused_at: config
                .paused_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "an unknown time".to_string()),
        })
    }

    /// Trip the breaker if recent failures reach the threshold.
    ///
    /// Call after every recorded failure. Returns whether this call paused the project.
    pub async fn check_and_maybe_pause(&self, project: &str) -> Result<bool, HostKitError> {
        let config = self.get_config(project).await?;
        if !config.enabled || config.paused {
            return Ok(false);
        }

        let since = minutes_before(self.clock.now(), config.window_minutes)?;
        let failures = self.ledger.count_failures_since(project, since).await?;
        if failures < config.failure_threshold {
            return Ok(false);
        }

        let reason = format!(
            "Auto-paused: {} failures in {} minutes",
            failures, config.window_minutes
        );
        warn!("{}: {}", project, reason);
        self.latch(config, &reason, AlertEvent::AutoPause).await?;
        Ok(true)
    }

    /// Pause a registered project by hand
    pub async fn pause(&self, project: &str, reason: &str) -> Result<AutoPauseConfig, HostKitError> {
        self.registry.require(project).await?;
        let config = self.get_config(project).await?;
        info!("Pausing {}: {}", project, reason);
        self.latch(config, reason, AlertEvent::ManualPause).await
    }

    /// Clear the latch, optionally purging the project's deploy history
    pub async fn resume(
        &self,
        project: &str,
        reset_failures: bool,
    ) -> Result<ResumeResult, HostKitError> {
        let mut config = self.get_config(project).await?;
        if !config.paused {
            return Err(HostKitError::NotPaused(project.to_string()));
        }

        let name = project.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE auto_pause_config SET paused = 0, paused_at_ms = NULL, \
                     paused_reason = NULL WHERE project = ?1",
                    params![name],
                )?;
                Ok(())
            })
            .await?;

        let failures_cleared = if reset_failures {
            Some(self.ledger.delete_for_project(project).await?)
        } else {
            None
        };

        let previous_reason = config.paused_reason.take();
        config.paused = false;
        config.paused_at = None;
        info!("Resumed {}", project);

        self.notifier.notify(Alert::new(
            project,
            AlertEvent::Resume,
            self.clock.now(),
            json!({
                "previous_reason": previous_reason,
                "failures_cleared": failures_cleared,
            }),
        ));

        Ok(ResumeResult {
            config,
            failures_cleared,
        })
    }

    /// Config plus the failure count the breaker would see right now
    pub async fn status(&self, project: &str) -> Result<AutoPauseStatus, HostKitError> {
        let config = self.get_config(project).await?;
        let since = minutes_before(self.clock.now(), config.window_minutes)?;
        let failures_in_window = self.ledger.count_failures_since(project, since).await?;
        Ok(AutoPauseStatus {
            config,
            failures_in_window,
        })
    }

    async fn latch(
        &self,
        mut config: AutoPauseConfig,
        reason: &str,
        event: AlertEvent,
    ) -> Result<AutoPauseConfig, HostKitError> {
        let now = self.clock.now();
        config.paused = true;
        config.paused_at = Some(now);
        config.paused_reason = Some(reason.to_string());

        let row = config.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO auto_pause_config (project, enabled, failure_threshold, \
                     window_minutes, paused, paused_at_ms, paused_reason) \
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6) \
                     ON CONFLICT(project) DO UPDATE SET paused = 1, \
                     paused_at_ms = excluded.paused_at_ms, paused_reason = excluded.paused_reason",
                    params![
                        row.project,
                        row.enabled,
                        row.failure_threshold,
                        row.window_minutes,
                        to_millis(now),
                        row.paused_reason,
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.notifier.notify(Alert::new(
            &config.project,
            event,
            now,
            json!({
                "reason": reason,
                "failure_threshold": config.failure_threshold,
                "window_minutes": config.window_minutes,
            }),
        ));
        Ok(config)
    }
}
