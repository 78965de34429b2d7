//! Deploy admission control
//!
//! A sliding-window deploy counter plus a cooldown after a streak of failures.
//! Nothing is cached: every decision recomputes from the ledger and the stored
//! config, read immediately before deciding.
//!
//! When both the window and the cooldown would block, the window check wins and
//! the caller sees RATE_LIMIT_EXCEEDED.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostkit_models::{RateLimitConfig, RateLimitStatus};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::deploy::ledger::DeployLedger;
use crate::errors::HostKitError;
use crate::storage::db::Database;
use crate::storage::settings::RateLimitDefaults;
use crate::utils::{minutes_after, minutes_before, validate_minutes};

/// Partial update of a project's rate limit config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitUpdate {
    pub max_deploys: Option<i64>,
    pub window_minutes: Option<i64>,
    pub failure_cooldown_minutes: Option<i64>,
    pub consecutive_failure_limit: Option<i64>,
}

/// Outcome of an admission decision that may have been overridden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No limit was hit
    Allowed,
    /// A limit was hit and the caller explicitly bypassed it
    Overridden,
}

impl Admission {
    pub fn override_used(&self) -> bool {
        matches!(self, Admission::Overridden)
    }
}

/// Rate limiter
pub struct RateLimiter {
    db: Database,
    ledger: DeployLedger,
    clock: Arc<dyn Clock>,
    defaults: RateLimitDefaults,
}

impl RateLimiter {
    pub fn new(
        db: Database,
        ledger: DeployLedger,
        clock: Arc<dyn Clock>,
        defaults: RateLimitDefaults,
    ) -> Self {
        Self {
            db,
            ledger,
            clock,
            defaults,
        }
    }

    /// Stored config, or the defaults when the project has none. Never writes.
    pub async fn get_config(&self, project: &str) -> Result<RateLimitConfig, HostKitError> {
        let name = project.to_string();
        let stored = self
            .db
            .call(move |conn| {
                let config = conn
                    .query_row(
                        "SELECT project, max_deploys, window_minutes, failure_cooldown_minutes, \
                         consecutive_failure_limit FROM rate_limit_config WHERE project = ?1",
                        params![name],
                        |row| {
                            Ok(RateLimitConfig {
                                project: row.get(0)?,
                                max_deploys: row.get(1)?,
                                window_minutes: row.get(2)?,
                                failure_cooldown_minutes: row.get(3)?,
                                consecutive_failure_limit: row.get(4)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(config)
            })
            .await?;

        Ok(stored.unwrap_or_else(|| self.defaults.config_for(project)))
    }

    /// Apply a partial update and persist the result
    pub async fn set_config(
        &self,
        project: &str,
        update: RateLimitUpdate,
    ) -> Result<RateLimitConfig, HostKitError> {
        let mut config = self.get_config(project).await?;
        if let Some(v) = update.max_deploys {
            config.max_deploys = v;
        }
        if let Some(v) = update.window_minutes {
            config.window_minutes = v;
        }
        if let Some(v) = update.failure_cooldown_minutes {
            config.failure_cooldown_minutes = v;
        }
        if let Some(v) = update.consecutive_failure_limit {
            config.consecutive_failure_limit = v;
        }
        validate(&config)?;

        let row = config.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO rate_limit_config (project, max_deploys, window_minutes, \
                     failure_cooldown_minutes, consecutive_failure_limit) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(project) DO UPDATE SET max_deploys = excluded.max_deploys, \
                     window_minutes = excluded.window_minutes, \
                     failure_cooldown_minutes = excluded.failure_cooldown_minutes, \
                     consecutive_failure_limit = excluded.consecutive_failure_limit",
                    params![
                        row.project,
                        row.max_deploys,
                        row.window_minutes,
                        row.failure_cooldown_minutes,
                        row.consecutive_failure_limit,
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!("Rate limit config for {} set to {:?}", project, config);
        Ok(config)
    }

    /// Drop the stored config so the defaults apply again
    pub async fn reset_config(&self, project: &str) -> Result<RateLimitConfig, HostKitError> {
        let name = project.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM rate_limit_config WHERE project = ?1",
                    params![name],
                )?;
                Ok(())
            })
            .await?;
        Ok(self.defaults.config_for(project))
    }

    /// Current derived state
    pub async fn status(&self, project: &str) -> Result<RateLimitStatus, HostKitError> {
        let (status, _) = self.evaluate(project).await?;
        Ok(status)
    }

    /// Fail with RATE_LIMIT_EXCEEDED or COOLDOWN_ACTIVE if a deploy may not proceed
    pub async fn check(&self, project: &str) -> Result<(), HostKitError> {
        match self.evaluate(project).await? {
            (_, Some(err)) => Err(err),
            (_, None) => Ok(()),
        }
    }

    /// Like [`RateLimiter::check`], but an explicit override turns a block into
    /// [`Admission::Overridden`] so the caller can mark the ledger record.
    pub async fn admit(
        &self,
        project: &str,
        override_requested: bool,
    ) -> Result<Admission, HostKitError> {
        match self.check(project).await {
            Ok(()) => Ok(Admission::Allowed),
            Err(err) if override_requested && err.is_admission() => {
                warn!("Rate limit overridden for {}: {}", project, err);
                Ok(Admission::Overridden)
            }
            Err(err) => Err(err),
        }
    }

    async fn evaluate(
        &self,
        project: &str,
    ) -> Result<(RateLimitStatus, Option<HostKitError>), HostKitError> {
        let config = self.get_config(project).await?;
        let now = self.clock.now();

        let window_start = minutes_before(now, config.window_minutes)?;
        let deploys_in_window = self.ledger.count_since(project, window_start).await?;
        let consecutive_failures = self.ledger.consecutive_failures(project).await?;

        let mut cooldown_ends_at = None;
        let mut last_failure = None;
        if consecutive_failures >= config.consecutive_failure_limit {
            last_failure = self.ledger.last_failure_at(project).await?;
            cooldown_ends_at = last_failure
                .map(|at| minutes_after(at, config.failure_cooldown_minutes))
                .transpose()?;
        }
        let in_cooldown = cooldown_ends_at.is_some_and(|end| now < end);

        let error = if !config.is_unlimited() && deploys_in_window >= config.max_deploys {
            Some(HostKitError::RateLimitExceeded {
                message: format!(
                    "Rate limit exceeded for '{}': {} deploys in the last {} minutes (max {})",
                    project, deploys_in_window, config.window_minutes, config.max_deploys
                ),
            })
        } else if let (true, Some(end), Some(last)) = (in_cooldown, cooldown_ends_at, last_failure)
        {
            Some(HostKitError::CooldownActive {
                message: cooldown_message(project, &config, consecutive_failures, last, end, now),
            })
        } else {
            None
        };

        let status = RateLimitStatus {
            project: project.to_string(),
            deploys_in_window,
            max_deploys: config.max_deploys,
            window_minutes: config.window_minutes,
            consecutive_failures,
            consecutive_failure_limit: config.consecutive_failure_limit,
            in_cooldown,
            cooldown_ends_at,
            is_blocked: error.is_some(),
            block_reason: error.as_ref().map(|e| e.to_string()),
        };
        Ok((status, error))
    }
}

fn cooldown_message(
    project: &str,
    config: &RateLimitConfig,
    consecutive_failures: i64,
    last_failure: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    format!(
        "Deploy cooldown active for '{}': {} consecutive failures (limit {}), last failure at {}, \
         cooldown of {} minutes ends at {} ({}s remaining)",
        project,
        consecutive_failures,
        config.consecutive_failure_limit,
        last_failure.to_rfc3339(),
        config.failure_cooldown_minutes,
        ends_at.to_rfc3339(),
        (ends_at - now).num_seconds().max(0)
    )
}

fn validate(config: &RateLimitConfig) -> Result<(), HostKitError> {
    validate_minutes("window_minutes", config.window_minutes)?;
    validate_minutes("failure_cooldown_minutes", config.failure_cooldown_minutes)?;
    if config.consecutive_failure_limit < 1 {
        return Err(HostKitError::InvalidArgument(format!(
            "consecutive_failure_limit must be >= 1 (got {})",
            config.consecutive_failure_limit
        )));
    }
    Ok(())
}
