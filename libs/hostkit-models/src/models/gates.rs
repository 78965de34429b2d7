//! Admission control and auto-pause models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-project rate limit configuration.
///
/// `max_deploys <= 0` disables the window check entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub project: String,
    pub max_deploys: i64,
    pub window_minutes: i64,
    pub failure_cooldown_minutes: i64,
    pub consecutive_failure_limit: i64,
}

impl RateLimitConfig {
    pub fn is_unlimited(&self) -> bool {
        self.max_deploys <= 0
    }
}

/// Derived rate limit state, never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub project: String,
    pub deploys_in_window: i64,
    pub max_deploys: i64,
    pub window_minutes: i64,
    pub consecutive_failures: i64,
    pub consecutive_failure_limit: i64,
    pub in_cooldown: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Per-project auto-pause (circuit breaker) configuration and latch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPauseConfig {
    pub project: String,
    pub enabled: bool,
    pub failure_threshold: i64,
    pub window_minutes: i64,
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,
}

/// Auto-pause config plus the failure count the breaker would see right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPauseStatus {
    #[serde(flatten)]
    pub config: AutoPauseConfig,
    pub failures_in_window: i64,
}
