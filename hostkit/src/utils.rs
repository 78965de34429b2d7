//! Utility functions

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use hostkit_models::VersionResponse;

use crate::errors::HostKitError;

/// Get version information
pub fn version_info() -> VersionResponse {
    VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Milliseconds since the Unix epoch, the storage format for ledger timestamps
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`to_millis`]; out-of-range values clamp to the minimum instant
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Longest window or cooldown accepted, one year
pub const MAX_WINDOW_MINUTES: i64 = 525_600;

/// Reject a window or cooldown length outside `1..=MAX_WINDOW_MINUTES`
pub fn validate_minutes(name: &str, value: i64) -> Result<(), HostKitError> {
    if (1..=MAX_WINDOW_MINUTES).contains(&value) {
        Ok(())
    } else {
        Err(HostKitError::InvalidArgument(format!(
            "{name} must be between 1 and {MAX_WINDOW_MINUTES} (got {value})"
        )))
    }
}

fn minutes(value: i64) -> Result<TimeDelta, HostKitError> {
    TimeDelta::try_minutes(value)
        .ok_or_else(|| HostKitError::InvalidArgument(format!("{value} minutes is out of range")))
}

/// `ts` moved back by `value` minutes
pub fn minutes_before(ts: DateTime<Utc>, value: i64) -> Result<DateTime<Utc>, HostKitError> {
    ts.checked_sub_signed(minutes(value)?).ok_or_else(|| {
        HostKitError::InvalidArgument(format!("{value} minutes before {ts} is out of range"))
    })
}

/// `ts` moved forward by `value` minutes
pub fn minutes_after(ts: DateTime<Utc>, value: i64) -> Result<DateTime<Utc>, HostKitError> {
    ts.checked_add_signed(minutes(value)?).ok_or_else(|| {
        HostKitError::InvalidArgument(format!("{value} minutes after {ts} is out of range"))
    })
}

/// Validate a project name.
///
/// Project names double as Unix user names and directory names, so they are
/// restricted to lowercase letters, digits and dashes, starting with a letter.
pub fn validate_project_name(name: &str) -> Result<(), HostKitError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            name.len() <= 32
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(HostKitError::InvalidArgument(format!(
            "invalid project name '{}': use 1-32 lowercase letters, digits or dashes, starting with a letter",
            name
        )))
    }
}
