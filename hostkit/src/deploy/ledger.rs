//! Deploy ledger
//!
//! One record per deploy attempt. Records are only ever appended, except that an
//! attempt whose post-sync migration fails flips its own record to failed. Both
//! admission gates derive their decisions from fresh reads of this table, so
//! every read goes straight to the database and sees the latest local write.

use chrono::{DateTime, Utc};
use hostkit_models::{DeployRecord, NewDeployRecord};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::errors::HostKitError;
use crate::storage::db::Database;
use crate::utils::{from_millis, to_millis};

const SELECT_COLUMNS: &str = "SELECT id, project, timestamp_ms, actor, success, duration_ms, \
     source_type, files_synced, override_used, error_message FROM deploy_history";

/// Deploy history store
#[derive(Clone)]
pub struct DeployLedger {
    db: Database,
}

impl DeployLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a record and return it with its assigned id
    pub async fn append(&self, record: NewDeployRecord) -> Result<DeployRecord, HostKitError> {
        let row = record.clone();
        let id = self
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO deploy_history (project, timestamp_ms, actor, success, \
                     duration_ms, source_type, files_synced, override_used, error_message) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.project,
                        to_millis(row.timestamp),
                        row.actor,
                        row.success,
                        row.duration_ms as i64,
                        row.source_type,
                        row.files_synced as i64,
                        row.override_used,
                        row.error_message,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        debug!(
            "Recorded deploy #{} for {} (success={})",
            id, record.project, record.success
        );
        Ok(record.with_id(id))
    }

    /// Mark an already written attempt as failed
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), HostKitError> {
        let message = error_message.to_string();
        let updated = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE deploy_history SET success = 0, error_message = ?2 WHERE id = ?1",
                    params![id, message],
                )?)
            })
            .await?;
        if updated == 0 {
            return Err(HostKitError::Internal(format!("deploy record #{id} does not exist")));
        }
        debug!("Marked deploy #{} as failed", id);
        Ok(())
    }

    /// Most recent records first, optionally bounded below by `since`
    pub async fn query(
        &self,
        project: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<DeployRecord>, HostKitError> {
        let project = project.to_string();
        let since_ms = since.map(to_millis).unwrap_or(i64::MIN);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_COLUMNS} WHERE project = ?1 AND timestamp_ms >= ?2 \
                     ORDER BY timestamp_ms DESC, id DESC LIMIT ?3"
                ))?;
                let records = stmt
                    .query_map(params![project, since_ms, limit], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
    }

    /// Number of attempts (successful or not) at or after `since`
    pub async fn count_since(
        &self,
        project: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, HostKitError> {
        let project = project.to_string();
        self.db
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM deploy_history WHERE project = ?1 AND timestamp_ms >= ?2",
                    params![project, to_millis(since)],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    /// Number of failed attempts at or after `since`
    pub async fn count_failures_since(
        &self,
        project: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, HostKitError> {
        let project = project.to_string();
        self.db
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM deploy_history \
                     WHERE project = ?1 AND timestamp_ms >= ?2 AND success = 0",
                    params![project, to_millis(since)],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    /// Failures since the most recent success.
    ///
    /// Zero when the latest record is a success or there is no history at all.
    pub async fn consecutive_failures(&self, project: &str) -> Result<i64, HostKitError> {
        let project = project.to_string();
        self.db
            .call(move |conn| {
                let last_success: Option<(i64, i64)> = conn
                    .query_row(
                        "SELECT timestamp_ms, id FROM deploy_history \
                         WHERE project = ?1 AND success = 1 \
                         ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
                        params![project],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let count = match last_success {
                    Some((ts, id)) => conn.query_row(
                        "SELECT COUNT(*) FROM deploy_history \
                         WHERE project = ?1 AND success = 0 \
                         AND (timestamp_ms > ?2 OR (timestamp_ms = ?2 AND id > ?3))",
                        params![project, ts, id],
                        |row| row.get(0),
                    )?,
                    None => conn.query_row(
                        "SELECT COUNT(*) FROM deploy_history WHERE project = ?1 AND success = 0",
                        params![project],
                        |row| row.get(0),
                    )?,
                };
                Ok(count)
            })
            .await
    }

    /// Timestamp of the most recent failed attempt
    pub async fn last_failure_at(
        &self,
        project: &str,
    ) -> Result<Option<DateTime<Utc>>, HostKitError> {
        let project = project.to_string();
        self.db
            .call(move |conn| {
                let ts: Option<i64> = conn
                    .query_row(
                        "SELECT MAX(timestamp_ms) FROM deploy_history \
                         WHERE project = ?1 AND success = 0",
                        params![project],
                        |row| row.get(0),
                    )?;
                Ok(ts.map(from_millis))
            })
            .await
    }

    /// Delete the whole history of a project, returning the number of rows removed
    pub async fn delete_for_project(&self, project: &str) -> Result<usize, HostKitError> {
        let name = project.to_string();
        let deleted = self
            .db
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM deploy_history WHERE project = ?1",
                    params![name],
                )?)
            })
            .await?;
        info!("Cleared {} deploy records for {}", deleted, project);
        Ok(deleted)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeployRecord> {
    Ok(DeployRecord {
        id: row.get(0)?,
        project: row.get(1)?,
        timestamp: from_millis(row.get(2)?),
        actor: row.get(3)?,
        success: row.get(4)?,
        duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
        source_type: row.get(6)?,
        files_synced: row.get::<_, i64>(7)?.max(0) as u64,
        override_used: row.get(8)?,
        error_message: row.get(9)?,
    })
}
