//! SQLite database handle
//!
//! One connection per process, shared behind a mutex. Every call runs on the
//! blocking pool and a single-permit semaphore keeps at most one blocking
//! thread waiting on the lock at a time.
//!
//! # Schema
//!
//! - `projects`: registered projects (`name`, `owner`, `has_database`, `created_at`)
//! - `deploy_history`: the append-only deploy ledger, timestamps in UTC milliseconds
//! - `rate_limit_config`: per-project admission settings, absent until explicitly set
//! - `auto_pause_config`: per-project breaker settings and latch state

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::errors::HostKitError;

const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS projects (\
      name TEXT PRIMARY KEY,\
      owner TEXT NOT NULL,\
      has_database INTEGER NOT NULL DEFAULT 0,\
      created_at INTEGER NOT NULL\
    );\
    CREATE TABLE IF NOT EXISTS deploy_history (\
      id INTEGER PRIMARY KEY AUTOINCREMENT,\
      project TEXT NOT NULL,\
      timestamp_ms INTEGER NOT NULL,\
      actor TEXT NOT NULL,\
      success INTEGER NOT NULL,\
      duration_ms INTEGER NOT NULL DEFAULT 0,\
      source_type TEXT NOT NULL,\
      files_synced INTEGER NOT NULL DEFAULT 0,\
      override_used INTEGER NOT NULL DEFAULT 0,\
      error_message TEXT\
    );\
    CREATE INDEX IF NOT EXISTS idx_deploy_history_project_ts \
      ON deploy_history(project, timestamp_ms DESC, id DESC);\
    CREATE TABLE IF NOT EXISTS rate_limit_config (\
      project TEXT PRIMARY KEY,\
      max_deploys INTEGER NOT NULL,\
      window_minutes INTEGER NOT NULL,\
      failure_cooldown_minutes INTEGER NOT NULL,\
      consecutive_failure_limit INTEGER NOT NULL\
    );\
    CREATE TABLE IF NOT EXISTS auto_pause_config (\
      project TEXT PRIMARY KEY,\
      enabled INTEGER NOT NULL,\
      failure_threshold INTEGER NOT NULL,\
      window_minutes INTEGER NOT NULL,\
      paused INTEGER NOT NULL DEFAULT 0,\
      paused_at_ms INTEGER,\
      paused_reason TEXT\
    );";

/// Shared SQLite handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    sem: Arc<Semaphore>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostKitError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and dry runs
    pub fn open_in_memory() -> Result<Self, HostKitError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, HostKitError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sem: Arc::new(Semaphore::new(1)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// A poisoned mutex is recovered: the connection itself is still usable.
    pub async fn call<F, R>(&self, f: F) -> Result<R, HostKitError>
    where
        F: FnOnce(&mut Connection) -> Result<R, HostKitError> + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self
            .sem
            .acquire()
            .await
            .map_err(|e| HostKitError::Internal(format!("database semaphore closed: {e}")))?;
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await?
    }

    /// Close the semaphore so later calls fail fast; in-flight calls finish
    pub fn close(&self) {
        self.sem.close();
    }
}
