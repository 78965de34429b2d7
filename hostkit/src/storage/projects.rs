//! Project registry

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::errors::HostKitError;
use crate::storage::db::Database;
use crate::utils::{from_millis, to_millis, validate_project_name};

/// A project hosted on this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project name, also its Unix user and home directory name
    pub name: String,

    /// Owner applied to synced files (`owner:owner`)
    pub owner: String,

    /// Whether a database is provisioned; migrations are checkpointed when set
    pub has_database: bool,

    pub created_at: DateTime<Utc>,
}

/// Registry of known projects
#[derive(Clone)]
pub struct ProjectRegistry {
    db: Database,
}

impl ProjectRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a project, or update owner/database flag if it already exists
    pub async fn register(
        &self,
        name: &str,
        owner: Option<&str>,
        has_database: bool,
        now: DateTime<Utc>,
    ) -> Result<Project, HostKitError> {
        validate_project_name(name)?;
        let project = Project {
            name: name.to_string(),
            owner: owner.unwrap_or(name).to_string(),
            has_database,
            created_at: now,
        };

        let row = project.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO projects (name, owner, has_database, created_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, \
                     has_database = excluded.has_database",
                    params![row.name, row.owner, row.has_database, to_millis(row.created_at)],
                )?;
                Ok(())
            })
            .await?;

        self.require(name).await
    }

    /// Look a project up by name
    pub async fn get(&self, name: &str) -> Result<Option<Project>, HostKitError> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                let project = conn
                    .query_row(
                        "SELECT name, owner, has_database, created_at FROM projects WHERE name = ?1",
                        params![name],
                        row_to_project,
                    )
                    .optional()?;
                Ok(project)
            })
            .await
    }

    /// Like [`ProjectRegistry::get`] but fails with PROJECT_NOT_FOUND
    pub async fn require(&self, name: &str) -> Result<Project, HostKitError> {
        self.get(name)
            .await?
            .ok_or_else(|| HostKitError::ProjectNotFound(name.to_string()))
    }

    pub async fn exists(&self, name: &str) -> Result<bool, HostKitError> {
        Ok(self.get(name).await?.is_some())
    }

    /// All projects, by name
    pub async fn list(&self) -> Result<Vec<Project>, HostKitError> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, owner, has_database, created_at FROM projects ORDER BY name",
                )?;
                let projects = stmt
                    .query_map([], row_to_project)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(projects)
            })
            .await
    }

    /// Forget a project. Its deploy history and gate config are left alone.
    pub async fn remove(&self, name: &str) -> Result<(), HostKitError> {
        let owned = name.to_string();
        let removed = self
            .db
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM projects WHERE name = ?1", params![owned])?)
            })
            .await?;
        if removed == 0 {
            return Err(HostKitError::ProjectNotFound(name.to_string()));
        }
        Ok(())
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        name: row.get(0)?,
        owner: row.get(1)?,
        has_database: row.get(2)?,
        created_at: from_millis(row.get(3)?),
    })
}
