//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of HostKit and the projects it hosts.
///
/// Every project lives under `{projects_root}/{name}`: code in `app/`, its
/// environment in `.env`, and an optional Python virtualenv in `venv/`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Directory holding settings.json
    pub config_dir: PathBuf,

    /// Path of the SQLite database
    pub database_path: PathBuf,

    /// Parent directory of all project homes
    pub projects_root: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(
        config_dir: impl Into<PathBuf>,
        database_path: impl Into<PathBuf>,
        projects_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            database_path: database_path.into(),
            projects_root: projects_root.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.config_dir.join("settings.json"))
    }

    /// Get the database file
    pub fn database_file(&self) -> File {
        File::new(&self.database_path)
    }

    /// Home directory of a project
    pub fn project_home(&self, project: &str) -> Dir {
        Dir::new(self.projects_root.join(project))
    }

    /// Directory the project's code is synced into
    pub fn app_dir(&self, project: &str) -> Dir {
        self.project_home(project).subdir("app")
    }

    /// The project's environment file
    pub fn env_file(&self, project: &str) -> File {
        self.project_home(project).file(".env")
    }

    /// Interpreter of the project's isolated Python runtime
    pub fn venv_python(&self, project: &str) -> File {
        File::new(self.project_home(project).path().join("venv").join("bin").join("python"))
    }

    /// Locally installed Node tool binaries
    pub fn node_bin_dir(&self, project: &str) -> Dir {
        Dir::new(self.app_dir(project).path().join("node_modules").join(".bin"))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/hostkit", "/var/lib/hostkit/hostkit.db", "/home")
    }
}
