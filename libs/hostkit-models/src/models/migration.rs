//! Migration models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of a migration run (or the resolved plan, for a dry run)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub project: String,
    pub framework: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub success: bool,
    pub output: String,
    pub dry_run: bool,
}
