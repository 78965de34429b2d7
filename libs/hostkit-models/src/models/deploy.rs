//! Deploy ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A deploy attempt that has not been written to the ledger yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeployRecord {
    pub project: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub success: bool,
    pub duration_ms: u64,
    pub source_type: String,
    pub files_synced: u64,
    pub override_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NewDeployRecord {
    /// Attach the identifier assigned by the ledger
    pub fn with_id(self, id: i64) -> DeployRecord {
        DeployRecord {
            id,
            project: self.project,
            timestamp: self.timestamp,
            actor: self.actor,
            success: self.success,
            duration_ms: self.duration_ms,
            source_type: self.source_type,
            files_synced: self.files_synced,
            override_used: self.override_used,
            error_message: self.error_message,
        }
    }
}

/// One immutable row of the deploy ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    pub id: i64,
    pub project: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub success: bool,
    pub duration_ms: u64,
    pub source_type: String,
    pub files_synced: u64,
    pub override_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
