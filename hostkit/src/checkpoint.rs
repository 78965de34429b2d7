//! Checkpoint service client
//!
//! Checkpoints are owned by an external service. HostKit only asks for one to be
//! taken before a migration and tells the operator how to restore it.

use async_trait::async_trait;
use hostkit_models::Checkpoint;
use serde::Serialize;
use tracing::info;

use crate::errors::HostKitError;
use crate::http::client::HttpClient;

/// Label used for checkpoints taken before a migration
pub const PRE_MIGRATE_LABEL: &str = "pre-migrate";
pub const PRE_MIGRATION_TYPE: &str = "pre_migration";
pub const MIGRATE_TRIGGER: &str = "migrate";

/// Create and restore project checkpoints
#[async_trait]
pub trait CheckpointService: Send + Sync {
    async fn create_checkpoint(
        &self,
        project: &str,
        label: &str,
        checkpoint_type: &str,
        trigger_source: &str,
    ) -> Result<Checkpoint, HostKitError>;

    async fn restore(&self, project: &str, id: i64) -> Result<(), HostKitError>;
}

#[derive(Serialize)]
struct CreateCheckpointRequest<'a> {
    label: &'a str,
    checkpoint_type: &'a str,
    trigger_source: &'a str,
}

/// Checkpoint service reached over HTTP
pub struct HttpCheckpointService {
    client: HttpClient,
}

impl HttpCheckpointService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckpointService for HttpCheckpointService {
    async fn create_checkpoint(
        &self,
        project: &str,
        label: &str,
        checkpoint_type: &str,
        trigger_source: &str,
    ) -> Result<Checkpoint, HostKitError> {
        let checkpoint: Checkpoint = self
            .client
            .post(
                &format!("/projects/{project}/checkpoints"),
                &CreateCheckpointRequest {
                    label,
                    checkpoint_type,
                    trigger_source,
                },
            )
            .await
            .map_err(|e| HostKitError::CheckpointError(e.to_string()))?;
        info!("Created checkpoint {} for {}", checkpoint.id, project);
        Ok(checkpoint)
    }

    async fn restore(&self, project: &str, id: i64) -> Result<(), HostKitError> {
        self.client
            .post_no_content(
                &format!("/projects/{project}/checkpoints/{id}/restore"),
                &serde_json::json!({}),
            )
            .await
            .map_err(|e| HostKitError::CheckpointError(e.to_string()))?;
        info!("Restored checkpoint {} for {}", id, project);
        Ok(())
    }
}

/// Used when no checkpoint endpoint is configured
pub struct UnconfiguredCheckpointService;

#[async_trait]
impl CheckpointService for UnconfiguredCheckpointService {
    async fn create_checkpoint(
        &self,
        project: &str,
        _label: &str,
        _checkpoint_type: &str,
        _trigger_source: &str,
    ) -> Result<Checkpoint, HostKitError> {
        Err(HostKitError::CheckpointError(format!(
            "no checkpoint endpoint configured, cannot checkpoint '{project}'"
        )))
    }

    async fn restore(&self, project: &str, _id: i64) -> Result<(), HostKitError> {
        Err(HostKitError::CheckpointError(format!(
            "no checkpoint endpoint configured, cannot restore '{project}'"
        )))
    }
}
