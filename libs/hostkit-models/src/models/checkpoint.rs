//! Checkpoint models

use serde::{Deserialize, Serialize};

/// A database checkpoint created by the external checkpoint service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
