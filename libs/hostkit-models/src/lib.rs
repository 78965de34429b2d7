//! HostKit shared models
//!
//! Serializable types exchanged between the HostKit core and whatever renders its
//! output (the CLI, or an agent reading the JSON envelope).

pub mod models;

pub use models::build::{BuildClassification, BuildType};
pub use models::checkpoint::Checkpoint;
pub use models::deploy::{DeployRecord, NewDeployRecord};
pub use models::envelope::{Envelope, ErrorBody, VersionResponse};
pub use models::gates::{AutoPauseConfig, AutoPauseStatus, RateLimitConfig, RateLimitStatus};
pub use models::migration::MigrationResult;
