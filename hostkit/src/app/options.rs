//! Application startup options

use std::path::PathBuf;
use std::sync::Arc;

use crate::checkpoint::CheckpointService;
use crate::clock::{Clock, SystemClock};
use crate::notify::AlertSink;
use crate::storage::db::Database;

/// Overrides applied while building [`crate::app::state::AppState`].
///
/// Anything left as `None` is built from the settings file.
#[derive(Clone)]
pub struct AppOptions {
    /// Directory holding settings.json
    pub config_dir: PathBuf,

    /// Time source for the gates
    pub clock: Arc<dyn Clock>,

    /// Use this database instead of opening the configured path
    pub database: Option<Database>,

    /// Use this sink instead of the configured webhook
    pub alert_sink: Option<Arc<dyn AlertSink>>,

    /// Use this service instead of the configured endpoint
    pub checkpoints: Option<Arc<dyn CheckpointService>>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/hostkit"),
            clock: Arc::new(SystemClock),
            database: None,
            alert_sink: None,
            checkpoints: None,
        }
    }
}
