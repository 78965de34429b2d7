//! Application state management
//!
//! Everything is built once at startup and handed to each component through its
//! constructor; there is no global state.

use std::sync::Arc;

use tracing::debug;

use crate::app::options::AppOptions;
use crate::checkpoint::{CheckpointService, HttpCheckpointService, UnconfiguredCheckpointService};
use crate::clock::Clock;
use crate::deploy::auto_pause::AutoPause;
use crate::deploy::ledger::DeployLedger;
use crate::deploy::migrate::{MigrationRunner, MigrationService};
use crate::deploy::pipeline::Deployer;
use crate::deploy::rate_limit::RateLimiter;
use crate::errors::HostKitError;
use crate::http::client::HttpClient;
use crate::notify::webhook::WebhookAlertSink;
use crate::notify::{AlertSink, LogAlertSink, Notifier};
use crate::storage::db::Database;
use crate::storage::layout::StorageLayout;
use crate::storage::projects::ProjectRegistry;
use crate::storage::settings::Settings;
use crate::sync::ownership::Ownership;
use crate::sync::rsync::Mirror;

/// Main application state
pub struct AppState {
    pub layout: StorageLayout,
    pub clock: Arc<dyn Clock>,
    pub db: Database,
    pub registry: ProjectRegistry,
    pub ledger: DeployLedger,
    pub rate_limiter: Arc<RateLimiter>,
    pub auto_pause: Arc<AutoPause>,
    pub migrations: Arc<MigrationService>,
    pub checkpoints: Arc<dyn CheckpointService>,
    pub deployer: Arc<Deployer>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(settings: &Settings, options: AppOptions) -> Result<Self, HostKitError> {
        debug!("Initializing application state...");
        let layout = settings.layout(&options.config_dir);
        let clock = options.clock;

        let db = match options.database {
            Some(db) => db,
            None => Database::open(layout.database_file().path())?,
        };
        let registry = ProjectRegistry::new(db.clone());
        let ledger = DeployLedger::new(db.clone());

        let sink: Arc<dyn AlertSink> = match (options.alert_sink, &settings.alerts.webhook_url) {
            (Some(sink), _) => sink,
            (None, Some(url)) => Arc::new(WebhookAlertSink::new(HttpClient::new(
                url,
                settings.alerts.webhook_token.clone(),
            )?)),
            (None, None) => Arc::new(LogAlertSink),
        };
        let notifier = Arc::new(Notifier::new(sink));

        let checkpoints: Arc<dyn CheckpointService> =
            match (options.checkpoints, &settings.checkpoint.endpoint) {
                (Some(service), _) => service,
                (None, Some(endpoint)) => Arc::new(HttpCheckpointService::new(HttpClient::new(
                    endpoint,
                    settings.checkpoint.token.clone(),
                )?)),
                (None, None) => Arc::new(UnconfiguredCheckpointService),
            };

        let rate_limiter = Arc::new(RateLimiter::new(
            db.clone(),
            ledger.clone(),
            clock.clone(),
            settings.rate_limit_defaults,
        ));
        let auto_pause = Arc::new(AutoPause::new(
            db.clone(),
            ledger.clone(),
            registry.clone(),
            notifier.clone(),
            clock.clone(),
            settings.auto_pause_defaults,
        ));
        let migrations = Arc::new(MigrationService::new(
            MigrationRunner::new(layout.clone(), &settings.migration),
            registry.clone(),
            checkpoints.clone(),
            notifier.clone(),
            clock.clone(),
        ));

        let deployer = Arc::new(Deployer::new(
            registry.clone(),
            ledger.clone(),
            rate_limiter.clone(),
            auto_pause.clone(),
            Mirror::new(settings.sync.rsync_bin.clone()),
            Ownership::new(settings.sync.chown_bin.clone()),
            migrations.clone(),
            layout.clone(),
            clock.clone(),
        ));

        debug!("Application state initialized");
        Ok(Self {
            layout,
            clock,
            db,
            registry,
            ledger,
            rate_limiter,
            auto_pause,
            migrations,
            checkpoints,
            deployer,
            notifier,
        })
    }

    /// Flush queued alerts and close the database
    pub async fn shutdown(&self) {
        self.notifier.flush().await;
        self.db.close();
        debug!("HostKit shut down");
    }
}
