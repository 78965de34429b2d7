//! Deploy pipeline
//!
//! One attempt runs: breaker check, rate limit check, classification, file sync,
//! ledger write, optional checkpointed migration. The gates run before anything
//! is touched. Once syncing starts, a failure is written to the ledger (a failed
//! migration flips the attempt's record) and the breaker is re-evaluated before
//! the original error is returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use hostkit_models::{BuildClassification, BuildType, DeployRecord, NewDeployRecord};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::deploy::auto_pause::AutoPause;
use crate::deploy::classify::classify;
use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployPhase};
use crate::deploy::ledger::DeployLedger;
use crate::deploy::migrate::{CheckpointedMigration, MigrateOptions, MigrationService};
use crate::deploy::rate_limit::{Admission, RateLimiter};
use crate::deploy::standalone::Normalizer;
use crate::errors::HostKitError;
use crate::storage::layout::StorageLayout;
use crate::storage::projects::{Project, ProjectRegistry};
use crate::sync::ownership::Ownership;
use crate::sync::rsync::Mirror;

/// Paths never mirrored from a plain source tree
const SOURCE_EXCLUDES: &[&str] = &["/.git", "/.env"];

/// A deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub project: String,
    pub source_dir: PathBuf,
    pub actor: String,
    /// Free-form origin label stored in the ledger (`local`, `git`, ...)
    pub source_type: String,
    pub override_rate_limit: bool,
    pub run_migrations: bool,
}

/// A successful deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub record: DeployRecord,
    pub classification: BuildClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<CheckpointedMigration>,
    pub phase: DeployPhase,
}

/// Runs deploy attempts for registered projects
pub struct Deployer {
    registry: ProjectRegistry,
    ledger: DeployLedger,
    rate_limiter: Arc<RateLimiter>,
    auto_pause: Arc<AutoPause>,
    mirror: Mirror,
    ownership: Ownership,
    normalizer: Normalizer,
    migrations: Arc<MigrationService>,
    layout: StorageLayout,
    clock: Arc<dyn Clock>,
}

impl Deployer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: ProjectRegistry,
        ledger: DeployLedger,
        rate_limiter: Arc<RateLimiter>,
        auto_pause: Arc<AutoPause>,
        mirror: Mirror,
        ownership: Ownership,
        migrations: Arc<MigrationService>,
        layout: StorageLayout,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let normalizer = Normalizer::new(mirror.clone(), ownership.clone());
        Self {
            registry,
            ledger,
            rate_limiter,
            auto_pause,
            mirror,
            ownership,
            normalizer,
            migrations,
            layout,
            clock,
        }
    }

    /// Run one deploy attempt
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome, HostKitError> {
        let mut attempt = Attempt {
            fsm: DeployFsm::new(),
            started: Instant::now(),
            started_at: self.clock.now(),
            admission: None,
            record: None,
        };
        match self.run(request, &mut attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.fail(request, attempt, &e).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &DeployRequest,
        attempt: &mut Attempt,
    ) -> Result<DeployOutcome, HostKitError> {
        advance(&mut attempt.fsm, DeployEvent::Start)?;

        let project = self.registry.require(&request.project).await?;
        if !request.source_dir.is_dir() {
            return Err(HostKitError::InvalidArgument(format!(
                "source directory {} does not exist",
                request.source_dir.display()
            )));
        }

        let admission = self.admit(request).await?;
        let override_used = admission.override_used();
        attempt.admission = Some(admission);
        advance(&mut attempt.fsm, DeployEvent::Admitted)?;

        let source_dir = request.source_dir.clone();
        let classification = tokio::task::spawn_blocking(move || classify(&source_dir)).await?;
        if let Some(warning) = classification.warning() {
            warn!("{}: {}", request.project, warning);
        }
        advance(&mut attempt.fsm, DeployEvent::Classified)?;

        let files_synced = self.sync(request, &project, &classification).await?;
        advance(&mut attempt.fsm, DeployEvent::Synced)?;

        let record = self
            .ledger
            .append(NewDeployRecord {
                project: request.project.clone(),
                timestamp: attempt.started_at,
                actor: request.actor.clone(),
                success: true,
                duration_ms: elapsed_ms(attempt.started),
                source_type: request.source_type.clone(),
                files_synced,
                override_used,
                error_message: None,
            })
            .await?;
        attempt.record = Some(record.id);
        advance(
            &mut attempt.fsm,
            DeployEvent::Recorded {
                migrate: request.run_migrations,
            },
        )?;

        let migration = if request.run_migrations {
            let migration = self
                .migrations
                .migrate_with_checkpoint(&request.project, &MigrateOptions::default())
                .await?;
            advance(&mut attempt.fsm, DeployEvent::Migrated)?;
            Some(migration)
        } else {
            None
        };

        info!(
            "Deployed {} ({}, {} files) in {}ms",
            request.project,
            classification.build_type(),
            files_synced,
            record.duration_ms
        );
        Ok(DeployOutcome {
            record,
            classification,
            migration,
            phase: attempt.fsm.phase(),
        })
    }

    async fn admit(&self, request: &DeployRequest) -> Result<Admission, HostKitError> {
        self.auto_pause.check_before_deploy(&request.project).await?;
        self.rate_limiter
            .admit(&request.project, request.override_rate_limit)
            .await
    }

    async fn sync(
        &self,
        request: &DeployRequest,
        project: &Project,
        classification: &BuildClassification,
    ) -> Result<u64, HostKitError> {
        let app_dir = self.layout.app_dir(&project.name);

        if classification.is_standalone() {
            return self
                .normalizer
                .normalize(
                    &request.source_dir,
                    classification,
                    app_dir.path(),
                    &project.owner,
                )
                .await;
        }

        if classification.build_type() == BuildType::Unknown {
            warn!(
                "Build type of {} is unknown, mirroring it as-is",
                request.source_dir.display()
            );
        }
        let files = self
            .mirror
            .mirror(&request.source_dir, app_dir.path(), SOURCE_EXCLUDES)
            .await?;
        self.ownership.apply(app_dir.path(), &project.owner).await;
        Ok(files)
    }

    /// Close a failed attempt.
    ///
    /// Refusals and failures before the sync leave no trace. Later failures are
    /// written to the ledger and the breaker is re-evaluated. Errors here are
    /// logged only; the caller returns the original failure.
    async fn fail(&self, request: &DeployRequest, mut attempt: Attempt, cause: &HostKitError) {
        if let Err(e) = attempt.fsm.process(DeployEvent::Fail) {
            error!("Deploy of {} ended out of order: {}", request.project, e);
        }
        if !attempt.fsm.mutation_started() {
            info!("Deploy of {} refused: {}", request.project, cause);
            return;
        }
        error!(
            "Deploy of {} failed while {:?}: {}",
            request.project,
            attempt.fsm.failed_in().unwrap_or(DeployPhase::Failed),
            cause
        );

        let written = match attempt.record {
            // The sync succeeded and was recorded; the migration after it did not
            Some(id) => self.ledger.mark_failed(id, &cause.to_string()).await,
            None => {
                let record = NewDeployRecord {
                    project: request.project.clone(),
                    timestamp: attempt.started_at,
                    actor: request.actor.clone(),
                    success: false,
                    duration_ms: elapsed_ms(attempt.started),
                    source_type: request.source_type.clone(),
                    files_synced: 0,
                    override_used: attempt
                        .admission
                        .as_ref()
                        .is_some_and(Admission::override_used),
                    error_message: Some(cause.to_string()),
                };
                self.ledger.append(record).await.map(|_| ())
            }
        };
        if let Err(e) = written {
            error!("Unable to record failed deploy of {}: {}", request.project, e);
            return;
        }

        match self.auto_pause.check_and_maybe_pause(&request.project).await {
            Ok(true) => warn!("{} auto-paused after this failure", request.project),
            Ok(false) => {}
            Err(e) => error!("Auto-pause check for {} failed: {}", request.project, e),
        }
    }
}

/// Progress of one deploy attempt
struct Attempt {
    fsm: DeployFsm,
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    admission: Option<Admission>,
    /// Id of the ledger record once it is written
    record: Option<i64>,
}

fn advance(fsm: &mut DeployFsm, event: DeployEvent) -> Result<DeployPhase, HostKitError> {
    fsm.process(event).map_err(HostKitError::Internal)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
