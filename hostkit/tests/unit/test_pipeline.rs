//! End-to-end deploy attempts through [`Deployer`]

use std::path::PathBuf;

use hostkit::clock::Clock;
use hostkit::deploy::auto_pause::AutoPauseUpdate;
use hostkit::deploy::fsm::DeployPhase;
use hostkit::deploy::pipeline::DeployRequest;
use hostkit::deploy::rate_limit::RateLimitUpdate;
use hostkit_models::BuildType;
use serde_json::json;

use crate::common::{harness, harness_with, mkdir, rsync_available, write, Harness};

const NO_SUCH_OWNER: &str = "hostkit-test-no-such-user";

fn request(project: &str, source_dir: PathBuf) -> DeployRequest {
    DeployRequest {
        project: project.to_string(),
        source_dir,
        actor: "alice".to_string(),
        source_type: "local".to_string(),
        override_rate_limit: false,
        run_migrations: false,
    }
}

async fn register(h: &Harness, project: &str, has_database: bool) {
    h.state
        .registry
        .register(project, Some(NO_SUCH_OWNER), has_database, h.clock.now())
        .await
        .unwrap();
}

fn node_source(h: &Harness) -> PathBuf {
    let src = h.scratch("node");
    write(&src, "package.json", r#"{"name": "demo"}"#);
    write(&src, "index.js", "console.log('hi')");
    write(&src, ".git/HEAD", "ref: refs/heads/main");
    write(&src, ".env", "SECRET=1");
    src
}

async fn history_len(h: &Harness, project: &str) -> usize {
    h.state.ledger.query(project, None, 100).await.unwrap().len()
}

#[tokio::test]
async fn test_unregistered_project_is_rejected() {
    let h = harness().await;
    let src = h.scratch("empty");

    let err = h.state.deployer.deploy(&request("ghost", src)).await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
    assert_eq!(history_len(&h, "ghost").await, 0);
}

#[tokio::test]
async fn test_missing_source_dir_is_rejected() {
    let h = harness().await;
    register(&h, "demo", false).await;

    let missing = h.root.path().join("nope");
    let err = h.state.deployer.deploy(&request("demo", missing)).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_paused_project_is_refused_without_a_record() {
    let h = harness().await;
    register(&h, "demo", false).await;
    h.state.auto_pause.pause("demo", "maintenance").await.unwrap();

    let err = h
        .state
        .deployer
        .deploy(&request("demo", node_source(&h)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PROJECT_PAUSED");
    assert!(err.to_string().contains("maintenance"));
    assert_eq!(history_len(&h, "demo").await, 0);
    assert!(!h.app_dir("demo").exists());
}

#[tokio::test]
async fn test_pause_is_checked_before_rate_limit() {
    let h = harness().await;
    register(&h, "demo", false).await;
    h.state
        .rate_limiter
        .set_config(
            "demo",
            RateLimitUpdate {
                max_deploys: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.record("demo", true).await;
    h.state.auto_pause.pause("demo", "maintenance").await.unwrap();

    let mut req = request("demo", node_source(&h));
    req.override_rate_limit = true;
    let err = h.state.deployer.deploy(&req).await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_PAUSED");
}

#[tokio::test]
async fn test_rate_limited_deploy_and_override() {
    let h = harness().await;
    register(&h, "demo", false).await;
    h.state
        .rate_limiter
        .set_config(
            "demo",
            RateLimitUpdate {
                max_deploys: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.record("demo", true).await;

    let src = node_source(&h);
    let err = h
        .state
        .deployer
        .deploy(&request("demo", src.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
    assert_eq!(history_len(&h, "demo").await, 1);

    if !rsync_available().await {
        return;
    }
    let mut req = request("demo", src);
    req.override_rate_limit = true;
    let outcome = h.state.deployer.deploy(&req).await.unwrap();
    assert!(outcome.record.success);
    assert!(outcome.record.override_used);
    assert_eq!(history_len(&h, "demo").await, 2);
}

#[tokio::test]
async fn test_override_flag_alone_is_not_recorded() {
    if !rsync_available().await {
        return;
    }
    let h = harness().await;
    register(&h, "demo", false).await;

    let mut req = request("demo", node_source(&h));
    req.override_rate_limit = true;
    let outcome = h.state.deployer.deploy(&req).await.unwrap();
    assert!(!outcome.record.override_used);
}

#[tokio::test]
async fn test_node_deploy_mirrors_source() {
    if !rsync_available().await {
        return;
    }
    let h = harness().await;
    register(&h, "demo", false).await;
    let app = h.app_dir("demo");
    write(&app, "stale.js", "old");

    let outcome = h
        .state
        .deployer
        .deploy(&request("demo", node_source(&h)))
        .await
        .unwrap();
    assert_eq!(outcome.classification.build_type(), BuildType::Node);
    assert_eq!(outcome.phase, DeployPhase::Completed);
    assert!(outcome.migration.is_none());

    assert!(app.join("index.js").is_file());
    assert!(app.join("package.json").is_file());
    assert!(!app.join("stale.js").exists());
    assert!(!app.join(".git").exists());
    assert!(!app.join(".env").exists());

    let record = &outcome.record;
    assert!(record.success);
    assert_eq!(record.actor, "alice");
    assert_eq!(record.source_type, "local");
    assert_eq!(record.timestamp, h.clock.now());
    assert_eq!(record.files_synced, 2);
    assert!(record.error_message.is_none());

    let history = h.state.ledger.query("demo", None, 10).await.unwrap();
    assert_eq!(history, vec![record.clone()]);
}

#[tokio::test]
async fn test_standalone_deploy_is_normalized() {
    if !rsync_available().await {
        return;
    }
    let h = harness().await;
    register(&h, "web", false).await;
    let src = h.scratch("next");
    write(&src, "package.json", "{}");
    write(&src, ".next/standalone/server.js", "server");
    write(&src, ".next/standalone/node_modules/next/index.js", "next");
    write(&src, ".next/static/chunks/main.js", "chunk");
    mkdir(&src, "public");

    let outcome = h.state.deployer.deploy(&request("web", src)).await.unwrap();
    assert_eq!(
        outcome.classification.build_type(),
        BuildType::NextjsStandalone
    );
    let app = h.app_dir("web");
    assert!(app.join("server.js").is_file());
    assert!(app.join(".next/static/chunks/main.js").is_file());
    assert!(app.join("public").is_dir());
    assert!(!app.join("package.json").exists());
    assert_eq!(outcome.record.files_synced, 3);
}

#[tokio::test]
async fn test_sync_failure_is_recorded_and_trips_breaker() {
    let h = harness_with(json!({"sync": {"rsync_bin": "/nonexistent/rsync"}})).await;
    register(&h, "demo", false).await;
    h.state
        .auto_pause
        .set_config(
            "demo",
            AutoPauseUpdate {
                enabled: Some(true),
                failure_threshold: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let src = node_source(&h);
    let err = h
        .state
        .deployer
        .deploy(&request("demo", src.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SYNC_FAILED");

    let history = h.state.ledger.query("demo", None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert_eq!(history[0].files_synced, 0);
    assert_eq!(history[0].error_message.as_deref(), Some(err.to_string().as_str()));

    assert!(h.state.auto_pause.is_paused("demo").await.unwrap());
    h.state.notifier.flush().await;
    assert_eq!(h.alerts.event_types(), ["auto_pause"]);

    let err = h.state.deployer.deploy(&request("demo", src)).await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_PAUSED");
    assert_eq!(history_len(&h, "demo").await, 1);
}

#[tokio::test]
async fn test_failures_feed_the_cooldown() {
    let h = harness_with(json!({"sync": {"rsync_bin": "/nonexistent/rsync"}})).await;
    register(&h, "demo", false).await;
    let src = node_source(&h);

    for _ in 0..3 {
        let err = h
            .state
            .deployer
            .deploy(&request("demo", src.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SYNC_FAILED");
    }
    let err = h.state.deployer.deploy(&request("demo", src)).await.unwrap_err();
    assert_eq!(err.code(), "COOLDOWN_ACTIVE");
    assert_eq!(history_len(&h, "demo").await, 3);
}

#[tokio::test]
async fn test_migration_failure_marks_the_attempt_and_trips_breaker() {
    if !rsync_available().await {
        return;
    }
    let h = harness().await;
    register(&h, "demo", false).await;
    h.state
        .auto_pause
        .set_config(
            "demo",
            AutoPauseUpdate {
                enabled: Some(true),
                failure_threshold: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut req = request("demo", node_source(&h));
    req.run_migrations = true;
    let err = h.state.deployer.deploy(&req).await.unwrap_err();
    assert_eq!(err.code(), "NO_FRAMEWORK_DETECTED");

    // One attempt, one record: the synced files stay, the record says it failed
    let history = h.state.ledger.query("demo", None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert_eq!(history[0].files_synced, 2);
    assert_eq!(history[0].error_message.as_deref(), Some(err.to_string().as_str()));
    assert!(h.app_dir("demo").join("index.js").exists());

    assert!(h.state.auto_pause.is_paused("demo").await.unwrap());
    h.state.notifier.flush().await;
    let mut events = h.alerts.event_types();
    events.sort_unstable();
    assert_eq!(events, ["auto_pause", "migration_failed"]);
}

#[tokio::test]
async fn test_deploy_with_checkpointed_migration() {
    if !rsync_available().await {
        return;
    }
    // `true manage.py migrate --noinput` exits 0
    let h = harness_with(json!({"migration": {"fallback_python": "true"}})).await;
    register(&h, "api", true).await;
    let src = h.scratch("django");
    write(&src, "manage.py", "");
    write(&src, "requirements.txt", "django");

    let mut req = request("api", src);
    req.run_migrations = true;
    let outcome = h.state.deployer.deploy(&req).await.unwrap();
    assert_eq!(outcome.classification.build_type(), BuildType::Python);
    assert_eq!(outcome.phase, DeployPhase::Completed);

    let migration = outcome.migration.unwrap();
    assert_eq!(migration.result.framework, "django");
    assert_eq!(migration.checkpoint_id, Some(7));
    assert_eq!(h.checkpoints.created().len(), 1);
}
