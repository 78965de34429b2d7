//! Migration runner tests

use std::time::{Duration, Instant};

use hostkit::deploy::migrate::{MigrateOptions, MigrationRunner};
use hostkit::storage::settings::MigrationSettings;

use crate::common::{harness, write, Harness};

fn runner(h: &Harness) -> MigrationRunner {
    MigrationRunner::new(h.state.layout.clone(), &MigrationSettings::default())
}

fn command(cmd: &str) -> MigrateOptions {
    MigrateOptions {
        command: Some(cmd.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dry_run_resolves_detected_framework() {
    let h = harness().await;
    let app = h.app_dir("demo");
    write(&app, "alembic.ini", "");
    write(&app, "manage.py", "");

    let result = runner(&h)
        .migrate(
            "demo",
            &MigrateOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.dry_run);
    assert!(result.success);
    assert_eq!(result.framework, "alembic");
    assert_eq!(result.command, "python3 -m alembic upgrade head");
    assert_eq!(result.working_dir, app);
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn test_venv_interpreter_is_preferred() {
    let h = harness().await;
    write(&h.app_dir("demo"), "manage.py", "");
    write(&h.project_home("demo"), "venv/bin/python", "");

    let result = runner(&h)
        .migrate(
            "demo",
            &MigrateOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let python = h.project_home("demo").join("venv/bin/python");
    assert_eq!(
        result.command,
        format!("{} manage.py migrate --noinput", python.display())
    );
}

#[tokio::test]
async fn test_explicit_framework_skips_detection() {
    let h = harness().await;
    write(&h.app_dir("demo"), "alembic.ini", "");

    let result = runner(&h)
        .migrate(
            "demo",
            &MigrateOptions {
                framework: Some("knex".to_string()),
                dry_run: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.framework, "knex");
    assert_eq!(result.command, "npx knex migrate:latest");
}

#[tokio::test]
async fn test_detection_failures() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let err = runner(&h)
        .migrate("demo", &MigrateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_FRAMEWORK_DETECTED");

    let err = runner(&h)
        .migrate(
            "demo",
            &MigrateOptions {
                framework: Some("rails".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_FRAMEWORK");
}

#[tokio::test]
async fn test_custom_command_wins_over_framework() {
    let h = harness().await;
    write(&h.app_dir("demo"), "alembic.ini", "");

    let result = runner(&h).migrate("demo", &command("true")).await.unwrap();
    assert_eq!(result.framework, "custom");
    assert_eq!(result.command, "true");
    assert!(!result.dry_run);
}

#[tokio::test]
async fn test_environment_and_identity() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();
    write(
        &h.project_home("demo"),
        ".env",
        "GREETING=\"hello there\"\nUSER=someone-else\n",
    );

    let result = runner(&h)
        .migrate(
            "demo",
            &command("printf '%s|%s|%s|%s' \"$GREETING\" \"$USER\" \"$PROJECT_NAME\" \"$HOME\""),
        )
        .await
        .unwrap();
    let home = h.project_home("demo");
    assert_eq!(
        result.output,
        format!("hello there|demo|demo|{}", home.display())
    );
}

#[tokio::test]
async fn test_silent_success() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let result = runner(&h).migrate("demo", &command("exit 0")).await.unwrap();
    assert!(result.success);
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_fails_with_output() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let err = runner(&h)
        .migrate("demo", &command("echo applying; echo boom >&2; exit 3"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MIGRATION_FAILED");
    match err {
        hostkit::errors::HostKitError::MigrationFailed {
            exit_code, output, ..
        } => {
            assert_eq!(exit_code, Some(3));
            assert!(output.contains("applying"));
            assert!(output.contains("boom"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_kills_the_child() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let started = Instant::now();
    let err = runner(&h)
        .with_timeout(Duration::from_millis(300))
        .migrate("demo", &command("exec sleep 30"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MIGRATION_TIMEOUT");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_timeout_kills_background_jobs() {
    let h = harness().await;
    let app = h.app_dir("demo");
    std::fs::create_dir_all(&app).unwrap();

    let err = runner(&h)
        .with_timeout(Duration::from_millis(300))
        .migrate("demo", &command("(sleep 1; touch late) & sleep 30; echo done"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MIGRATION_TIMEOUT");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!app.join("late").exists());
}

#[tokio::test]
async fn test_output_keeps_stream_order() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let result = runner(&h)
        .migrate("demo", &command("echo one; echo two >&2; echo three"))
        .await
        .unwrap();
    assert_eq!(result.output, "one\ntwo\nthree\n");
    assert_eq!(result.command, "echo one; echo two >&2; echo three");
}

#[tokio::test]
async fn test_finished_migration_does_not_wait_for_background_jobs() {
    let h = harness().await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let started = Instant::now();
    let result = runner(&h)
        .migrate("demo", &command("sleep 30 & echo applied"))
        .await
        .unwrap();
    assert_eq!(result.output, "applied\n");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_missing_app_dir() {
    let h = harness().await;
    let err = runner(&h).migrate("demo", &command("true")).await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
}

#[tokio::test]
async fn test_checkpoint_taken_before_migration() {
    let h = harness().await;
    h.register("demo", true).await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let migrated = h
        .state
        .migrations
        .migrate_with_checkpoint("demo", &command("true"))
        .await
        .unwrap();
    assert_eq!(migrated.checkpoint_id, Some(7));
    assert_eq!(
        h.checkpoints.created(),
        [(
            "demo".to_string(),
            "pre-migrate".to_string(),
            "pre_migration".to_string(),
            "migrate".to_string()
        )]
    );
}

#[tokio::test]
async fn test_failed_migration_names_checkpoint() {
    let h = harness().await;
    h.register("demo", true).await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let err = h
        .state
        .migrations
        .migrate_with_checkpoint("demo", &command("exit 1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MIGRATION_FAILED");
    assert!(err
        .suggestion()
        .unwrap()
        .contains("hostkit checkpoint restore demo 7"));

    h.state.notifier.flush().await;
    assert_eq!(h.alerts.event_types(), ["migration_failed"]);
    assert_eq!(h.alerts.alerts()[0].event_status, "failure");

    h.state.checkpoints.restore("demo", 7).await.unwrap();
    assert_eq!(h.checkpoints.restored(), [("demo".to_string(), 7)]);
}

#[tokio::test]
async fn test_checkpoint_failure_aborts_before_running() {
    let h = harness().await;
    h.register("demo", true).await;
    let app = h.app_dir("demo");
    std::fs::create_dir_all(&app).unwrap();
    h.checkpoints.fail_next();

    let err = h
        .state
        .migrations
        .migrate_with_checkpoint("demo", &command("touch ran"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CHECKPOINT_FAILED");
    assert!(!app.join("ran").exists());
}

#[tokio::test]
async fn test_no_checkpoint_without_database_or_on_dry_run() {
    let h = harness().await;
    h.register("demo", false).await;
    h.register("withdb", true).await;
    std::fs::create_dir_all(h.app_dir("demo")).unwrap();

    let migrated = h
        .state
        .migrations
        .migrate_with_checkpoint("demo", &command("true"))
        .await
        .unwrap();
    assert!(migrated.checkpoint_id.is_none());

    let dry = MigrateOptions {
        command: Some("true".to_string()),
        dry_run: true,
        ..Default::default()
    };
    let migrated = h
        .state
        .migrations
        .migrate_with_checkpoint("withdb", &dry)
        .await
        .unwrap();
    assert!(migrated.checkpoint_id.is_none());
    assert!(h.checkpoints.created().is_empty());
}
