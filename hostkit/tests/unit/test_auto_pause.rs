//! Circuit breaker tests

use chrono::Duration;
use hostkit::deploy::auto_pause::AutoPauseUpdate;

use crate::common::{harness, Harness};

async fn enable(h: &Harness, threshold: i64, window: i64) {
    h.state
        .auto_pause
        .set_config(
            "demo",
            AutoPauseUpdate {
                enabled: Some(true),
                failure_threshold: Some(threshold),
                window_minutes: Some(window),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pause_resume_cycle() {
    let h = harness().await;
    h.register("demo", false).await;
    let breaker = &h.state.auto_pause;

    let err = breaker.resume("demo", false).await.unwrap_err();
    assert_eq!(err.code(), "NOT_PAUSED");

    breaker.pause("demo", "maintenance window").await.unwrap();
    assert!(breaker.is_paused("demo").await.unwrap());

    let resumed = breaker.resume("demo", false).await.unwrap();
    assert!(!resumed.config.paused);
    assert!(resumed.config.paused_at.is_none());
    assert!(resumed.config.paused_reason.is_none());
    assert!(resumed.failures_cleared.is_none());
    assert!(!breaker.is_paused("demo").await.unwrap());

    let err = breaker.resume("demo", false).await.unwrap_err();
    assert_eq!(err.code(), "NOT_PAUSED");

    h.state.notifier.flush().await;
    assert_eq!(h.alerts.event_types(), ["manual_pause", "resume"]);
    let statuses: Vec<_> = h.alerts.alerts().iter().map(|a| a.event_status).collect();
    assert_eq!(statuses, ["paused", "recovered"]);
}

#[tokio::test]
async fn test_trips_after_threshold_failures_in_window() {
    let h = harness().await;
    enable(&h, 5, 10).await;

    for i in 0..5 {
        if i > 0 {
            h.clock.advance(Duration::minutes(2));
        }
        h.record("demo", false).await;
    }

    assert!(h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
    assert!(h.state.auto_pause.is_paused("demo").await.unwrap());

    let config = h.state.auto_pause.get_config("demo").await.unwrap();
    assert!(config
        .paused_reason
        .as_deref()
        .unwrap()
        .contains("5 failures in 10 minutes"));
    assert_eq!(config.paused_at, Some(crate::common::t0() + Duration::minutes(8)));

    h.state.notifier.flush().await;
    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].event_type, "auto_pause");
    assert_eq!(alerts[0].project, "demo");
}

#[tokio::test]
async fn test_latch_holds_until_resume() {
    let h = harness().await;
    enable(&h, 2, 10).await;
    h.record("demo", false).await;
    h.record("demo", false).await;
    assert!(h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());

    h.clock.advance(Duration::days(3));
    let err = h.state.auto_pause.check_before_deploy("demo").await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_PAUSED");
    assert!(err.to_string().contains("Auto-paused: 2 failures in 10 minutes"));
    assert!(err.suggestion().unwrap().contains("--reset-failures"));

    // Already paused: no second trip, no second alert
    assert!(!h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
    h.state.notifier.flush().await;
    assert_eq!(h.alerts.event_types(), ["auto_pause"]);
}

#[tokio::test]
async fn test_resume_with_reset_prevents_retrip() {
    let h = harness().await;
    enable(&h, 3, 10).await;
    for _ in 0..4 {
        h.record("demo", false).await;
    }
    assert!(h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());

    let resumed = h.state.auto_pause.resume("demo", true).await.unwrap();
    assert_eq!(resumed.failures_cleared, Some(4));
    assert!(h.state.ledger.query("demo", None, 10).await.unwrap().is_empty());

    assert!(!h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
    assert!(!h.state.auto_pause.is_paused("demo").await.unwrap());
}

#[tokio::test]
async fn test_resume_without_reset_can_retrip() {
    let h = harness().await;
    enable(&h, 3, 10).await;
    for _ in 0..3 {
        h.record("demo", false).await;
    }
    assert!(h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());

    h.state.auto_pause.resume("demo", false).await.unwrap();
    assert!(h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
}

#[tokio::test]
async fn test_old_failures_do_not_trip() {
    let h = harness().await;
    enable(&h, 3, 10).await;
    for _ in 0..3 {
        h.record("demo", false).await;
    }
    h.clock.advance(Duration::minutes(11));

    assert!(!h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
    let status = h.state.auto_pause.status("demo").await.unwrap();
    assert_eq!(status.failures_in_window, 0);
    assert!(!status.config.paused);
}

#[tokio::test]
async fn test_disabled_breaker_only_reports() {
    let h = harness().await;
    for _ in 0..10 {
        h.record("demo", false).await;
    }
    assert!(!h.state.auto_pause.check_and_maybe_pause("demo").await.unwrap());
    let status = h.state.auto_pause.status("demo").await.unwrap();
    assert_eq!(status.failures_in_window, 10);
    assert!(!status.config.enabled);
}

#[tokio::test]
async fn test_manual_pause_of_unknown_project() {
    let h = harness().await;
    let err = h.state.auto_pause.pause("ghost", "why not").await.unwrap_err();
    assert_eq!(err.code(), "PROJECT_NOT_FOUND");
}

#[tokio::test]
async fn test_config_update_rejects_zero_threshold() {
    let h = harness().await;
    let err = h
        .state
        .auto_pause
        .set_config(
            "demo",
            AutoPauseUpdate {
                failure_threshold: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
    assert!(!h.state.auto_pause.get_config("demo").await.unwrap().enabled);
}
