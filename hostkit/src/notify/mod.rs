//! Best-effort alerting
//!
//! Alerts are fire-and-forget: [`Notifier::notify`] spawns the delivery and
//! returns immediately. Delivery errors are logged at `warn` and never reach the
//! operation that raised the alert.

pub mod webhook;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::HostKitError;

/// Governance events that raise an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvent {
    AutoPause,
    ManualPause,
    Resume,
    MigrationFailed,
}

impl AlertEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AlertEvent::AutoPause => "auto_pause",
            AlertEvent::ManualPause => "manual_pause",
            AlertEvent::Resume => "resume",
            AlertEvent::MigrationFailed => "migration_failed",
        }
    }

    pub fn event_status(&self) -> &'static str {
        match self {
            AlertEvent::AutoPause | AlertEvent::ManualPause => "paused",
            AlertEvent::Resume => "recovered",
            AlertEvent::MigrationFailed => "failure",
        }
    }
}

/// Payload handed to an [`AlertSink`]
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub project: String,
    pub event_type: &'static str,
    pub event_status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl Alert {
    pub fn new(project: &str, event: AlertEvent, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            project: project.to_string(),
            event_type: event.event_type(),
            event_status: event.event_status(),
            timestamp,
            data,
        }
    }
}

/// Somewhere alerts can be delivered
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), HostKitError>;
}

/// Sink that only writes the alert to the log
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), HostKitError> {
        info!(
            project = %alert.project,
            event_type = alert.event_type,
            event_status = alert.event_status,
            data = %alert.data,
            "alert"
        );
        Ok(())
    }
}

/// Spawns alert deliveries and keeps their handles for [`Notifier::flush`]
pub struct Notifier {
    sink: Arc<dyn AlertSink>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queue an alert. Never fails and never blocks on delivery.
    pub fn notify(&self, alert: Alert) {
        let sink = self.sink.clone();
        let handle = tokio::spawn(async move {
            match sink.send_alert(&alert).await {
                Ok(()) => debug!("Alert {} delivered for {}", alert.event_type, alert.project),
                Err(e) => warn!(
                    "Failed to deliver {} alert for {}: {}",
                    alert.event_type, alert.project, e
                ),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every queued alert to finish
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Alert task aborted: {}", e);
            }
        }
    }
}
