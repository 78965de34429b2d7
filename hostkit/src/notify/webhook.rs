//! Webhook alert sink

use async_trait::async_trait;

use crate::errors::HostKitError;
use crate::http::client::HttpClient;
use crate::notify::{Alert, AlertSink};

/// Posts each alert as JSON to a configured URL
pub struct WebhookAlertSink {
    client: HttpClient,
}

impl WebhookAlertSink {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), HostKitError> {
        self.client.post_no_content("", alert).await
    }
}
