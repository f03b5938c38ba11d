//! Webhook notification channel for the operations integration: posts a
//! compact JSON payload to the configured URL.

use async_trait::async_trait;
use eyre::{eyre, Result};
use serde_json::json;
use surveil_model::Alert;
use tracing::debug;

use crate::channels::AlertChannel;

pub struct WebhookChannel {
    webhook_url: String,
    channel: String,
    enabled: bool,
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(webhook_url: impl Into<String>, channel: impl Into<String>, enabled: bool) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            channel: channel.into(),
            enabled,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, text: String, alert: &Alert) -> Result<()> {
        if !self.enabled {
            debug!("webhook channel disabled, skipping");
            return Ok(());
        }
        let payload = json!({
            "channel": self.channel,
            "text": text,
            "alert": {
                "alert_id": alert.alert_id,
                "alert_type": alert.alert_type,
                "priority": alert.priority,
                "severity": alert.severity,
                "venue": alert.venue,
                "instrument": alert.instrument,
                "metric": alert.trigger_metric,
                "value": alert.trigger_value,
                "threshold": alert.trigger_threshold,
                "zscore": alert.zscore_value,
                "triggered_at": alert.triggered_at,
            },
        });
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(eyre!("webhook returned {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        let text = format!(
            ":rotating_light: [{}] {} on {} {}: {} = {} (threshold {})",
            alert.priority,
            alert.alert_type,
            alert.venue,
            alert.instrument,
            alert.trigger_metric,
            alert.trigger_value,
            alert.trigger_threshold,
        );
        self.post(text, alert).await
    }

    async fn dispatch_escalation(&self, alert: &Alert) -> Result<()> {
        let text = format!(
            ":arrow_double_up: escalated to {}: {} on {} {}",
            alert.priority, alert.alert_type, alert.venue, alert.instrument,
        );
        self.post(text, alert).await
    }

    async fn dispatch_resolution(&self, alert: &Alert) -> Result<()> {
        let text = format!(
            ":white_check_mark: resolved: {} on {} {} after {}s",
            alert.alert_type,
            alert.venue,
            alert.instrument,
            alert.duration_seconds.unwrap_or(0),
        );
        self.post(text, alert).await
    }
}
