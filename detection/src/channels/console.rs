//! Structured-log notification channel.

use async_trait::async_trait;
use surveil_model::{Alert, AlertSeverity};
use tracing::{error, info, warn};

use crate::channels::AlertChannel;

#[derive(Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertChannel for ConsoleChannel {
    async fn dispatch(&self, alert: &Alert) -> eyre::Result<()> {
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert_id = %alert.alert_id,
                alert_type = %alert.alert_type,
                priority = %alert.priority,
                venue = %alert.venue,
                instrument = %alert.instrument,
                metric = %alert.trigger_metric,
                value = %alert.trigger_value,
                threshold = %alert.trigger_threshold,
                zscore = ?alert.zscore_value,
                "ALERT"
            ),
            AlertSeverity::Warning => warn!(
                alert_id = %alert.alert_id,
                alert_type = %alert.alert_type,
                priority = %alert.priority,
                venue = %alert.venue,
                instrument = %alert.instrument,
                metric = %alert.trigger_metric,
                value = %alert.trigger_value,
                threshold = %alert.trigger_threshold,
                zscore = ?alert.zscore_value,
                "ALERT"
            ),
            AlertSeverity::Info => info!(
                alert_id = %alert.alert_id,
                alert_type = %alert.alert_type,
                priority = %alert.priority,
                venue = %alert.venue,
                instrument = %alert.instrument,
                metric = %alert.trigger_metric,
                value = %alert.trigger_value,
                threshold = %alert.trigger_threshold,
                "ALERT"
            ),
        }
        Ok(())
    }

    async fn dispatch_escalation(&self, alert: &Alert) -> eyre::Result<()> {
        error!(
            alert_id = %alert.alert_id,
            alert_type = %alert.alert_type,
            priority = %alert.priority,
            original_priority = ?alert.original_priority,
            escalated_at = ?alert.escalated_at,
            "ALERT ESCALATED"
        );
        Ok(())
    }

    async fn dispatch_resolution(&self, alert: &Alert) -> eyre::Result<()> {
        info!(
            alert_id = %alert.alert_id,
            alert_type = %alert.alert_type,
            resolution_type = ?alert.resolution_type,
            resolution_value = ?alert.resolution_value,
            duration_seconds = ?alert.duration_seconds,
            "ALERT RESOLVED"
        );
        Ok(())
    }
}
