//! Priority-based fan-out to notification channels. Channel failures are
//! isolated: one failing channel never blocks the rest.

use std::collections::HashMap;
use std::sync::Arc;

use surveil_model::{Alert, AlertPriority};
use tracing::{debug, error, info, warn};

use crate::channels::AlertChannel;

pub struct ChannelDispatcher {
    channels: HashMap<String, Arc<dyn AlertChannel>>,
    priority_channels: HashMap<AlertPriority, Vec<String>>,
}

impl ChannelDispatcher {
    pub fn new(
        channels: HashMap<String, Arc<dyn AlertChannel>>,
        priority_channels: HashMap<AlertPriority, Vec<String>>,
    ) -> Self {
        info!(
            available = ?channels.keys().collect::<Vec<_>>(),
            "channel dispatcher initialized"
        );
        Self {
            channels,
            priority_channels,
        }
    }

    fn channels_for(&self, priority: AlertPriority) -> Vec<String> {
        self.priority_channels
            .get(&priority)
            .cloned()
            .unwrap_or_else(|| vec!["console".to_string()])
    }

    /// Sends the alert to every channel bound to its current priority.
    /// Returns the number of successful dispatches.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        self.send(alert, self.channels_for(alert.priority), DispatchKind::Trigger)
            .await
    }

    /// Escalations always go to the P1 channel set.
    pub async fn dispatch_escalation(&self, alert: &Alert) -> usize {
        self.send(
            alert,
            self.channels_for(AlertPriority::P1),
            DispatchKind::Escalation,
        )
        .await
    }

    /// Resolutions use the pre-escalation channel set when the alert was
    /// escalated, else the current one.
    pub async fn dispatch_resolution(&self, alert: &Alert) -> usize {
        let priority = alert.original_priority.unwrap_or(alert.priority);
        self.send(alert, self.channels_for(priority), DispatchKind::Resolution)
            .await
    }

    async fn send(&self, alert: &Alert, channel_names: Vec<String>, kind: DispatchKind) -> usize {
        let mut dispatched = 0usize;
        for name in &channel_names {
            let Some(channel) = self.channels.get(name) else {
                warn!(channel = %name, alert_id = %alert.alert_id, "channel not found");
                continue;
            };
            let result = match kind {
                DispatchKind::Trigger => channel.dispatch(alert).await,
                DispatchKind::Escalation => channel.dispatch_escalation(alert).await,
                DispatchKind::Resolution => channel.dispatch_resolution(alert).await,
            };
            match result {
                Ok(()) => {
                    dispatched += 1;
                    debug!(channel = %name, alert_id = %alert.alert_id, "dispatched");
                }
                Err(err) => {
                    error!(channel = %name, alert_id = %alert.alert_id, %err, "channel dispatch failed");
                }
            }
        }
        info!(
            alert_id = %alert.alert_id,
            kind = ?kind,
            dispatched,
            total = channel_names.len(),
            "alert dispatch complete"
        );
        dispatched
    }

    pub fn add_channel(&mut self, name: impl Into<String>, channel: Arc<dyn AlertChannel>) {
        let name = name.into();
        info!(channel = %name, "channel added");
        self.channels.insert(name, channel);
    }

    pub fn remove_channel(&mut self, name: &str) -> bool {
        let removed = self.channels.remove(name).is_some();
        if removed {
            info!(channel = %name, "channel removed");
        }
        removed
    }

    pub fn set_priority_channels(&mut self, priority: AlertPriority, channels: Vec<String>) {
        info!(priority = %priority, ?channels, "priority channels updated");
        self.priority_channels.insert(priority, channels);
    }

    pub fn available_channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn channels_for_priority(&self, priority: AlertPriority) -> Vec<String> {
        self.priority_channels
            .get(&priority)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
enum DispatchKind {
    Trigger,
    Escalation,
    Resolution,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use surveil_model::{
        Alert, AlertCondition, AlertDefinition, AlertSeverity, Venue,
    };

    #[derive(Default)]
    struct RecordingChannel {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        async fn dispatch(&self, alert: &Alert) -> eyre::Result<()> {
            if self.fail {
                eyre::bail!("channel down");
            }
            self.calls.lock().push(format!("trigger:{}", alert.alert_type));
            Ok(())
        }

        async fn dispatch_escalation(&self, alert: &Alert) -> eyre::Result<()> {
            self.calls
                .lock()
                .push(format!("escalation:{}", alert.alert_type));
            Ok(())
        }

        async fn dispatch_resolution(&self, alert: &Alert) -> eyre::Result<()> {
            self.calls
                .lock()
                .push(format!("resolution:{}", alert.alert_type));
            Ok(())
        }
    }

    fn alert(priority: AlertPriority) -> Alert {
        let definition = AlertDefinition {
            alert_type: "spread_warning".to_string(),
            name: "Spread Warning".to_string(),
            metric_name: "spread_bps".to_string(),
            default_priority: priority,
            default_severity: AlertSeverity::Warning,
            condition: AlertCondition::Gt,
            requires_zscore: false,
            persistence_seconds: None,
            throttle_seconds: 60,
            escalation_seconds: None,
            escalates_to: None,
            enabled: true,
        };
        Alert::new(
            &definition,
            priority,
            AlertSeverity::Warning,
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            dec!(3.5),
            dec!(3.0),
            None,
            None,
            Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap(),
        )
    }

    fn dispatcher(
        console: Arc<RecordingChannel>,
        webhook: Arc<RecordingChannel>,
    ) -> ChannelDispatcher {
        let mut channels: HashMap<String, Arc<dyn AlertChannel>> = HashMap::new();
        channels.insert("console".to_string(), console);
        channels.insert("webhook".to_string(), webhook);
        let mut priorities = HashMap::new();
        priorities.insert(
            AlertPriority::P1,
            vec!["console".to_string(), "webhook".to_string()],
        );
        priorities.insert(
            AlertPriority::P2,
            vec!["console".to_string(), "webhook".to_string()],
        );
        priorities.insert(AlertPriority::P3, vec!["console".to_string()]);
        ChannelDispatcher::new(channels, priorities)
    }

    #[tokio::test]
    async fn test_routes_by_priority() {
        let console = Arc::new(RecordingChannel::default());
        let webhook = Arc::new(RecordingChannel::default());
        let dispatcher = dispatcher(console.clone(), webhook.clone());

        assert_eq!(dispatcher.dispatch(&alert(AlertPriority::P3)).await, 1);
        assert_eq!(console.calls.lock().len(), 1);
        assert!(webhook.calls.lock().is_empty());

        assert_eq!(dispatcher.dispatch(&alert(AlertPriority::P1)).await, 2);
        assert_eq!(webhook.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_is_isolated() {
        let console = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let webhook = Arc::new(RecordingChannel::default());
        let dispatcher = dispatcher(console.clone(), webhook.clone());

        // console fails, webhook still receives the alert
        assert_eq!(dispatcher.dispatch(&alert(AlertPriority::P2)).await, 1);
        assert_eq!(webhook.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_escalation_uses_p1_set() {
        let console = Arc::new(RecordingChannel::default());
        let webhook = Arc::new(RecordingChannel::default());
        let dispatcher = dispatcher(console.clone(), webhook.clone());

        // a P3 alert escalated still lands on the P1 channels
        dispatcher.dispatch_escalation(&alert(AlertPriority::P3)).await;
        assert_eq!(console.calls.lock().len(), 1);
        assert_eq!(webhook.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_uses_pre_escalation_set() {
        let console = Arc::new(RecordingChannel::default());
        let webhook = Arc::new(RecordingChannel::default());
        let dispatcher = dispatcher(console.clone(), webhook.clone());

        // escalated P3 -> P1; resolution routes to the original P3 set
        let escalated = alert(AlertPriority::P3).escalate(
            AlertPriority::P1,
            Utc.with_ymd_and_hms(2025, 1, 26, 12, 5, 0).unwrap(),
        );
        dispatcher.dispatch_resolution(&escalated).await;
        assert_eq!(console.calls.lock().len(), 1);
        assert!(webhook.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_channel_management() {
        let console = Arc::new(RecordingChannel::default());
        let webhook = Arc::new(RecordingChannel::default());
        let mut dispatcher = dispatcher(console, webhook);

        assert!(dispatcher.remove_channel("webhook"));
        assert!(!dispatcher.remove_channel("webhook"));

        let extra = Arc::new(RecordingChannel::default());
        dispatcher.add_channel("pager", extra.clone());
        dispatcher.set_priority_channels(AlertPriority::P1, vec!["pager".to_string()]);

        assert_eq!(dispatcher.dispatch(&alert(AlertPriority::P1)).await, 1);
        assert_eq!(extra.calls.lock().len(), 1);
    }
}
