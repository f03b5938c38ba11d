//! Detector loop: metrics in, alert lifecycle out, plus the periodic
//! escalation sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use surveil_detection::{
    AlertChannel, AlertManager, ChannelDispatcher, ConsoleChannel, DualAlertStore, WebhookChannel,
};
use surveil_model::{AlertPriority, AppConfig};
use surveil_storage::{KvStore, MetricsUpdate, TimeSeriesStore, CHANNEL_METRICS};
use tracing::{info, warn};

const ESCALATION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(
    config: AppConfig,
    kv: KvStore,
    tsdb: TimeSeriesStore,
    webhook_url: Option<String>,
    webhook_channel: String,
) -> Result<()> {
    let store = Arc::new(DualAlertStore::new(kv.clone(), tsdb));

    let escalation_seconds = config
        .alerts
        .priorities
        .get(&AlertPriority::P2)
        .and_then(|p| p.escalation_seconds)
        .unwrap_or(surveil_detection::manager::DEFAULT_ESCALATION_SECONDS);

    let mut manager = AlertManager::new(
        store,
        config.alert_definitions(),
        config.alert_thresholds(),
        config.alerts.global.throttle_seconds,
        escalation_seconds,
        config.alerts.global.auto_resolve,
    );
    manager.load_active_conditions().await?;

    let dispatcher = build_dispatcher(&config, webhook_url, webhook_channel);

    let mut subscriber = kv.subscribe(&[CHANNEL_METRICS]).await?;
    let mut escalation_timer = tokio::time::interval(ESCALATION_CHECK_INTERVAL);
    escalation_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = subscriber.next_message() => {
                let Some((_, payload)) = message else {
                    warn!("pub/sub stream closed");
                    break;
                };
                process_metrics_message(&kv, &mut manager, &dispatcher, &payload).await;
            }
            _ = escalation_timer.tick() => {
                run_escalation_sweep(&kv, &mut manager, &dispatcher).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("anomaly detector stopped");
    Ok(())
}

fn build_dispatcher(
    config: &AppConfig,
    webhook_url: Option<String>,
    webhook_channel: String,
) -> ChannelDispatcher {
    let mut channels: HashMap<String, Arc<dyn AlertChannel>> = HashMap::new();
    channels.insert("console".to_string(), Arc::new(ConsoleChannel::new()));

    let webhook_enabled = config
        .alerts
        .channels
        .get("webhook")
        .map_or(true, |c| c.enabled);
    if let Some(url) = webhook_url {
        let channel_label = config
            .alerts
            .channels
            .get("webhook")
            .and_then(|c| c.channel.clone())
            .unwrap_or(webhook_channel);
        channels.insert(
            "webhook".to_string(),
            Arc::new(WebhookChannel::new(url, channel_label, webhook_enabled)),
        );
    } else {
        info!("no webhook url configured, webhook channel disabled");
    }

    let priority_channels: HashMap<AlertPriority, Vec<String>> = config
        .alerts
        .priorities
        .iter()
        .map(|(priority, p)| (*priority, p.channels.clone()))
        .collect();

    ChannelDispatcher::new(channels, priority_channels)
}

async fn process_metrics_message(
    kv: &KvStore,
    manager: &mut AlertManager,
    dispatcher: &ChannelDispatcher,
    payload: &str,
) {
    let update: MetricsUpdate = match serde_json::from_str(payload) {
        Ok(update) => update,
        Err(err) => {
            warn!(%err, "bad metrics envelope");
            return;
        }
    };

    // the envelope is identifiers only: read the full record from KV
    let metrics = match kv.get_metrics(update.venue, &update.instrument).await {
        Ok(Some(metrics)) => metrics,
        Ok(None) => {
            warn!(instrument = %update.instrument, "metrics expired before evaluation");
            return;
        }
        Err(err) => {
            warn!(%err, "metrics fetch failed");
            return;
        }
    };

    let outcome = match manager
        .process_metrics(update.venue, &update.instrument, &metrics, Utc::now())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(%err, "metrics processing failed");
            return;
        }
    };

    for alert in &outcome.triggered {
        dispatcher.dispatch(alert).await;
        if let Err(err) = kv.publish_alert_update(alert).await {
            warn!(%err, "alert publish failed");
        }
    }
    for alert in &outcome.resolved {
        dispatcher.dispatch_resolution(alert).await;
        if let Err(err) = kv.publish_alert_update(alert).await {
            warn!(%err, "resolution publish failed");
        }
    }
}

async fn run_escalation_sweep(
    kv: &KvStore,
    manager: &mut AlertManager,
    dispatcher: &ChannelDispatcher,
) {
    let escalated = match manager.check_escalations(Utc::now()).await {
        Ok(escalated) => escalated,
        Err(err) => {
            warn!(%err, "escalation sweep failed");
            return;
        }
    };
    for alert in &escalated {
        dispatcher.dispatch_escalation(alert).await;
        if let Err(err) = kv.publish_alert_update(alert).await {
            warn!(%err, "escalation publish failed");
        }
    }
}
