//! Redis-backed KV store and pub/sub. Online source of truth for
//! current snapshots, metrics, health and active alerts.
//!
//! Key layout:
//!   orderbook:<venue>:<instrument>        serialized snapshot, state TTL
//!   metrics:<venue>:<instrument>          serialized metrics, state TTL
//!   zscore:<venue>:<instrument>:<metric>  list of decimal strings, window-trimmed
//!   alert:<alert_id>                      serialized alert
//!   alerts:active / alerts:by_priority:<P> / alerts:by_instrument:<id>
//!   health:<venue>                        serialized health, state TTL

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use surveil_model::config::KvStorageConfig;
use surveil_model::{
    AggregatedMetrics, Alert, AlertPriority, GapMarker, HealthStatus, InstrumentId,
    OrderBookSnapshot, Venue,
};
use tracing::{debug, info};

use crate::envelope::{
    AlertUpdate, HealthUpdate, MetricsUpdate, OrderbookUpdate, CHANNEL_ALERTS, CHANNEL_HEALTH,
    CHANNEL_METRICS, CHANNEL_ORDERBOOK,
};
use crate::StorageError;

const ALL_PRIORITIES: [AlertPriority; 3] = [AlertPriority::P1, AlertPriority::P2, AlertPriority::P3];

#[derive(Clone)]
pub struct KvStore {
    client: redis::Client,
    manager: ConnectionManager,
    config: KvStorageConfig,
}

impl KvStore {
    pub async fn connect(url: &str, config: KvStorageConfig) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        info!(url = %common::redact_url(url), "kv store connected");
        Ok(Self {
            client,
            manager,
            config,
        })
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    fn orderbook_key(venue: Venue, instrument: &InstrumentId) -> String {
        format!("orderbook:{}:{}", venue, instrument)
    }

    fn metrics_key(venue: Venue, instrument: &InstrumentId) -> String {
        format!("metrics:{}:{}", venue, instrument)
    }

    fn zscore_key(venue: Venue, instrument: &InstrumentId, metric: &str) -> String {
        format!("zscore:{}:{}:{}", venue, instrument, metric)
    }

    fn alert_key(alert_id: &str) -> String {
        format!("alert:{}", alert_id)
    }

    fn priority_key(priority: AlertPriority) -> String {
        format!("alerts:by_priority:{}", priority)
    }

    fn instrument_key(instrument: &InstrumentId) -> String {
        format!("alerts:by_instrument:{}", instrument)
    }

    fn health_key(venue: Venue) -> String {
        format!("health:{}", venue)
    }

    // ---- snapshots ----

    pub async fn set_orderbook(&self, snapshot: &OrderBookSnapshot) -> Result<(), StorageError> {
        let key = Self::orderbook_key(snapshot.venue, &snapshot.instrument);
        let serialized = serde_json::to_string(snapshot)?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, serialized, self.config.current_state_ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get_orderbook(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
    ) -> Result<Option<OrderBookSnapshot>, StorageError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::orderbook_key(venue, instrument)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ---- metrics ----

    pub async fn set_metrics(&self, metrics: &AggregatedMetrics) -> Result<(), StorageError> {
        let key = Self::metrics_key(metrics.venue, &metrics.instrument);
        let serialized = serde_json::to_string(metrics)?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, serialized, self.config.current_state_ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get_metrics(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
    ) -> Result<Option<AggregatedMetrics>, StorageError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::metrics_key(venue, instrument)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ---- zscore buffers ----

    /// Appends one sample and trims to the window, atomically.
    pub async fn push_zscore_sample(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
        metric: &str,
        value: Decimal,
        window_size: usize,
    ) -> Result<(), StorageError> {
        let key = Self::zscore_key(venue, instrument, metric);
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .rpush(&key, value.to_string())
            .ignore()
            .ltrim(&key, -(window_size as isize), -1)
            .ignore()
            .expire(&key, self.config.zscore_buffer_ttl_seconds as i64)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_zscore_buffer(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
        metric: &str,
    ) -> Result<Vec<Decimal>, StorageError> {
        let mut conn = self.manager.clone();
        let raw: Vec<String> = conn
            .lrange(Self::zscore_key(venue, instrument, metric), 0, -1)
            .await?;
        Ok(raw.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    pub async fn clear_zscore_buffer(
        &self,
        venue: Venue,
        instrument: &InstrumentId,
        metric: &str,
    ) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(Self::zscore_key(venue, instrument, metric)).await?;
        Ok(())
    }

    // ---- alerts ----

    /// Writes the alert record and its index sets in one transaction.
    /// Resolved alerts leave every active index and pick up the dedup TTL
    /// so history expires on its own.
    pub async fn set_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let key = Self::alert_key(&alert.alert_id);
        let serialized = serde_json::to_string(alert)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set(&key, serialized).ignore();

        // priority indexes track the *current* priority; escalation moves
        // the id between sets
        for priority in ALL_PRIORITIES {
            if priority != alert.priority {
                pipe.srem(Self::priority_key(priority), &alert.alert_id)
                    .ignore();
            }
        }

        if alert.is_active() {
            pipe.sadd("alerts:active", &alert.alert_id).ignore();
            pipe.sadd(Self::priority_key(alert.priority), &alert.alert_id)
                .ignore();
            pipe.sadd(Self::instrument_key(&alert.instrument), &alert.alert_id)
                .ignore();
        } else {
            pipe.srem("alerts:active", &alert.alert_id).ignore();
            pipe.srem(Self::priority_key(alert.priority), &alert.alert_id)
                .ignore();
            pipe.srem(Self::instrument_key(&alert.instrument), &alert.alert_id)
                .ignore();
            pipe.expire(&key, self.config.alert_dedup_ttl_seconds as i64)
                .ignore();
        }

        let mut conn = self.manager.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        debug!(alert_id = %alert.alert_id, active = alert.is_active(), "alert written to kv");
        Ok(())
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StorageError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::alert_key(alert_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_alerts(&self, ids: Vec<String>) -> Result<Vec<Alert>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| Self::alert_key(id)).collect();
        let mut conn = self.manager.clone();
        let raws: Vec<Option<String>> = conn.mget(keys).await?;
        let mut alerts = Vec::with_capacity(raws.len());
        for raw in raws.into_iter().flatten() {
            alerts.push(serde_json::from_str(&raw)?);
        }
        Ok(alerts)
    }

    pub async fn get_active_alerts(&self) -> Result<Vec<Alert>, StorageError> {
        let mut conn = self.manager.clone();
        let ids: Vec<String> = conn.smembers("alerts:active").await?;
        self.load_alerts(ids).await
    }

    pub async fn get_alerts_by_priority(
        &self,
        priority: AlertPriority,
    ) -> Result<Vec<Alert>, StorageError> {
        let mut conn = self.manager.clone();
        let ids: Vec<String> = redis::cmd("SINTER")
            .arg("alerts:active")
            .arg(Self::priority_key(priority))
            .query_async(&mut conn)
            .await?;
        self.load_alerts(ids).await
    }

    pub async fn get_alerts_by_instrument(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<Alert>, StorageError> {
        let mut conn = self.manager.clone();
        let ids: Vec<String> = redis::cmd("SINTER")
            .arg("alerts:active")
            .arg(Self::instrument_key(instrument))
            .query_async(&mut conn)
            .await?;
        self.load_alerts(ids).await
    }

    pub async fn remove_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(Self::alert_key(&alert.alert_id)).ignore();
        pipe.srem("alerts:active", &alert.alert_id).ignore();
        for priority in ALL_PRIORITIES {
            pipe.srem(Self::priority_key(priority), &alert.alert_id)
                .ignore();
        }
        pipe.srem(Self::instrument_key(&alert.instrument), &alert.alert_id)
            .ignore();
        let mut conn = self.manager.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    // ---- health ----

    pub async fn set_health(&self, health: &HealthStatus) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(health)?;
        let mut conn = self.manager.clone();
        // stale health means the connection is likely dead, so it expires
        let _: () = conn
            .set_ex(
                Self::health_key(health.venue),
                serialized,
                self.config.current_state_ttl_seconds,
            )
            .await?;
        Ok(())
    }

    pub async fn get_health(&self, venue: Venue) -> Result<Option<HealthStatus>, StorageError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::health_key(venue)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ---- pub/sub ----

    pub async fn publish_orderbook_update(
        &self,
        snapshot: &OrderBookSnapshot,
    ) -> Result<(), StorageError> {
        let update = OrderbookUpdate {
            venue: snapshot.venue,
            instrument: snapshot.instrument.clone(),
            timestamp: snapshot.timestamp,
            sequence_id: snapshot.sequence_id,
        };
        self.publish(CHANNEL_ORDERBOOK, &serde_json::to_string(&update)?)
            .await
    }

    pub async fn publish_metrics_update(
        &self,
        metrics: &AggregatedMetrics,
    ) -> Result<(), StorageError> {
        let update = MetricsUpdate {
            venue: metrics.venue,
            instrument: metrics.instrument.clone(),
            timestamp: metrics.timestamp,
        };
        self.publish(CHANNEL_METRICS, &serde_json::to_string(&update)?)
            .await
    }

    pub async fn publish_alert_update(&self, alert: &Alert) -> Result<(), StorageError> {
        let update = AlertUpdate {
            alert_id: alert.alert_id.clone(),
            alert_type: alert.alert_type.clone(),
            priority: alert.priority,
            venue: alert.venue,
            instrument: alert.instrument.clone(),
        };
        self.publish(CHANNEL_ALERTS, &serde_json::to_string(&update)?)
            .await
    }

    pub async fn publish_health_update(&self, venue: Venue) -> Result<(), StorageError> {
        let update = HealthUpdate::Health { venue };
        self.publish(CHANNEL_HEALTH, &serde_json::to_string(&update)?)
            .await
    }

    pub async fn publish_gap(&self, gap: &GapMarker) -> Result<(), StorageError> {
        let update = HealthUpdate::Gap {
            venue: gap.venue,
            instrument: gap.instrument.clone(),
            reason: gap.reason,
        };
        self.publish(CHANNEL_HEALTH, &serde_json::to_string(&update)?)
            .await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    pub async fn subscribe(&self, channels: &[&str]) -> Result<KvSubscriber, StorageError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(*channel).await?;
        }
        info!(?channels, "kv pub/sub subscribed");
        Ok(KvSubscriber { pubsub })
    }
}

pub struct KvSubscriber {
    pubsub: redis::aio::PubSub,
}

impl KvSubscriber {
    /// Next (channel, payload). `None` means the subscription ended.
    pub async fn next_message(&mut self) -> Option<(String, String)> {
        use futures::StreamExt;
        let msg = self.pubsub.on_message().next().await?;
        let channel = msg.get_channel_name().to_string();
        let payload: String = msg.get_payload().ok()?;
        Some((channel, payload))
    }
}
