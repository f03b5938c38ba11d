//! Core metrics loop: subscribe to order book and health channels, fetch
//! authoritative snapshots from the KV store, compute metrics, publish,
//! buffer, flush.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use surveil_metrics::MetricsAggregator;
use surveil_model::{
    AggregatedMetrics, AppConfig, InstrumentId, OrderBookSnapshot, ZScoreWarmupStatus,
};
use surveil_storage::{
    BasisRow, HealthUpdate, KvStore, MetricRow, OrderbookUpdate, TimeSeriesStore, CHANNEL_HEALTH,
    CHANNEL_ORDERBOOK,
};
use tracing::{debug, error, info, warn};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_DEADLINE: Duration = Duration::from_secs(5);

pub async fn run(config: AppConfig, kv: KvStore, tsdb: TimeSeriesStore) -> Result<()> {
    let mut engine = MetricsEngine::new(&config, kv.clone(), tsdb)?;
    let mut subscriber = kv.subscribe(&[CHANNEL_ORDERBOOK, CHANNEL_HEALTH]).await?;

    let mut flush_timer = tokio::time::interval(FLUSH_INTERVAL);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = subscriber.next_message() => {
                let Some((channel, payload)) = message else {
                    warn!("pub/sub stream closed");
                    break;
                };
                engine.handle_message(&channel, &payload).await;
            }
            _ = flush_timer.tick() => {
                engine.flush().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // final flush bounded by the deadline
    let _ = tokio::time::timeout(FLUSH_DEADLINE, engine.flush()).await;
    info!("metrics engine stopped");
    Ok(())
}

struct MetricsEngine {
    kv: KvStore,
    tsdb: TimeSeriesStore,
    aggregators: HashMap<InstrumentId, MetricsAggregator>,
    /// perp -> spot counterpart.
    basis_pairs: BTreeMap<InstrumentId, InstrumentId>,
    /// Latest snapshot per instrument, feeding the basis window.
    last_snapshots: HashMap<InstrumentId, OrderBookSnapshot>,
    metric_buffer: Vec<MetricRow>,
    basis_buffer: Vec<BasisRow>,
    warmup: WarmupLogger,
    zscore_window: usize,
    reset_on_gap: bool,
}

impl MetricsEngine {
    fn new(config: &AppConfig, kv: KvStore, tsdb: TimeSeriesStore) -> Result<Self> {
        let zscore = &config.features.zscore;
        let mut aggregators = HashMap::new();
        for instrument in config.enabled_instruments() {
            let aggregator = MetricsAggregator::new(
                zscore.enabled,
                zscore.window_size,
                zscore.min_samples,
                zscore.min_std,
            )?;
            aggregators.insert(instrument.id.clone(), aggregator);
            info!(
                instrument = %instrument.id,
                use_zscore = zscore.enabled,
                window = zscore.window_size,
                "aggregator created"
            );
        }
        Ok(Self {
            kv,
            tsdb,
            aggregators,
            basis_pairs: config.basis_pairs_by_perp(),
            last_snapshots: HashMap::new(),
            metric_buffer: Vec::new(),
            basis_buffer: Vec::new(),
            warmup: WarmupLogger::new(zscore.min_samples, zscore.warmup_log_interval),
            zscore_window: zscore.window_size,
            reset_on_gap: zscore.reset_on_gap,
        })
    }

    async fn handle_message(&mut self, channel: &str, payload: &str) {
        match channel {
            CHANNEL_ORDERBOOK => match serde_json::from_str::<OrderbookUpdate>(payload) {
                Ok(update) => self.process_orderbook_update(update).await,
                Err(err) => warn!(%err, "bad orderbook envelope"),
            },
            CHANNEL_HEALTH => match serde_json::from_str::<HealthUpdate>(payload) {
                Ok(HealthUpdate::Gap {
                    venue,
                    instrument,
                    reason,
                }) => {
                    if self.reset_on_gap {
                        self.reset_zscores(venue, &instrument, &reason.to_string()).await;
                    }
                }
                Ok(HealthUpdate::Health { .. }) => {}
                Err(err) => warn!(%err, "bad health envelope"),
            },
            _ => {}
        }
    }

    async fn process_orderbook_update(&mut self, update: OrderbookUpdate) {
        // broadcasts are identifiers only: re-read the full book from KV
        let snapshot = match self.kv.get_orderbook(update.venue, &update.instrument).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(instrument = %update.instrument, "snapshot expired before processing");
                return;
            }
            Err(err) => {
                warn!(%err, "snapshot fetch failed");
                return;
            }
        };

        self.last_snapshots
            .insert(snapshot.instrument.clone(), snapshot.clone());

        let Some(aggregator) = self.aggregators.get_mut(&snapshot.instrument) else {
            debug!(instrument = %snapshot.instrument, "no aggregator for instrument");
            return;
        };

        let spot_snapshot = self
            .basis_pairs
            .get(&snapshot.instrument)
            .and_then(|spot| self.last_snapshots.get(spot));

        let metrics = match aggregator.calculate_all(&snapshot, spot_snapshot) {
            Ok(metrics) => metrics,
            Err(err) => {
                // one malformed snapshot never stops the stream
                warn!(instrument = %snapshot.instrument, %err, "metrics calculation failed");
                return;
            }
        };

        self.warmup.observe(&metrics, aggregator, Utc::now());

        if let Err(err) = self.kv.set_metrics(&metrics).await {
            warn!(%err, "metrics write failed");
        }
        if let Err(err) = self.kv.publish_metrics_update(&metrics).await {
            warn!(%err, "metrics publish failed");
        }
        self.persist_zscore_samples(&metrics).await;
        self.buffer_metrics(&metrics);
    }

    /// Mirrors the in-memory rolling windows into the KV buffers so
    /// warmup state is observable (and recoverable) outside the process.
    async fn persist_zscore_samples(&self, metrics: &AggregatedMetrics) {
        if let Err(err) = self
            .kv
            .push_zscore_sample(
                metrics.venue,
                &metrics.instrument,
                "spread_bps",
                metrics.spread.spread_bps,
                self.zscore_window,
            )
            .await
        {
            warn!(%err, "spread zscore buffer write failed");
        }
        if let Some(basis) = &metrics.basis {
            if let Err(err) = self
                .kv
                .push_zscore_sample(
                    metrics.venue,
                    &metrics.instrument,
                    "basis_bps",
                    basis.basis_bps.abs(),
                    self.zscore_window,
                )
                .await
            {
                warn!(%err, "basis zscore buffer write failed");
            }
        }
    }

    fn buffer_metrics(&mut self, metrics: &AggregatedMetrics) {
        self.metric_buffer.push(MetricRow {
            metric_name: "spread_bps".to_string(),
            venue: metrics.venue,
            instrument: metrics.instrument.clone(),
            timestamp: metrics.timestamp,
            value: metrics.spread.spread_bps,
            zscore: metrics.spread.zscore,
        });
        for (name, value) in [
            ("depth_5bps_total", metrics.depth.depth_5bps_total),
            ("depth_10bps_total", metrics.depth.depth_10bps_total),
            ("depth_25bps_total", metrics.depth.depth_25bps_total),
            ("imbalance", metrics.imbalance.top_of_book),
        ] {
            self.metric_buffer.push(MetricRow {
                metric_name: name.to_string(),
                venue: metrics.venue,
                instrument: metrics.instrument.clone(),
                timestamp: metrics.timestamp,
                value,
                zscore: None,
            });
        }
        if let Some(basis) = &metrics.basis {
            let spot = self
                .basis_pairs
                .get(&metrics.instrument)
                .cloned()
                .unwrap_or_else(|| metrics.instrument.clone());
            self.basis_buffer.push(BasisRow {
                perp_instrument: metrics.instrument.clone(),
                spot_instrument: spot,
                venue: metrics.venue,
                timestamp: metrics.timestamp,
                perp_mid: basis.perp_mid,
                spot_mid: basis.spot_mid,
                basis_abs: basis.basis_abs,
                basis_bps: basis.basis_bps,
                zscore: basis.zscore,
            });
        }
    }

    async fn flush(&mut self) {
        if !self.metric_buffer.is_empty() {
            let rows = std::mem::take(&mut self.metric_buffer);
            match self.tsdb.insert_metric_rows(&rows).await {
                Ok(written) => debug!(written, "metric rows flushed"),
                Err(err) => error!(%err, "metric flush failed"),
            }
        }
        if !self.basis_buffer.is_empty() {
            let rows = std::mem::take(&mut self.basis_buffer);
            match self.tsdb.insert_basis_rows(&rows).await {
                Ok(written) => debug!(written, "basis rows flushed"),
                Err(err) => error!(%err, "basis flush failed"),
            }
        }
    }

    /// Gap handling: clear the in-memory windows and the persisted KV
    /// buffers; the calculators re-enter warmup.
    async fn reset_zscores(
        &mut self,
        venue: surveil_model::Venue,
        instrument: &InstrumentId,
        reason: &str,
    ) {
        if let Some(aggregator) = self.aggregators.get_mut(instrument) {
            aggregator.reset_all_zscores(reason);
            info!(instrument = %instrument, reason, "zscores reset on gap");
        }
        for metric in ["spread_bps", "basis_bps"] {
            if let Err(err) = self.kv.clear_zscore_buffer(venue, instrument, metric).await {
                warn!(%err, metric, "zscore buffer clear failed");
            }
        }
        self.warmup.reset(instrument);
    }
}

/// Rate-limited warmup progress logging per (instrument, metric).
struct WarmupLogger {
    min_samples: usize,
    log_interval: usize,
    last_logged: HashMap<(InstrumentId, &'static str), usize>,
    announced_ready: HashMap<(InstrumentId, &'static str), bool>,
}

impl WarmupLogger {
    fn new(min_samples: usize, log_interval: usize) -> Self {
        Self {
            min_samples,
            log_interval: log_interval.max(1),
            last_logged: HashMap::new(),
            announced_ready: HashMap::new(),
        }
    }

    fn observe(
        &mut self,
        metrics: &AggregatedMetrics,
        aggregator: &MetricsAggregator,
        now: DateTime<Utc>,
    ) {
        let statuses = aggregator.zscore_statuses();
        for (name, status) in [("spread_bps", statuses.spread), ("basis_bps", statuses.basis)] {
            let Some(status) = status else { continue };
            let key = (metrics.instrument.clone(), name);

            if status.is_ready {
                if !self.announced_ready.get(&key).copied().unwrap_or(false) {
                    info!(
                        instrument = %metrics.instrument,
                        metric = name,
                        samples = status.samples_collected,
                        "zscore active"
                    );
                    self.announced_ready.insert(key, true);
                }
                continue;
            }

            self.announced_ready.insert(key.clone(), false);
            let last = self.last_logged.get(&key).copied().unwrap_or(0);
            if status.samples_collected >= last + self.log_interval {
                let progress = ZScoreWarmupStatus {
                    metric_name: name.to_string(),
                    instrument: metrics.instrument.clone(),
                    venue: metrics.venue,
                    is_warmed_up: false,
                    sample_count: status.samples_collected,
                    min_samples: self.min_samples,
                    last_update: now,
                };
                info!(
                    instrument = %progress.instrument,
                    metric = name,
                    status = %progress.display_text(),
                    "zscore warmup progress"
                );
                self.last_logged.insert(key, status.samples_collected);
            }
        }
    }

    fn reset(&mut self, instrument: &InstrumentId) {
        self.last_logged.retain(|(id, _), _| id != instrument);
        self.announced_ready.retain(|(id, _), _| id != instrument);
    }
}
