//! Root ingest pipeline: fan-in from venue reader tasks, KV writes,
//! pub/sub announcements, time-gap detection, snapshot sampling into the
//! time-series store, and 1 Hz health reporting.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use rust_decimal::Decimal;
use surveil_model::{
    AppConfig, GapMarker, GapReason, HealthStatus, InstrumentId, OrderBookSnapshot, Venue,
};
use surveil_storage::{KvStore, TimeSeriesStore};
use surveil_venue_core::{VenueAdapter, VenueEvent};
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 1024;
const HEALTH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_DEADLINE: Duration = Duration::from_secs(5);

/// Reader -> pipeline messages.
enum IngestMessage {
    Event(VenueEvent),
    Health(HealthStatus),
    /// Reader hit a fatal adapter error; the venue is down for good.
    Fatal(Venue, String),
}

pub async fn run(
    config: AppConfig,
    kv: KvStore,
    tsdb: TimeSeriesStore,
    adapters: Vec<(Box<dyn VenueAdapter>, Vec<InstrumentId>)>,
) -> Result<()> {
    let (tx, rx) = kanal::bounded_async::<IngestMessage>(CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut reader_handles = Vec::new();
    for (adapter, instruments) in adapters {
        let tx = tx.clone();
        let shutdown = shutdown_rx.clone();
        reader_handles.push(tokio::spawn(reader_task(adapter, instruments, tx, shutdown)));
    }
    drop(tx);

    let mut pipeline = Pipeline::new(config, kv, tsdb);

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Ok(message) => pipeline.handle(message).await,
                    Err(_) => {
                        warn!("all venue readers stopped");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // cooperative shutdown: stop readers, drain in-flight writes bounded
    // by the flush deadline
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(FLUSH_DEADLINE, pipeline.flush_snapshots()).await;
    for handle in reader_handles {
        let _ = tokio::time::timeout(FLUSH_DEADLINE, handle).await;
    }
    info!("data ingestion stopped");
    Ok(())
}

/// Owns one adapter: connects, subscribes, then forwards stream events
/// and 1 Hz health reports until shutdown.
async fn reader_task(
    mut adapter: Box<dyn VenueAdapter>,
    instruments: Vec<InstrumentId>,
    tx: kanal::AsyncSender<IngestMessage>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let venue = adapter.venue();
    if let Err(err) = adapter.connect().await {
        error!(%venue, %err, "venue connect failed");
        let _ = tx.send(IngestMessage::Fatal(venue, err.to_string())).await;
        return;
    }
    if let Err(err) = adapter.subscribe(&instruments).await {
        error!(%venue, %err, "venue subscribe failed");
        let _ = tx.send(IngestMessage::Fatal(venue, err.to_string())).await;
        return;
    }
    info!(%venue, instruments = instruments.len(), "venue reader started");

    let mut health_timer = tokio::time::interval(HEALTH_INTERVAL);
    health_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = adapter.next_event() => {
                match event {
                    Ok(event) => {
                        if tx.send(IngestMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        // only fatal errors escape next_event
                        error!(%venue, %err, "venue stream fatal");
                        let _ = tx.send(IngestMessage::Fatal(venue, err.to_string())).await;
                        break;
                    }
                }
            }
            _ = health_timer.tick() => {
                let health = adapter.health_check();
                if tx.send(IngestMessage::Health(health)).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = adapter.disconnect().await;
    info!(%venue, "venue reader stopped");
}

struct Pipeline {
    config: AppConfig,
    kv: KvStore,
    tsdb: TimeSeriesStore,
    /// instrument -> last local receipt time, for time-gap detection.
    last_arrival: HashMap<InstrumentId, DateTime<Utc>>,
    /// instrument -> last time a snapshot was sampled into the TSDB.
    last_stored: HashMap<InstrumentId, DateTime<Utc>>,
    snapshot_buffer: Vec<OrderBookSnapshot>,
}

impl Pipeline {
    fn new(config: AppConfig, kv: KvStore, tsdb: TimeSeriesStore) -> Self {
        Self {
            config,
            kv,
            tsdb,
            last_arrival: HashMap::new(),
            last_stored: HashMap::new(),
            snapshot_buffer: Vec::new(),
        }
    }

    async fn handle(&mut self, message: IngestMessage) {
        match message {
            IngestMessage::Event(VenueEvent::Snapshot(snapshot)) => {
                self.handle_snapshot(snapshot).await;
            }
            IngestMessage::Event(VenueEvent::Gap(gap)) => {
                self.record_gap(gap).await;
            }
            IngestMessage::Event(VenueEvent::Ticker(ticker)) => {
                // tickers inform dashboards via REST; the book path is the
                // persisted stream
                debug!(instrument = %ticker.instrument, "ticker received");
            }
            IngestMessage::Health(health) => {
                if let Err(err) = self.kv.set_health(&health).await {
                    warn!(%err, "health write failed");
                }
                if let Err(err) = self.kv.publish_health_update(health.venue).await {
                    warn!(%err, "health publish failed");
                }
            }
            IngestMessage::Fatal(venue, reason) => {
                // fatal for that venue only; the rest of the pipeline
                // keeps running
                error!(%venue, %reason, "venue permanently down");
            }
        }
    }

    async fn handle_snapshot(&mut self, snapshot: OrderBookSnapshot) {
        self.detect_time_gap(&snapshot).await;

        if let Err(err) = self.kv.set_orderbook(&snapshot).await {
            warn!(%err, instrument = %snapshot.instrument, "orderbook write failed");
            return;
        }
        if let Err(err) = self.kv.publish_orderbook_update(&snapshot).await {
            warn!(%err, instrument = %snapshot.instrument, "orderbook publish failed");
        }

        self.sample_snapshot(snapshot).await;
    }

    /// Local-time inter-arrival check; the venue-side sequence check lives
    /// in the adapters.
    async fn detect_time_gap(&mut self, snapshot: &OrderBookSnapshot) {
        let gap_config = &self.config.features.gap_handling;
        let now = snapshot.local_timestamp;
        let previous = self
            .last_arrival
            .insert(snapshot.instrument.clone(), now);

        if !gap_config.mark_gaps {
            return;
        }
        let Some(previous) = previous else {
            return;
        };
        let elapsed = now - previous;
        if elapsed.num_seconds() < gap_config.gap_threshold_seconds as i64 {
            return;
        }
        let duration =
            Decimal::from(elapsed.num_milliseconds()) / Decimal::from(1000);
        match GapMarker::new(
            snapshot.venue,
            snapshot.instrument.clone(),
            previous,
            now,
            duration,
            GapReason::TimeGap,
            None,
            Some(snapshot.sequence_id),
        ) {
            Ok(gap) => self.record_gap(gap).await,
            Err(err) => warn!(%err, "time gap construction failed"),
        }
    }

    async fn record_gap(&mut self, gap: GapMarker) {
        warn!(
            venue = %gap.venue,
            instrument = %gap.instrument,
            reason = %gap.reason,
            duration_seconds = %gap.duration_seconds,
            "data gap recorded"
        );
        if let Err(err) = self.tsdb.insert_gap_marker(&gap).await {
            error!(%err, "gap write failed");
        }
        // downstream z-score resets hang off this notification
        if let Err(err) = self.kv.publish_gap(&gap).await {
            warn!(%err, "gap publish failed");
        }
    }

    /// Samples snapshots into the TSDB at the configured storage cadence.
    async fn sample_snapshot(&mut self, snapshot: OrderBookSnapshot) {
        let interval = self.config.features.data_capture.storage_interval_seconds;
        let due = match self.last_stored.get(&snapshot.instrument) {
            Some(last) => (snapshot.local_timestamp - *last).num_seconds() >= interval as i64,
            None => true,
        };
        if !due {
            return;
        }
        self.last_stored
            .insert(snapshot.instrument.clone(), snapshot.local_timestamp);
        self.snapshot_buffer.push(snapshot);
        if self.snapshot_buffer.len() >= 64 {
            self.flush_snapshots().await;
        }
    }

    async fn flush_snapshots(&mut self) {
        if self.snapshot_buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.snapshot_buffer);
        match self.tsdb.insert_orderbook_snapshots(&batch).await {
            Ok(written) => debug!(written, "snapshots flushed"),
            Err(err) => error!(%err, "snapshot flush failed"),
        }
    }
}
