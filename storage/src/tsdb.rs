//! TimescaleDB client. Historical audit store: batched inserts for
//! snapshots, metrics, basis and gaps; alert rows upserted by alert_id so
//! lifecycle transitions overwrite in place. Schema management is
//! external; this client only reads and writes the documented tables.

use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use surveil_model::{
    Alert, GapMarker, InstrumentId, OrderBookSnapshot, Side, Venue,
};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::retry::{with_retry, DEFAULT_ATTEMPTS};
use crate::StorageError;

/// One row for the `metrics` table.
#[derive(Debug, Clone)]
pub struct MetricRow {
    pub metric_name: String,
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
    pub zscore: Option<Decimal>,
}

/// One row for the `basis_metrics` table.
#[derive(Debug, Clone)]
pub struct BasisRow {
    pub perp_instrument: InstrumentId,
    pub spot_instrument: InstrumentId,
    pub venue: Venue,
    pub timestamp: DateTime<Utc>,
    pub perp_mid: Decimal,
    pub spot_mid: Decimal,
    pub basis_abs: Decimal,
    pub basis_bps: Decimal,
    pub zscore: Option<Decimal>,
}

#[derive(Clone)]
pub struct TimeSeriesStore {
    pool: Pool,
}

impl TimeSeriesStore {
    pub async fn connect(database_url: &str, pool_size: usize) -> Result<Self, StorageError> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| StorageError::Tsdb(e))?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .map_err(|e| StorageError::Pool(e.to_string()))?;
        // fail fast on a bad URL or unreachable host
        let client = pool.get().await.map_err(|e| StorageError::Pool(e.to_string()))?;
        client.simple_query("SELECT 1").await?;
        info!(url = %common::redact_url(database_url), pool_size, "tsdb connected");
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Pool(e.to_string()))
    }

    pub async fn insert_orderbook_snapshots(
        &self,
        snapshots: &[OrderBookSnapshot],
    ) -> Result<u64, StorageError> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        with_retry("insert_orderbook_snapshots", DEFAULT_ATTEMPTS, || async {
            let client = self.client().await?;
            let statement = client
                .prepare_cached(
                    "INSERT INTO order_book_snapshots (
                        venue, instrument, timestamp, local_timestamp, sequence_id,
                        best_bid, best_ask, mid_price, spread_abs, spread_bps,
                        depth_5bps_bid, depth_5bps_ask, depth_5bps_total,
                        depth_10bps_bid, depth_10bps_ask, depth_10bps_total,
                        depth_25bps_bid, depth_25bps_ask, depth_25bps_total,
                        imbalance, bids_json, asks_json
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                              $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)",
                )
                .await?;
            let mut written = 0u64;
            for snapshot in snapshots {
                let bid_5 = snapshot.depth_at_bps(5, Side::Bid);
                let ask_5 = snapshot.depth_at_bps(5, Side::Ask);
                let bid_10 = snapshot.depth_at_bps(10, Side::Bid);
                let ask_10 = snapshot.depth_at_bps(10, Side::Ask);
                let bid_25 = snapshot.depth_at_bps(25, Side::Bid);
                let ask_25 = snapshot.depth_at_bps(25, Side::Ask);
                let imbalance = {
                    let total = bid_10 + ask_10;
                    if total == Decimal::ZERO {
                        Decimal::ZERO
                    } else {
                        (bid_10 - ask_10) / total
                    }
                };
                written += client
                    .execute(
                        &statement,
                        &[
                            &snapshot.venue.to_string(),
                            &snapshot.instrument.as_str(),
                            &snapshot.timestamp,
                            &snapshot.local_timestamp,
                            &(snapshot.sequence_id as i64),
                            &snapshot.best_bid(),
                            &snapshot.best_ask(),
                            &snapshot.mid_price(),
                            &snapshot.spread(),
                            &snapshot.spread_bps(),
                            &bid_5,
                            &ask_5,
                            &(bid_5 + ask_5),
                            &bid_10,
                            &ask_10,
                            &(bid_10 + ask_10),
                            &bid_25,
                            &ask_25,
                            &(bid_25 + ask_25),
                            &imbalance,
                            &serde_json::to_value(&snapshot.bids)?,
                            &serde_json::to_value(&snapshot.asks)?,
                        ],
                    )
                    .await?;
            }
            Ok::<u64, StorageError>(written)
        })
        .await
    }

    pub async fn insert_metric_rows(&self, rows: &[MetricRow]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        with_retry("insert_metric_rows", DEFAULT_ATTEMPTS, || async {
            let client = self.client().await?;
            let statement = client
                .prepare_cached(
                    "INSERT INTO metrics (metric_name, venue, instrument, timestamp, value, zscore)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .await?;
            let mut written = 0u64;
            for row in rows {
                written += client
                    .execute(
                        &statement,
                        &[
                            &row.metric_name,
                            &row.venue.to_string(),
                            &row.instrument.as_str(),
                            &row.timestamp,
                            &row.value,
                            &row.zscore,
                        ],
                    )
                    .await?;
            }
            Ok::<u64, StorageError>(written)
        })
        .await
    }

    pub async fn insert_basis_rows(&self, rows: &[BasisRow]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        with_retry("insert_basis_rows", DEFAULT_ATTEMPTS, || async {
            let client = self.client().await?;
            let statement = client
                .prepare_cached(
                    "INSERT INTO basis_metrics (
                        perp_instrument, spot_instrument, venue, timestamp,
                        perp_mid, spot_mid, basis_abs, basis_bps, zscore
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .await?;
            let mut written = 0u64;
            for row in rows {
                written += client
                    .execute(
                        &statement,
                        &[
                            &row.perp_instrument.as_str(),
                            &row.spot_instrument.as_str(),
                            &row.venue.to_string(),
                            &row.timestamp,
                            &row.perp_mid,
                            &row.spot_mid,
                            &row.basis_abs,
                            &row.basis_bps,
                            &row.zscore,
                        ],
                    )
                    .await?;
            }
            Ok::<u64, StorageError>(written)
        })
        .await
    }

    /// Upserts one alert row; lifecycle transitions overwrite in place.
    pub async fn upsert_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        with_retry("upsert_alert", DEFAULT_ATTEMPTS, || async {
            let client = self.client().await?;
            let statement = client
                .prepare_cached(
                    "INSERT INTO alerts (
                        alert_id, alert_type, priority, severity, venue, instrument,
                        trigger_metric, trigger_value, trigger_threshold, trigger_condition,
                        zscore_value, zscore_threshold,
                        triggered_at, acknowledged_at, resolved_at, duration_seconds,
                        peak_value, peak_at, escalated, escalated_at, original_priority,
                        context, resolution_type, resolution_value, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                              $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
                     ON CONFLICT (alert_id) DO UPDATE SET
                        priority = EXCLUDED.priority,
                        acknowledged_at = EXCLUDED.acknowledged_at,
                        resolved_at = EXCLUDED.resolved_at,
                        duration_seconds = EXCLUDED.duration_seconds,
                        peak_value = EXCLUDED.peak_value,
                        peak_at = EXCLUDED.peak_at,
                        escalated = EXCLUDED.escalated,
                        escalated_at = EXCLUDED.escalated_at,
                        original_priority = EXCLUDED.original_priority,
                        context = EXCLUDED.context,
                        resolution_type = EXCLUDED.resolution_type,
                        resolution_value = EXCLUDED.resolution_value,
                        updated_at = EXCLUDED.updated_at",
                )
                .await?;
            client
                .execute(
                    &statement,
                    &[
                        &alert.alert_id,
                        &alert.alert_type,
                        &alert.priority.to_string(),
                        &alert.severity.to_string(),
                        &alert.venue.to_string(),
                        &alert.instrument.as_str(),
                        &alert.trigger_metric,
                        &alert.trigger_value,
                        &alert.trigger_threshold,
                        &alert.trigger_condition.to_string(),
                        &alert.zscore_value,
                        &alert.zscore_threshold,
                        &alert.triggered_at,
                        &alert.acknowledged_at,
                        &alert.resolved_at,
                        &alert.duration_seconds,
                        &alert.peak_value,
                        &alert.peak_at,
                        &alert.escalated,
                        &alert.escalated_at,
                        &alert.original_priority.map(|p| p.to_string()),
                        &serde_json::Value::Object(alert.context.clone()),
                        &alert.resolution_type.map(|r| r.to_string()),
                        &alert.resolution_value,
                        &Utc::now(),
                    ],
                )
                .await?;
            debug!(alert_id = %alert.alert_id, "alert upserted to tsdb");
            Ok::<(), StorageError>(())
        })
        .await
    }

    pub async fn insert_gap_marker(&self, gap: &GapMarker) -> Result<(), StorageError> {
        with_retry("insert_gap_marker", DEFAULT_ATTEMPTS, || async {
            let client = self.client().await?;
            let statement = client
                .prepare_cached(
                    "INSERT INTO data_gaps (
                        venue, instrument, gap_start, gap_end, duration_seconds,
                        reason, sequence_id_before, sequence_id_after
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .await?;
            client
                .execute(
                    &statement,
                    &[
                        &gap.venue.to_string(),
                        &gap.instrument.as_str(),
                        &gap.gap_start,
                        &gap.gap_end,
                        &gap.duration_seconds,
                        &gap.reason.to_string(),
                        &gap.sequence_id_before.map(|s| s as i64),
                        &gap.sequence_id_after.map(|s| s as i64),
                    ],
                )
                .await?;
            Ok::<(), StorageError>(())
        })
        .await
    }
}
