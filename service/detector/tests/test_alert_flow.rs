//! End-to-end alert flow: live metric calculation through the alert
//! manager, exercising warmup gating and the full firing path.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use surveil_detection::{AlertManager, AlertStore, MemoryAlertStore};
use surveil_metrics::MetricsAggregator;
use surveil_model::{
    AlertCondition, AlertDefinition, AlertPriority, AlertSeverity, AlertThreshold, InstrumentId,
    OrderBookSnapshot, PriceLevel, Venue,
};

const INSTRUMENT: &str = "BTC-USDT-PERP";

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// Book whose spread lands exactly on `spread_bps` around a 50_000 mid.
fn book(seq: u64, spread_bps: Decimal) -> OrderBookSnapshot {
    let mid = dec!(50000);
    let half_spread = spread_bps / dec!(10000) * mid / dec!(2);
    OrderBookSnapshot::new(
        Venue::Binance,
        INSTRUMENT.into(),
        ts(seq as i64),
        ts(seq as i64),
        seq,
        vec![PriceLevel::new(mid - half_spread, dec!(1))],
        vec![PriceLevel::new(mid + half_spread, dec!(1))],
        20,
    )
    .unwrap()
}

fn spread_warning() -> AlertDefinition {
    AlertDefinition {
        alert_type: "spread_warning".to_string(),
        name: "Spread Warning".to_string(),
        metric_name: "spread_bps".to_string(),
        default_priority: AlertPriority::P2,
        default_severity: AlertSeverity::Warning,
        condition: AlertCondition::Gt,
        requires_zscore: true,
        persistence_seconds: None,
        throttle_seconds: 60,
        escalation_seconds: Some(300),
        escalates_to: None,
        enabled: true,
    }
}

fn manager(store: Arc<MemoryAlertStore>) -> AlertManager {
    let mut definitions = BTreeMap::new();
    definitions.insert("spread_warning".to_string(), spread_warning());
    let mut thresholds = BTreeMap::new();
    thresholds.insert(
        INSTRUMENT.to_string(),
        BTreeMap::from([(
            "spread_warning".to_string(),
            AlertThreshold {
                threshold: dec!(3.0),
                zscore_threshold: Some(dec!(2.0)),
            },
        )]),
    );
    AlertManager::new(store, definitions, thresholds, 60, 300, true)
}

/// Deterministic spread values spread uniformly across [1.0, 1.2] bps.
fn calm_spread(i: u64) -> Decimal {
    dec!(1.0) + Decimal::from(i % 5) * dec!(0.05)
}

#[tokio::test]
async fn test_spread_warning_fires_after_warmup() -> eyre::Result<()> {
    let store = Arc::new(MemoryAlertStore::new());
    let mut manager = manager(store.clone());
    let mut aggregator = MetricsAggregator::new(true, 300, 30, dec!(0.0001))?;
    let instrument: InstrumentId = INSTRUMENT.into();

    // 35 calm snapshots: the window warms past min_samples
    for i in 0..35u64 {
        let metrics = aggregator.calculate_all(&book(i, calm_spread(i)), None)?;
        let outcome = manager
            .process_metrics(Venue::Binance, &instrument, &metrics, ts(i as i64))
            .await?;
        assert!(outcome.triggered.is_empty(), "no alert during calm market");
    }

    // the anomaly: 3.5 bps against a ~1.1 mean is far past z = 2
    let metrics = aggregator.calculate_all(&book(35, dec!(3.5)), None)?;
    assert!(metrics.spread.zscore.expect("warmed up") > dec!(2.0));

    let outcome = manager
        .process_metrics(Venue::Binance, &instrument, &metrics, ts(35))
        .await?;
    assert_eq!(outcome.triggered.len(), 1);
    let alert = &outcome.triggered[0];
    assert_eq!(alert.priority, AlertPriority::P2);
    assert_eq!(alert.trigger_value, dec!(3.5));
    assert_eq!(alert.trigger_threshold, dec!(3.0));
    assert_eq!(store.get_active_alerts().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_warmup_suppresses_even_extreme_spreads() -> eyre::Result<()> {
    let store = Arc::new(MemoryAlertStore::new());
    let mut manager = manager(store.clone());
    let mut aggregator = MetricsAggregator::new(true, 300, 30, dec!(0.0001))?;
    let instrument: InstrumentId = INSTRUMENT.into();

    // only 20 snapshots, fewer than min_samples; the last one is wild
    for i in 0..20u64 {
        let spread = if i == 19 { dec!(10.0) } else { calm_spread(i) };
        let metrics = aggregator.calculate_all(&book(i, spread), None)?;
        assert_eq!(metrics.spread.zscore, None, "still warming up at {}", i);

        let outcome = manager
            .process_metrics(Venue::Binance, &instrument, &metrics, ts(i as i64))
            .await?;
        assert!(outcome.triggered.is_empty());
    }
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_gap_reset_reenters_warmup_and_suppresses() -> eyre::Result<()> {
    let store = Arc::new(MemoryAlertStore::new());
    let mut manager = manager(store.clone());
    let mut aggregator = MetricsAggregator::new(true, 300, 30, dec!(0.0001))?;
    let instrument: InstrumentId = INSTRUMENT.into();

    for i in 0..35u64 {
        let metrics = aggregator.calculate_all(&book(i, calm_spread(i)), None)?;
        manager
            .process_metrics(Venue::Binance, &instrument, &metrics, ts(i as i64))
            .await?;
    }
    assert!(aggregator.zscore_statuses().spread.unwrap().is_ready);

    // a gap wipes the window; a spike right after must not alert
    aggregator.reset_all_zscores("gap_detected");
    let metrics = aggregator.calculate_all(&book(36, dec!(3.5)), None)?;
    assert_eq!(metrics.spread.zscore, None);
    let outcome = manager
        .process_metrics(Venue::Binance, &instrument, &metrics, ts(36))
        .await?;
    assert!(outcome.triggered.is_empty());
    assert!(store.is_empty());
    Ok(())
}
