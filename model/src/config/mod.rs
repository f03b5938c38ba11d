//! Declarative configuration, loaded at startup from a directory of YAML
//! documents: `exchanges.yaml`, `instruments.yaml`, `alerts.yaml`,
//! `features.yaml`. Validation failures are fatal at startup.

mod alerts;
mod exchanges;
mod features;
mod instruments;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::{bail, eyre, Context, Result};

pub use alerts::{
    AlertChannelConfig, AlertDefinitionSpec, AlertsConfig, AlertsGlobalConfig, PriorityConfig,
};
pub use exchanges::{ConnectionConfig, ExchangeConfig, ExchangesFile, StreamsConfig};
pub use features::{
    DataCaptureConfig, FeaturesConfig, GapHandlingConfig, KvStorageConfig, LoggingConfig,
    StorageConfig, TsdbStorageConfig, ZScoreConfig,
};
pub use instruments::{BasisPair, InstrumentConfig, InstrumentsFile, VenueSymbolConfig};

use crate::{AlertDefinition, AlertThreshold, InstrumentId, Venue};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchanges: BTreeMap<Venue, ExchangeConfig>,
    pub instruments: Vec<InstrumentConfig>,
    pub basis_pairs: Vec<BasisPair>,
    pub alerts: AlertsConfig,
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Loads and cross-validates the four config documents.
    pub fn load(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = config_dir.into();
        let exchanges: ExchangesFile = load_doc(&dir, "exchanges.yaml")?;
        let instruments: InstrumentsFile = load_doc(&dir, "instruments.yaml")?;
        let alerts_doc: alerts::AlertsFile = load_doc(&dir, "alerts.yaml")?;
        let features_doc: features::FeaturesFile = load_doc(&dir, "features.yaml")?;

        let config = Self {
            exchanges: exchanges.exchanges,
            instruments: instruments.instruments,
            basis_pairs: instruments.basis_pairs,
            alerts: alerts_doc.alerts,
            features: features_doc.features,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.exchanges.is_empty() {
            bail!("no exchanges configured");
        }
        if self.instruments.is_empty() {
            bail!("no instruments configured");
        }
        for pair in &self.basis_pairs {
            self.instrument(&pair.perp)
                .ok_or_else(|| eyre!("basis pair references unknown perp {}", pair.perp))?;
            self.instrument(&pair.spot)
                .ok_or_else(|| eyre!("basis pair references unknown spot {}", pair.spot))?;
        }
        for (instrument, thresholds) in &self.alerts.thresholds {
            if instrument != "*" && self.instrument(&InstrumentId::new(instrument)).is_none() {
                bail!("thresholds reference unknown instrument {}", instrument);
            }
            for alert_type in thresholds.keys() {
                if !self.alerts.definitions.contains_key(alert_type) {
                    bail!(
                        "thresholds for {} reference unknown alert type {}",
                        instrument,
                        alert_type
                    );
                }
            }
        }
        if self.features.zscore.window_size < self.features.zscore.min_samples {
            bail!(
                "zscore window_size ({}) must be >= min_samples ({})",
                self.features.zscore.window_size,
                self.features.zscore.min_samples
            );
        }
        Ok(())
    }

    pub fn exchange(&self, venue: Venue) -> Option<&ExchangeConfig> {
        self.exchanges.get(&venue)
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = (Venue, &ExchangeConfig)> {
        self.exchanges
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(v, c)| (*v, c))
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| &i.id == id)
    }

    pub fn enabled_instruments(&self) -> impl Iterator<Item = &InstrumentConfig> {
        self.instruments.iter().filter(|i| i.enabled)
    }

    /// perp -> spot mapping for basis calculation.
    pub fn basis_pairs_by_perp(&self) -> BTreeMap<InstrumentId, InstrumentId> {
        self.basis_pairs
            .iter()
            .map(|p| (p.perp.clone(), p.spot.clone()))
            .collect()
    }

    /// Definitions keyed by alert type, with the key folded into the record.
    pub fn alert_definitions(&self) -> BTreeMap<String, AlertDefinition> {
        self.alerts
            .definitions
            .iter()
            .map(|(alert_type, spec)| (alert_type.clone(), spec.to_definition(alert_type)))
            .collect()
    }

    /// Per-instrument thresholds keyed by alert type; `*` is the wildcard
    /// fallback consulted when an instrument has no specific entry.
    pub fn alert_thresholds(&self) -> BTreeMap<String, BTreeMap<String, AlertThreshold>> {
        self.alerts.thresholds.clone()
    }
}

fn load_doc<C: serde::de::DeserializeOwned + std::fmt::Debug>(
    dir: &Path,
    filename: &str,
) -> Result<C> {
    common::load_yaml_file(dir.join(filename))
        .with_context(|| format!("loading {}", dir.join(filename).display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config_dir() -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("exchanges.yaml"),
            r#"
exchanges:
  binance:
    enabled: true
    websocket:
      futures: wss://fstream.binance.com/stream
      spot: wss://stream.binance.com:9443/stream
    rest:
      futures: https://fapi.binance.com
      spot: https://api.binance.com
    connection:
      rate_limit_per_second: 10
      reconnect_delay_seconds: 1
      max_reconnect_attempts: 10
      ping_interval_seconds: 30
      ping_timeout_seconds: 10
    streams:
      orderbook_depth: 20
      orderbook_speed: 100ms
  okx:
    enabled: true
    websocket:
      public: wss://ws.okx.com:8443/ws/v5/public
    rest:
      public: https://www.okx.com
    connection:
      rate_limit_per_second: 5
      reconnect_delay_seconds: 1
      max_reconnect_attempts: 10
      ping_interval_seconds: 25
      ping_timeout_seconds: 10
    streams:
      orderbook_depth: 20
      orderbook_channel: books
"#,
        )?;
        fs::write(
            dir.path().join("instruments.yaml"),
            r#"
instruments:
  - id: BTC-USDT-PERP
    name: Bitcoin USDT Perpetual
    type: perpetual
    base: BTC
    quote: USDT
    enabled: true
    depth_levels: 20
    venue_symbols:
      binance:
        symbol: BTCUSDT
        stream: btcusdt@depth20@100ms
        ticker_stream: btcusdt@ticker
        mark_price_stream: btcusdt@markPrice
      okx:
        symbol: BTC-USDT-SWAP
        stream: books
        inst_type: SWAP
  - id: BTC-USDT-SPOT
    name: Bitcoin USDT Spot
    type: spot
    base: BTC
    quote: USDT
    enabled: true
    depth_levels: 20
    venue_symbols:
      binance:
        symbol: BTCUSDT
        stream: btcusdt@depth20@100ms
      okx:
        symbol: BTC-USDT
        stream: books
        inst_type: SPOT
basis_pairs:
  - perp: BTC-USDT-PERP
    spot: BTC-USDT-SPOT
"#,
        )?;
        fs::write(
            dir.path().join("alerts.yaml"),
            r##"
alerts:
  global:
    throttle_seconds: 60
    dedup_window_seconds: 300
    auto_resolve: true
  priorities:
    P1:
      channels: [console, webhook]
      color: "#e01e5a"
    P2:
      channels: [console, webhook]
      escalation_seconds: 300
      color: "#ecb22e"
    P3:
      channels: [console]
      color: "#36c5f0"
  definitions:
    spread_warning:
      name: Spread Warning
      metric_name: spread_bps
      default_priority: P2
      default_severity: warning
      condition: gt
      requires_zscore: true
      throttle_seconds: 60
    basis_warning:
      name: Basis Warning
      metric_name: basis_bps
      default_priority: P2
      default_severity: warning
      condition: abs_gt
      requires_zscore: true
      persistence_seconds: 120
  thresholds:
    BTC-USDT-PERP:
      spread_warning:
        threshold: "3.0"
        zscore_threshold: "2.0"
      basis_warning:
        threshold: "10.0"
        zscore_threshold: "2.5"
    "*":
      spread_warning:
        threshold: "5.0"
        zscore_threshold: "2.0"
  channels:
    console:
      format: structured
    webhook:
      enabled: true
      channel: "#market-ops"
"##,
        )?;
        fs::write(
            dir.path().join("features.yaml"),
            r#"
features:
  zscore:
    enabled: true
    window_size: 300
    min_samples: 30
    min_std: "0.0001"
    warmup_log_interval: 10
    reset_on_gap: true
    reset_on_gap_threshold_seconds: 5
  gap_handling:
    mark_gaps: true
    gap_threshold_seconds: 5
    alert_on_gap: false
    track_sequence_ids: true
  data_capture:
    realtime_interval_ms: 100
    storage_interval_seconds: 1
    depth_levels: 20
  storage:
    kv:
      current_state_ttl_seconds: 300
      zscore_buffer_ttl_seconds: 3600
      alert_dedup_ttl_seconds: 86400
    tsdb:
      retention_days:
        order_book_snapshots: 30
        metrics: 90
        basis_metrics: 90
        alerts: 365
        data_gaps: 90
      compress_after_days: 7
  logging:
    format: text
    level: info
"#,
        )?;
        Ok(dir)
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = write_config_dir()?;
        let config = AppConfig::load(dir.path())?;

        assert_eq!(config.enabled_exchanges().count(), 2);
        assert_eq!(config.enabled_instruments().count(), 2);

        let pairs = config.basis_pairs_by_perp();
        assert_eq!(
            pairs.get(&InstrumentId::new("BTC-USDT-PERP")),
            Some(&InstrumentId::new("BTC-USDT-SPOT"))
        );

        let definitions = config.alert_definitions();
        let spread = &definitions["spread_warning"];
        assert_eq!(spread.alert_type, "spread_warning");
        assert!(spread.requires_zscore);
        assert_eq!(spread.throttle_seconds, 60);
        let basis = &definitions["basis_warning"];
        assert_eq!(basis.persistence_seconds, Some(120));

        let thresholds = config.alert_thresholds();
        assert!(thresholds.contains_key("BTC-USDT-PERP"));
        assert!(thresholds.contains_key("*"));

        assert_eq!(config.features.zscore.window_size, 300);
        assert_eq!(config.features.zscore.min_samples, 30);
        Ok(())
    }

    #[test]
    fn test_unknown_basis_pair_is_fatal() -> Result<()> {
        let dir = write_config_dir()?;
        let instruments = dir.path().join("instruments.yaml");
        let raw = fs::read_to_string(&instruments)?;
        fs::write(
            &instruments,
            raw.replace("spot: BTC-USDT-SPOT", "spot: ETH-USDT-SPOT"),
        )?;
        assert!(AppConfig::load(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_threshold_for_unknown_alert_type_is_fatal() -> Result<()> {
        let dir = write_config_dir()?;
        let alerts = dir.path().join("alerts.yaml");
        let raw = fs::read_to_string(&alerts)?;
        fs::write(&alerts, raw.replace("spread_warning:\n        threshold: \"5.0\"", "depth_drop:\n        threshold: \"5.0\""))?;
        assert!(AppConfig::load(dir.path()).is_err());
        Ok(())
    }
}
