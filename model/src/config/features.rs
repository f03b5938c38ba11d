use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use common::{LogFormat, LogLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesFile {
    pub features: FeaturesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    pub zscore: ZScoreConfig,
    pub gap_handling: GapHandlingConfig,
    pub data_capture: DataCaptureConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_min_std")]
    pub min_std: Decimal,
    /// Log warmup progress at most every N samples.
    #[serde(default = "default_warmup_log_interval")]
    pub warmup_log_interval: usize,
    #[serde(default = "default_true")]
    pub reset_on_gap: bool,
    #[serde(default = "default_gap_threshold")]
    pub reset_on_gap_threshold_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_window_size() -> usize {
    300
}
fn default_min_samples() -> usize {
    30
}
fn default_min_std() -> Decimal {
    dec!(0.0001)
}
fn default_warmup_log_interval() -> usize {
    10
}
fn default_gap_threshold() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapHandlingConfig {
    #[serde(default = "default_true")]
    pub mark_gaps: bool,
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_seconds: u64,
    #[serde(default)]
    pub alert_on_gap: bool,
    #[serde(default = "default_true")]
    pub track_sequence_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCaptureConfig {
    #[serde(default = "default_realtime_interval")]
    pub realtime_interval_ms: u64,
    /// Snapshot sampling cadence into the time-series store.
    #[serde(default = "default_storage_interval")]
    pub storage_interval_seconds: u64,
    #[serde(default = "default_depth_levels")]
    pub depth_levels: u16,
}

fn default_realtime_interval() -> u64 {
    100
}
fn default_storage_interval() -> u64 {
    1
}
fn default_depth_levels() -> u16 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kv: KvStorageConfig,
    pub tsdb: TsdbStorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvStorageConfig {
    #[serde(default = "default_current_state_ttl")]
    pub current_state_ttl_seconds: u64,
    #[serde(default = "default_zscore_ttl")]
    pub zscore_buffer_ttl_seconds: u64,
    #[serde(default = "default_dedup_ttl")]
    pub alert_dedup_ttl_seconds: u64,
}

fn default_current_state_ttl() -> u64 {
    300
}
fn default_zscore_ttl() -> u64 {
    3600
}
fn default_dedup_ttl() -> u64 {
    86400
}

impl Default for KvStorageConfig {
    fn default() -> Self {
        Self {
            current_state_ttl_seconds: default_current_state_ttl(),
            zscore_buffer_ttl_seconds: default_zscore_ttl(),
            alert_dedup_ttl_seconds: default_dedup_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsdbStorageConfig {
    /// table name -> retention in days.
    #[serde(default)]
    pub retention_days: BTreeMap<String, u32>,
    #[serde(default = "default_compress_after")]
    pub compress_after_days: u32,
}

fn default_compress_after() -> u32 {
    7
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_defaults() -> eyre::Result<()> {
        let config: ZScoreConfig = serde_yaml::from_str("{}")?;
        assert!(config.enabled);
        assert_eq!(config.window_size, 300);
        assert_eq!(config.min_samples, 30);
        assert_eq!(config.min_std, dec!(0.0001));
        assert!(config.reset_on_gap);
        Ok(())
    }

    #[test]
    fn test_kv_storage_ttls() -> eyre::Result<()> {
        let config: KvStorageConfig = serde_yaml::from_str("current_state_ttl_seconds: 120")?;
        assert_eq!(config.current_state_ttl_seconds, 120);
        assert_eq!(config.zscore_buffer_ttl_seconds, 3600);
        assert_eq!(config.alert_dedup_ttl_seconds, 86400);
        Ok(())
    }
}
