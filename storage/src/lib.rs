pub mod envelope;
pub mod kv;
pub mod retry;
pub mod tsdb;

pub use envelope::{
    AlertUpdate, HealthUpdate, MetricsUpdate, OrderbookUpdate, CHANNEL_ALERTS, CHANNEL_HEALTH,
    CHANNEL_METRICS, CHANNEL_ORDERBOOK,
};
pub use kv::KvStore;
pub use retry::with_retry;
pub use tsdb::{BasisRow, MetricRow, TimeSeriesStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("kv error: {0}")]
    Kv(#[from] redis::RedisError),
    #[error("tsdb error: {0}")]
    Tsdb(#[from] tokio_postgres::Error),
    #[error("tsdb pool error: {0}")]
    Pool(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
