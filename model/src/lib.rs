pub mod alert;
pub mod config;
pub mod health;
pub mod instrument;
pub mod metrics;
pub mod orderbook;
pub mod ticker;

pub use config::AppConfig;

pub use alert::{
    condition_key, Alert, AlertCondition, AlertDefinition, AlertPriority, AlertResult,
    AlertSeverity, AlertThreshold, ResolutionKind,
};
pub use health::{ConnectionStatus, GapMarker, GapReason, HealthStatus, ZScoreWarmupStatus};
pub use instrument::{InstrumentId, InstrumentKind, Venue};
pub use metrics::{
    AggregatedMetrics, BasisMetrics, DepthMetrics, ImbalanceMetrics, SpreadMetrics,
};
pub use orderbook::{BookError, OrderBookSnapshot, PriceLevel, Side};
pub use ticker::TickerSnapshot;
