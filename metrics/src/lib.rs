pub mod aggregator;
pub mod basis;
pub mod depth;
pub mod spread;
pub mod zscore;

pub use aggregator::{AggregatorZScoreStatuses, MetricsAggregator};
pub use basis::BasisCalculator;
pub use depth::DepthCalculator;
pub use spread::SpreadCalculator;
pub use zscore::{ZScoreCalculator, ZScoreConfigError, ZScoreStatus};

use rust_decimal::Decimal;
use surveil_model::InstrumentId;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MetricError {
    #[error("snapshot for {0} has an empty bid or ask side")]
    EmptySide(InstrumentId),
    #[error("mid price {1} for {0} is not strictly positive")]
    NonPositiveMid(InstrumentId, Decimal),
    #[error("spot mid for {0} is zero, cannot compute basis bps")]
    ZeroSpotMid(InstrumentId),
}
