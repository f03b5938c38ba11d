//! Computed metric records. A missing z-score is an `Option`, never a
//! sentinel; it stays absent through warmup and flat markets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{InstrumentId, Venue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadMetrics {
    /// best_ask - best_bid, in quote currency.
    pub spread_abs: Decimal,
    /// spread_abs / mid * 10_000.
    pub spread_bps: Decimal,
    pub mid_price: Decimal,
    pub zscore: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthMetrics {
    pub depth_5bps_bid: Decimal,
    pub depth_5bps_ask: Decimal,
    pub depth_5bps_total: Decimal,
    pub depth_10bps_bid: Decimal,
    pub depth_10bps_ask: Decimal,
    pub depth_10bps_total: Decimal,
    pub depth_25bps_bid: Decimal,
    pub depth_25bps_ask: Decimal,
    pub depth_25bps_total: Decimal,
    /// (bid - ask) / (bid + ask) at the reference band, in [-1, 1].
    pub imbalance: Decimal,
}

impl DepthMetrics {
    pub fn is_bid_heavy(&self) -> bool {
        self.imbalance > Decimal::ZERO
    }

    pub fn is_ask_heavy(&self) -> bool {
        self.imbalance < Decimal::ZERO
    }
}

/// Perp-vs-spot basis. Positive means the perpetual trades at a premium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisMetrics {
    /// perp_mid - spot_mid.
    pub basis_abs: Decimal,
    /// basis_abs / spot_mid * 10_000.
    pub basis_bps: Decimal,
    pub perp_mid: Decimal,
    pub spot_mid: Decimal,
    pub zscore: Option<Decimal>,
}

impl BasisMetrics {
    pub fn is_premium(&self) -> bool {
        self.basis_abs > Decimal::ZERO
    }

    pub fn is_discount(&self) -> bool {
        self.basis_abs < Decimal::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceMetrics {
    /// Best bid/ask quantities only.
    pub top_of_book: Decimal,
    /// Notional-weighted across the top 5 levels.
    pub weighted_5: Decimal,
    /// Notional-weighted across the top 10 levels.
    pub weighted_10: Decimal,
}

/// Complete metrics package computed per order book update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub spread: SpreadMetrics,
    pub depth: DepthMetrics,
    /// Present iff the instrument is a perpetual with a configured spot
    /// counterpart and a current spot snapshot existed.
    pub basis: Option<BasisMetrics>,
    pub imbalance: ImbalanceMetrics,
}

impl AggregatedMetrics {
    pub fn has_basis(&self) -> bool {
        self.basis.is_some()
    }

    /// Extracts a named metric value for alert evaluation; absent when the
    /// metric does not apply to this record.
    pub fn metric_value(&self, metric_name: &str) -> Option<Decimal> {
        match metric_name {
            "spread_bps" => Some(self.spread.spread_bps),
            "spread_abs" => Some(self.spread.spread_abs),
            "basis_bps" => self.basis.as_ref().map(|b| b.basis_bps),
            "basis_abs" => self.basis.as_ref().map(|b| b.basis_abs),
            "depth_5bps_total" => Some(self.depth.depth_5bps_total),
            "depth_10bps_total" => Some(self.depth.depth_10bps_total),
            "depth_25bps_total" => Some(self.depth.depth_25bps_total),
            "imbalance" => Some(self.imbalance.top_of_book),
            _ => None,
        }
    }

    /// Z-score for a named metric; only spread and basis carry one.
    pub fn metric_zscore(&self, metric_name: &str) -> Option<Decimal> {
        match metric_name {
            "spread_bps" | "spread_abs" => self.spread.zscore,
            "basis_bps" | "basis_abs" => self.basis.as_ref().and_then(|b| b.zscore),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> AggregatedMetrics {
        AggregatedMetrics {
            venue: Venue::Binance,
            instrument: "BTC-USDT-PERP".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap(),
            spread: SpreadMetrics {
                spread_abs: dec!(5.00),
                spread_bps: dec!(1.0),
                mid_price: dec!(50000.00),
                zscore: Some(dec!(0.5)),
            },
            depth: DepthMetrics {
                depth_5bps_bid: dec!(250000),
                depth_5bps_ask: dec!(200000),
                depth_5bps_total: dec!(450000),
                depth_10bps_bid: dec!(500000),
                depth_10bps_ask: dec!(450000),
                depth_10bps_total: dec!(950000),
                depth_25bps_bid: dec!(1000000),
                depth_25bps_ask: dec!(900000),
                depth_25bps_total: dec!(1900000),
                imbalance: dec!(0.05),
            },
            basis: None,
            imbalance: ImbalanceMetrics {
                top_of_book: dec!(0.15),
                weighted_5: dec!(0.10),
                weighted_10: dec!(0.08),
            },
        }
    }

    #[test]
    fn test_metric_value_lookup() {
        let metrics = sample();
        assert_eq!(metrics.metric_value("spread_bps"), Some(dec!(1.0)));
        assert_eq!(metrics.metric_value("depth_10bps_total"), Some(dec!(950000)));
        assert_eq!(metrics.metric_value("imbalance"), Some(dec!(0.15)));
        // no basis configured -> absent, not zero
        assert_eq!(metrics.metric_value("basis_bps"), None);
        assert_eq!(metrics.metric_value("unknown"), None);
    }

    #[test]
    fn test_metric_zscore_lookup() {
        let mut metrics = sample();
        assert_eq!(metrics.metric_zscore("spread_bps"), Some(dec!(0.5)));
        assert_eq!(metrics.metric_zscore("basis_bps"), None);
        assert_eq!(metrics.metric_zscore("depth_10bps_total"), None);

        metrics.basis = Some(BasisMetrics {
            basis_abs: dec!(50),
            basis_bps: dec!(10),
            perp_mid: dec!(50050),
            spot_mid: dec!(50000),
            zscore: Some(dec!(1.5)),
        });
        assert_eq!(metrics.metric_zscore("basis_bps"), Some(dec!(1.5)));
        assert!(metrics.has_basis());
        assert!(metrics.basis.as_ref().unwrap().is_premium());
    }
}
