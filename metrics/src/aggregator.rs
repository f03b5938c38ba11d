//! Per-instrument facade over the individual calculators.

use rust_decimal::Decimal;
use surveil_model::{AggregatedMetrics, BasisMetrics, ImbalanceMetrics, OrderBookSnapshot};
use tracing::info;

use crate::basis::BasisCalculator;
use crate::depth::{imbalance_ratio, DepthCalculator, DEFAULT_REFERENCE_BAND_BPS};
use crate::spread::SpreadCalculator;
use crate::zscore::{ZScoreCalculator, ZScoreConfigError};
use crate::{MetricError, ZScoreStatus};

/// Warmup visibility per z-score-bearing metric.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorZScoreStatuses {
    pub spread: Option<ZScoreStatus>,
    pub basis: Option<ZScoreStatus>,
}

pub struct MetricsAggregator {
    spread_calc: SpreadCalculator,
    depth_calc: DepthCalculator,
    basis_calc: BasisCalculator,
}

impl MetricsAggregator {
    pub fn new(
        use_zscore: bool,
        zscore_window: usize,
        zscore_min_samples: usize,
        zscore_min_std: Decimal,
    ) -> Result<Self, ZScoreConfigError> {
        let make_zscore = || -> Result<Option<ZScoreCalculator>, ZScoreConfigError> {
            if use_zscore {
                Ok(Some(ZScoreCalculator::new(
                    zscore_window,
                    zscore_min_samples,
                    zscore_min_std,
                )?))
            } else {
                Ok(None)
            }
        };
        Ok(Self {
            spread_calc: SpreadCalculator::new(make_zscore()?),
            depth_calc: DepthCalculator::new(DEFAULT_REFERENCE_BAND_BPS),
            basis_calc: BasisCalculator::new(make_zscore()?),
        })
    }

    /// Computes the full metrics package for one snapshot. Basis is present
    /// only when a spot snapshot is supplied.
    pub fn calculate_all(
        &mut self,
        perp: &OrderBookSnapshot,
        spot: Option<&OrderBookSnapshot>,
    ) -> Result<AggregatedMetrics, MetricError> {
        if !perp.is_valid() {
            return Err(MetricError::EmptySide(perp.instrument.clone()));
        }

        let spread = self.spread_calc.calculate(perp)?;
        let depth = self.depth_calc.calculate(perp)?;
        let imbalance = calculate_imbalance(perp);

        let basis: Option<BasisMetrics> = match spot {
            Some(spot) => Some(self.basis_calc.calculate(perp, spot)?),
            None => None,
        };

        Ok(AggregatedMetrics {
            venue: perp.venue,
            instrument: perp.instrument.clone(),
            timestamp: perp.timestamp,
            spread,
            depth,
            basis,
            imbalance,
        })
    }

    /// Clears every z-score buffer for this instrument in one shot.
    pub fn reset_all_zscores(&mut self, reason: &str) {
        info!(reason, "resetting all zscore buffers");
        self.spread_calc.reset_zscore(reason);
        self.basis_calc.reset_zscore(reason);
    }

    pub fn zscore_statuses(&self) -> AggregatorZScoreStatuses {
        AggregatorZScoreStatuses {
            spread: self.spread_calc.zscore_status(),
            basis: self.basis_calc.zscore_status(),
        }
    }
}

/// Imbalance at three scopes: top-of-book by quantity, notional-weighted
/// across the top 5 and top 10 levels.
fn calculate_imbalance(snapshot: &OrderBookSnapshot) -> ImbalanceMetrics {
    let best_bid_qty = snapshot.best_bid_quantity().unwrap_or(Decimal::ZERO);
    let best_ask_qty = snapshot.best_ask_quantity().unwrap_or(Decimal::ZERO);

    ImbalanceMetrics {
        top_of_book: imbalance_ratio(best_bid_qty, best_ask_qty),
        weighted_5: weighted_imbalance(snapshot, 5),
        weighted_10: weighted_imbalance(snapshot, 10),
    }
}

fn weighted_imbalance(snapshot: &OrderBookSnapshot, levels: usize) -> Decimal {
    let bid_notional: Decimal = snapshot.bids.iter().take(levels).map(|l| l.notional()).sum();
    let ask_notional: Decimal = snapshot.asks.iter().take(levels).map(|l| l.notional()).sum();
    imbalance_ratio(bid_notional, ask_notional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use surveil_model::{PriceLevel, Venue};

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn perp(seq: u64, bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            ts(seq as u32),
            ts(seq as u32),
            seq,
            vec![
                PriceLevel::new(bid, dec!(2)),
                PriceLevel::new(bid - dec!(10), dec!(3)),
            ],
            vec![
                PriceLevel::new(ask, dec!(1)),
                PriceLevel::new(ask + dec!(10), dec!(4)),
            ],
            20,
        )
        .unwrap()
    }

    fn spot(seq: u64) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-SPOT".into(),
            ts(seq as u32),
            ts(seq as u32),
            seq,
            vec![PriceLevel::new(dec!(49999.5), dec!(1))],
            vec![PriceLevel::new(dec!(50000.5), dec!(1))],
            20,
        )
        .unwrap()
    }

    fn aggregator() -> MetricsAggregator {
        MetricsAggregator::new(true, 300, 30, dec!(0.0001)).unwrap()
    }

    #[test]
    fn test_basis_present_iff_spot_supplied() -> eyre::Result<()> {
        let mut agg = aggregator();
        let with_spot = agg.calculate_all(&perp(1, dec!(50049.5), dec!(50050.5)), Some(&spot(1)))?;
        assert!(with_spot.has_basis());
        assert_eq!(with_spot.basis.as_ref().unwrap().basis_bps, dec!(10.0));

        let without = agg.calculate_all(&perp(2, dec!(50049.5), dec!(50050.5)), None)?;
        assert!(!without.has_basis());
        Ok(())
    }

    #[test]
    fn test_top_of_book_imbalance_by_quantity() -> eyre::Result<()> {
        let mut agg = aggregator();
        let metrics = agg.calculate_all(&perp(1, dec!(50000), dec!(50001)), None)?;
        // best bid qty 2, best ask qty 1 -> (2-1)/(2+1)
        assert_eq!(
            metrics.imbalance.top_of_book,
            dec!(1) / dec!(3)
        );
        Ok(())
    }

    #[test]
    fn test_weighted_imbalance_uses_notional() -> eyre::Result<()> {
        let mut agg = aggregator();
        let snapshot = perp(1, dec!(50000), dec!(50001));
        let metrics = agg.calculate_all(&snapshot, None)?;
        let bid_notional: Decimal = snapshot.bids.iter().map(|l| l.notional()).sum();
        let ask_notional: Decimal = snapshot.asks.iter().map(|l| l.notional()).sum();
        assert_eq!(
            metrics.imbalance.weighted_5,
            (bid_notional - ask_notional) / (bid_notional + ask_notional)
        );
        Ok(())
    }

    #[test]
    fn test_reset_all_clears_warmup() -> eyre::Result<()> {
        let mut agg = MetricsAggregator::new(true, 300, 3, dec!(0.0001)).unwrap();
        for i in 0..5 {
            let jitter = Decimal::from(i);
            agg.calculate_all(
                &perp(i, dec!(50000) - jitter, dec!(50001) + jitter),
                Some(&spot(i)),
            )?;
        }
        assert!(agg.zscore_statuses().spread.unwrap().is_ready);

        agg.reset_all_zscores("regime_change");
        let statuses = agg.zscore_statuses();
        assert_eq!(statuses.spread.unwrap().samples_collected, 0);
        assert_eq!(statuses.basis.unwrap().samples_collected, 0);
        Ok(())
    }

    #[test]
    fn test_invalid_primary_snapshot_rejected() {
        let ts0 = ts(0);
        let empty = OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            ts0,
            ts0,
            1,
            vec![],
            vec![],
            20,
        )
        .unwrap();
        let mut agg = aggregator();
        assert!(matches!(
            agg.calculate_all(&empty, None),
            Err(MetricError::EmptySide(_))
        ));
    }
}
