//! Bid-ask spread calculator.

use rust_decimal::Decimal;
use surveil_model::{OrderBookSnapshot, SpreadMetrics};

use crate::zscore::ZScoreCalculator;
use crate::MetricError;

pub struct SpreadCalculator {
    zscore: Option<ZScoreCalculator>,
}

impl SpreadCalculator {
    pub fn new(zscore: Option<ZScoreCalculator>) -> Self {
        Self { zscore }
    }

    /// `mid = (B + A) / 2`, `spread_abs = A - B`,
    /// `spread_bps = spread_abs / mid * 10_000`. The z-score tracks
    /// `spread_bps` and stays absent through warmup.
    pub fn calculate(&mut self, snapshot: &OrderBookSnapshot) -> Result<SpreadMetrics, MetricError> {
        let (Some(best_bid), Some(best_ask)) = (snapshot.best_bid(), snapshot.best_ask()) else {
            return Err(MetricError::EmptySide(snapshot.instrument.clone()));
        };
        let mid_price = (best_bid + best_ask) / Decimal::TWO;
        if mid_price <= Decimal::ZERO {
            return Err(MetricError::NonPositiveMid(
                snapshot.instrument.clone(),
                mid_price,
            ));
        }
        let spread_abs = best_ask - best_bid;
        let spread_bps = spread_abs / mid_price * Decimal::from(10_000);

        let zscore = self
            .zscore
            .as_mut()
            .and_then(|calc| calc.add_sample(spread_bps, snapshot.timestamp));

        Ok(SpreadMetrics {
            spread_abs,
            spread_bps,
            mid_price,
            zscore,
        })
    }

    pub fn reset_zscore(&mut self, reason: &str) {
        if let Some(calc) = self.zscore.as_mut() {
            calc.reset(reason);
        }
    }

    pub fn zscore_status(&self) -> Option<crate::ZScoreStatus> {
        self.zscore.as_ref().map(|c| c.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use surveil_model::{PriceLevel, Venue};

    fn book(bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
        let ts = Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap();
        OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            ts,
            ts,
            1,
            vec![PriceLevel::new(bid, dec!(1))],
            vec![PriceLevel::new(ask, dec!(1))],
            20,
        )
        .unwrap()
    }

    #[test]
    fn test_spread_formulas() -> eyre::Result<()> {
        let mut calc = SpreadCalculator::new(None);
        let metrics = calc.calculate(&book(dec!(49999.5), dec!(50000.5)))?;
        assert_eq!(metrics.spread_abs, dec!(1.0));
        assert_eq!(metrics.mid_price, dec!(50000.0));
        assert_eq!(metrics.spread_bps, dec!(0.2));
        assert_eq!(metrics.zscore, None);
        Ok(())
    }

    #[test]
    fn test_spread_bps_identity() -> eyre::Result<()> {
        let mut calc = SpreadCalculator::new(None);
        let metrics = calc.calculate(&book(dec!(101), dec!(103)))?;
        // spread_bps == spread_abs / mid * 10_000 exactly
        assert_eq!(
            metrics.spread_bps,
            metrics.spread_abs / metrics.mid_price * dec!(10000)
        );
        Ok(())
    }

    #[test]
    fn test_empty_side_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap();
        let one_sided = OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            ts,
            ts,
            1,
            vec![PriceLevel::new(dec!(50000), dec!(1))],
            vec![],
            20,
        )
        .unwrap();
        let mut calc = SpreadCalculator::new(None);
        assert!(matches!(
            calc.calculate(&one_sided),
            Err(MetricError::EmptySide(_))
        ));
    }

    #[test]
    fn test_zscore_tracks_spread_bps() -> eyre::Result<()> {
        let mut calc = SpreadCalculator::new(Some(ZScoreCalculator::new(
            100,
            2,
            crate::zscore::DEFAULT_MIN_STD,
        )?));
        assert_eq!(calc.calculate(&book(dec!(100), dec!(101)))?.zscore, None);
        let second = calc.calculate(&book(dec!(100), dec!(102)))?;
        assert!(second.zscore.is_some());
        Ok(())
    }
}
