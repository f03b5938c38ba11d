//! Perp-vs-spot basis calculator.

use rust_decimal::Decimal;
use surveil_model::{BasisMetrics, OrderBookSnapshot};
use tracing::warn;

use crate::zscore::ZScoreCalculator;
use crate::MetricError;

pub struct BasisCalculator {
    zscore: Option<ZScoreCalculator>,
}

impl BasisCalculator {
    pub fn new(zscore: Option<ZScoreCalculator>) -> Self {
        Self { zscore }
    }

    /// `basis_abs = perp_mid - spot_mid`,
    /// `basis_bps = basis_abs / spot_mid * 10_000`.
    ///
    /// The z-score samples |basis_bps|: the tracker watches magnitude, the
    /// raw metric keeps the sign.
    pub fn calculate(
        &mut self,
        perp: &OrderBookSnapshot,
        spot: &OrderBookSnapshot,
    ) -> Result<BasisMetrics, MetricError> {
        let perp_mid = perp
            .mid_price()
            .ok_or_else(|| MetricError::EmptySide(perp.instrument.clone()))?;
        let spot_mid = spot
            .mid_price()
            .ok_or_else(|| MetricError::EmptySide(spot.instrument.clone()))?;
        if spot_mid == Decimal::ZERO {
            return Err(MetricError::ZeroSpotMid(spot.instrument.clone()));
        }
        if perp.venue != spot.venue {
            warn!(
                perp_venue = %perp.venue,
                spot_venue = %spot.venue,
                "basis inputs come from different venues"
            );
        }

        let basis_abs = perp_mid - spot_mid;
        let basis_bps = basis_abs / spot_mid * Decimal::from(10_000);

        let zscore = self
            .zscore
            .as_mut()
            .and_then(|calc| calc.add_sample(basis_bps.abs(), perp.timestamp));

        Ok(BasisMetrics {
            basis_abs,
            basis_bps,
            perp_mid,
            spot_mid,
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

    fn book(instrument: &str, bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
        let ts = Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap();
        OrderBookSnapshot::new(
            Venue::Binance,
            instrument.into(),
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
    fn test_basis_formulas() -> eyre::Result<()> {
        let mut calc = BasisCalculator::new(None);
        let perp = book("BTC-USDT-PERP", dec!(50049.5), dec!(50050.5));
        let spot = book("BTC-USDT-SPOT", dec!(49999.5), dec!(50000.5));
        let metrics = calc.calculate(&perp, &spot)?;
        assert_eq!(metrics.perp_mid, dec!(50050.0));
        assert_eq!(metrics.spot_mid, dec!(50000.0));
        assert_eq!(metrics.basis_abs, dec!(50.0));
        assert_eq!(metrics.basis_bps, dec!(10.0));
        assert!(metrics.is_premium());
        Ok(())
    }

    #[test]
    fn test_negative_basis_keeps_sign() -> eyre::Result<()> {
        let mut calc = BasisCalculator::new(None);
        let perp = book("BTC-USDT-PERP", dec!(49949.5), dec!(49950.5));
        let spot = book("BTC-USDT-SPOT", dec!(49999.5), dec!(50000.5));
        let metrics = calc.calculate(&perp, &spot)?;
        assert_eq!(metrics.basis_abs, dec!(-50.0));
        assert_eq!(metrics.basis_bps, dec!(-10.0));
        assert!(metrics.is_discount());
        Ok(())
    }

    #[test]
    fn test_zscore_samples_magnitude() -> eyre::Result<()> {
        let mut calc = BasisCalculator::new(Some(ZScoreCalculator::new(
            100,
            2,
            crate::zscore::DEFAULT_MIN_STD,
        )?));
        let spot = book("BTC-USDT-SPOT", dec!(49999.5), dec!(50000.5));
        // alternating sign, same growing magnitude pattern
        calc.calculate(&book("BTC-USDT-PERP", dec!(50049.5), dec!(50050.5)), &spot)?;
        let negative = calc.calculate(&book("BTC-USDT-PERP", dec!(49899.5), dec!(49900.5)), &spot)?;
        // |basis| grew, so the z-score of magnitude is positive even though
        // the raw basis is negative
        assert!(negative.basis_bps < dec!(0));
        assert!(negative.zscore.unwrap() > dec!(0));
        Ok(())
    }

    #[test]
    fn test_empty_spot_side_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap();
        let perp = book("BTC-USDT-PERP", dec!(50049.5), dec!(50050.5));
        let empty_spot = OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-SPOT".into(),
            ts,
            ts,
            1,
            vec![],
            vec![],
            20,
        )
        .unwrap();
        let mut calc = BasisCalculator::new(None);
        assert!(matches!(
            calc.calculate(&perp, &empty_spot),
            Err(MetricError::EmptySide(_))
        ));
    }
}
