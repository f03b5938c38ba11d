//! Ticker snapshot combining last-trade, mark and funding data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{InstrumentId, Venue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: DateTime<Utc>,
    pub last_price: Decimal,
    /// Mark price; present for perpetuals only.
    pub mark_price: Option<Decimal>,
    pub index_price: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub next_funding_time: Option<DateTime<Utc>>,
}

impl TickerSnapshot {
    pub fn is_perpetual(&self) -> bool {
        self.mark_price.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_perpetual_detection() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap();
        let mut ticker = TickerSnapshot {
            venue: Venue::Binance,
            instrument: "BTC-USDT-PERP".into(),
            timestamp: ts,
            local_timestamp: ts,
            last_price: dec!(50000),
            mark_price: Some(dec!(50001.5)),
            index_price: None,
            volume_24h: Some(dec!(12345.6)),
            funding_rate: Some(dec!(0.0001)),
            next_funding_time: None,
        };
        assert!(ticker.is_perpetual());
        ticker.mark_price = None;
        assert!(!ticker.is_perpetual());
    }
}
