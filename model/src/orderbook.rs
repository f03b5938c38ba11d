//! Normalized order book snapshot shared by every venue adapter.

use chrono::{DateTime, Utc};
use parse_display::{Display, FromStr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{InstrumentId, Venue};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BookError {
    #[error("negative price {0} at level {1}")]
    NegativePrice(Decimal, usize),
    #[error("negative quantity {0} at level {1}")]
    NegativeQuantity(Decimal, usize),
    #[error("bids must be sorted strictly descending: {0} then {1}")]
    BidsUnsorted(Decimal, Decimal),
    #[error("asks must be sorted strictly ascending: {0} then {1}")]
    AsksUnsorted(Decimal, Decimal),
    #[error("crossed order book: best bid {0} >= best ask {1}")]
    CrossedBook(Decimal, Decimal),
}

/// Single resting price level. The notional is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Unified snapshot every adapter normalizes into. Construction enforces
/// the ordering invariants; a crossed or unsorted book never enters the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: Venue,
    pub instrument: InstrumentId,
    /// Exchange-provided event time (UTC). For wire formats without a
    /// server timestamp this equals `local_timestamp`.
    pub timestamp: DateTime<Utc>,
    /// Local receipt time (UTC); authoritative for lag and gap durations.
    pub local_timestamp: DateTime<Utc>,
    pub sequence_id: u64,
    /// Best (highest price) first.
    pub bids: Vec<PriceLevel>,
    /// Best (lowest price) first.
    pub asks: Vec<PriceLevel>,
    pub depth_levels: u16,
}

impl OrderBookSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Venue,
        instrument: InstrumentId,
        timestamp: DateTime<Utc>,
        local_timestamp: DateTime<Utc>,
        sequence_id: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        depth_levels: u16,
    ) -> Result<Self, BookError> {
        validate_levels(&bids, Side::Bid)?;
        validate_levels(&asks, Side::Ask)?;
        if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
            if bid.price >= ask.price {
                return Err(BookError::CrossedBook(bid.price, ask.price));
            }
        }
        Ok(Self {
            venue,
            instrument,
            timestamp,
            local_timestamp,
            sequence_id,
            bids,
            asks,
            depth_levels,
        })
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn best_bid_quantity(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.quantity)
    }

    pub fn best_ask_quantity(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.quantity)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn spread_bps(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let mid = self.mid_price()?;
        if mid <= Decimal::ZERO {
            return None;
        }
        Some(spread / mid * Decimal::from(10_000))
    }

    /// Both sides non-empty; the precondition for metric calculation.
    pub fn is_valid(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    pub fn total_bid_notional(&self) -> Decimal {
        self.bids.iter().map(|l| l.notional()).sum()
    }

    pub fn total_ask_notional(&self) -> Decimal {
        self.asks.iter().map(|l| l.notional()).sum()
    }

    /// Notional resting within `bps` of mid on one side. Levels are sorted
    /// best-first, so accumulation stops at the first out-of-band level.
    pub fn depth_at_bps(&self, bps: u32, side: Side) -> Decimal {
        let Some(mid) = self.mid_price() else {
            return Decimal::ZERO;
        };
        let band = Decimal::from(bps) / Decimal::from(10_000);
        let mut total = Decimal::ZERO;
        match side {
            Side::Bid => {
                let threshold = mid * (Decimal::ONE - band);
                for level in &self.bids {
                    if level.price >= threshold {
                        total += level.notional();
                    } else {
                        break;
                    }
                }
            }
            Side::Ask => {
                let threshold = mid * (Decimal::ONE + band);
                for level in &self.asks {
                    if level.price <= threshold {
                        total += level.notional();
                    } else {
                        break;
                    }
                }
            }
        }
        total
    }
}

fn validate_levels(levels: &[PriceLevel], side: Side) -> Result<(), BookError> {
    for (i, level) in levels.iter().enumerate() {
        if level.price < Decimal::ZERO {
            return Err(BookError::NegativePrice(level.price, i));
        }
        if level.quantity < Decimal::ZERO {
            return Err(BookError::NegativeQuantity(level.quantity, i));
        }
    }
    for pair in levels.windows(2) {
        match side {
            Side::Bid if pair[0].price <= pair[1].price => {
                return Err(BookError::BidsUnsorted(pair[0].price, pair[1].price));
            }
            Side::Ask if pair[0].price >= pair[1].price => {
                return Err(BookError::AsksUnsorted(pair[0].price, pair[1].price));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap()
    }

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel::new(price, quantity)
    }

    fn snapshot(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Result<OrderBookSnapshot, BookError> {
        OrderBookSnapshot::new(
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            ts(),
            ts(),
            100,
            bids,
            asks,
            20,
        )
    }

    #[test]
    fn test_notional_is_derived() {
        let l = level(dec!(50000.00), dec!(1.5));
        assert_eq!(l.notional(), dec!(75000.000));
    }

    #[test]
    fn test_valid_book_prices() -> eyre::Result<()> {
        let book = snapshot(
            vec![level(dec!(50000), dec!(1)), level(dec!(49999), dec!(2))],
            vec![level(dec!(50001), dec!(1)), level(dec!(50002), dec!(2))],
        )?;
        assert_eq!(book.best_bid(), Some(dec!(50000)));
        assert_eq!(book.best_ask(), Some(dec!(50001)));
        assert_eq!(book.mid_price(), Some(dec!(50000.5)));
        assert_eq!(book.spread(), Some(dec!(1)));
        assert!(book.is_valid());
        Ok(())
    }

    #[test]
    fn test_spread_bps_formula() -> eyre::Result<()> {
        let book = snapshot(
            vec![level(dec!(49999.5), dec!(1))],
            vec![level(dec!(50000.5), dec!(1))],
        )?;
        // spread 1.0, mid 50000 -> 0.2 bps
        assert_eq!(book.spread_bps(), Some(dec!(0.2)));
        Ok(())
    }

    #[test]
    fn test_crossed_book_rejected() {
        let err = snapshot(
            vec![level(dec!(50001), dec!(1))],
            vec![level(dec!(50000), dec!(1))],
        )
        .unwrap_err();
        assert_eq!(err, BookError::CrossedBook(dec!(50001), dec!(50000)));
    }

    #[test]
    fn test_touching_book_rejected() {
        // equal best bid and ask is also a crossed book
        assert!(snapshot(
            vec![level(dec!(50000), dec!(1))],
            vec![level(dec!(50000), dec!(1))],
        )
        .is_err());
    }

    #[test]
    fn test_unsorted_bids_rejected() {
        let err = snapshot(
            vec![level(dec!(49999), dec!(1)), level(dec!(50000), dec!(1))],
            vec![level(dec!(50001), dec!(1))],
        )
        .unwrap_err();
        assert!(matches!(err, BookError::BidsUnsorted(..)));
    }

    #[test]
    fn test_unsorted_asks_rejected() {
        let err = snapshot(
            vec![level(dec!(50000), dec!(1))],
            vec![level(dec!(50002), dec!(1)), level(dec!(50001), dec!(1))],
        )
        .unwrap_err();
        assert!(matches!(err, BookError::AsksUnsorted(..)));
    }

    #[test]
    fn test_negative_price_rejected() {
        let err = snapshot(vec![level(dec!(-1), dec!(1))], vec![]).unwrap_err();
        assert!(matches!(err, BookError::NegativePrice(..)));
    }

    #[test]
    fn test_one_sided_book_allowed() -> eyre::Result<()> {
        let book = snapshot(vec![level(dec!(50000), dec!(1))], vec![])?;
        assert!(!book.is_valid());
        assert_eq!(book.mid_price(), None);
        assert_eq!(book.spread_bps(), None);
        Ok(())
    }

    #[test]
    fn test_depth_at_bps_half_band() -> eyre::Result<()> {
        // mid = 50000; 10 bps band = 50 => bid threshold 49950, ask threshold 50050
        let book = snapshot(
            vec![
                level(dec!(49999), dec!(1)),  // in band
                level(dec!(49960), dec!(2)),  // in band
                level(dec!(49940), dec!(10)), // out of band, stops accumulation
                level(dec!(49930), dec!(10)),
            ],
            vec![
                level(dec!(50001), dec!(1)), // in band
                level(dec!(50060), dec!(5)), // out of band
            ],
        )?;
        let bid_depth = book.depth_at_bps(10, Side::Bid);
        assert_eq!(bid_depth, dec!(49999) + dec!(49960) * dec!(2));
        let ask_depth = book.depth_at_bps(10, Side::Ask);
        assert_eq!(ask_depth, dec!(50001));
        Ok(())
    }

    #[test]
    fn test_serde_round_trip() -> eyre::Result<()> {
        let book = snapshot(
            vec![level(dec!(50000.10), dec!(1.25))],
            vec![level(dec!(50000.90), dec!(0.75))],
        )?;
        let json = serde_json::to_string(&book)?;
        let back: OrderBookSnapshot = serde_json::from_str(&json)?;
        assert_eq!(back, book);
        Ok(())
    }
}
