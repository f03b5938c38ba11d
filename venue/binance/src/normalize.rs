//! Conversion of Binance wire messages into the canonical snapshot model.
//! Zero-quantity levels are dropped before sorting; construction enforces
//! the ordering and crossed-book invariants.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use surveil_model::{BookError, InstrumentId, OrderBookSnapshot, PriceLevel, Venue};

use crate::msg::{DepthUpdateMessage, PartialDepthMessage, RestDepthResponse};

pub fn epoch_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Prepares one side: drops empty levels, sorts best-first.
fn prepare_levels(raw: Vec<(Decimal, Decimal)>, descending: bool) -> Vec<PriceLevel> {
    let mut levels: Vec<PriceLevel> = raw
        .into_iter()
        .filter(|(_, quantity)| *quantity != Decimal::ZERO)
        .map(|(price, quantity)| PriceLevel::new(price, quantity))
        .collect();
    if descending {
        levels.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.cmp(&b.price));
    }
    levels
}

/// Futures diff-depth event: server event time is carried, the final
/// update id `u` becomes the sequence id.
pub fn normalize_depth_update(
    msg: DepthUpdateMessage,
    instrument: InstrumentId,
    local_timestamp: DateTime<Utc>,
    depth_levels: u16,
) -> Result<OrderBookSnapshot, BookError> {
    OrderBookSnapshot::new(
        Venue::Binance,
        instrument,
        epoch_millis(msg.E),
        local_timestamp,
        msg.u,
        prepare_levels(msg.b, true),
        prepare_levels(msg.a, false),
        depth_levels,
    )
}

/// Spot partial depth: no server time on the wire, so the local receipt
/// time stands in for both timestamps.
pub fn normalize_partial_depth(
    msg: PartialDepthMessage,
    instrument: InstrumentId,
    local_timestamp: DateTime<Utc>,
    depth_levels: u16,
) -> Result<OrderBookSnapshot, BookError> {
    OrderBookSnapshot::new(
        Venue::Binance,
        instrument,
        local_timestamp,
        local_timestamp,
        msg.last_update_id,
        prepare_levels(msg.bids, true),
        prepare_levels(msg.asks, false),
        depth_levels,
    )
}

pub fn normalize_rest_depth(
    msg: RestDepthResponse,
    instrument: InstrumentId,
    local_timestamp: DateTime<Utc>,
    depth_levels: u16,
) -> Result<OrderBookSnapshot, BookError> {
    OrderBookSnapshot::new(
        Venue::Binance,
        instrument,
        local_timestamp,
        local_timestamp,
        msg.last_update_id,
        prepare_levels(msg.bids, true),
        prepare_levels(msg.asks, false),
        depth_levels,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn local() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_zero_quantity_levels_dropped() -> eyre::Result<()> {
        let msg = DepthUpdateMessage {
            E: 1700000000000,
            s: "BTCUSDT".to_string(),
            U: 100,
            u: 105,
            b: vec![
                (dec!(50000), dec!(1)),
                (dec!(49999), dec!(0)), // deletion marker, must not survive
            ],
            a: vec![(dec!(50001), dec!(2))],
        };
        let snapshot =
            normalize_depth_update(msg, "BTC-USDT-PERP".into(), local(), 20)?;
        assert_eq!(snapshot.bids.len(), 1);
        assert_eq!(snapshot.sequence_id, 105);
        assert_eq!(snapshot.timestamp, epoch_millis(1700000000000));
        assert_eq!(snapshot.local_timestamp, local());
        Ok(())
    }

    #[test]
    fn test_unsorted_wire_levels_are_sorted() -> eyre::Result<()> {
        let msg = PartialDepthMessage {
            last_update_id: 7,
            bids: vec![(dec!(49998), dec!(1)), (dec!(50000), dec!(1)), (dec!(49999), dec!(1))],
            asks: vec![(dec!(50003), dec!(1)), (dec!(50001), dec!(1))],
        };
        let snapshot =
            normalize_partial_depth(msg, "BTC-USDT-SPOT".into(), local(), 20)?;
        assert_eq!(snapshot.best_bid(), Some(dec!(50000)));
        assert_eq!(snapshot.best_ask(), Some(dec!(50001)));
        // spot partial depth has no server time: local time substitutes
        assert_eq!(snapshot.timestamp, snapshot.local_timestamp);
        Ok(())
    }

    #[test]
    fn test_crossed_wire_book_rejected() {
        let msg = PartialDepthMessage {
            last_update_id: 7,
            bids: vec![(dec!(50002), dec!(1))],
            asks: vec![(dec!(50001), dec!(1))],
        };
        assert!(normalize_partial_depth(msg, "BTC-USDT-SPOT".into(), local(), 20).is_err());
    }
}
