//! OKX wire data into the canonical snapshot model.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use surveil_model::{BookError, InstrumentId, OrderBookSnapshot, PriceLevel, Venue};

use crate::msg::{BookData, BookLevel, RestBookData};

pub fn epoch_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `BTC-USDT-SWAP` -> `BTC-USDT-PERP`; bare pairs are spot.
pub fn normalize_inst_id(okx_inst_id: &str) -> InstrumentId {
    match okx_inst_id.strip_suffix("-SWAP") {
        Some(pair) => InstrumentId::new(format!("{}-PERP", pair)),
        None => InstrumentId::new(format!("{}-SPOT", okx_inst_id)),
    }
}

/// Canonical id back to the venue's: `BTC-USDT-PERP` -> `BTC-USDT-SWAP`.
pub fn to_okx_inst_id(instrument: &InstrumentId) -> String {
    let id = instrument.as_str();
    if let Some(pair) = id.strip_suffix("-PERP") {
        format!("{}-SWAP", pair)
    } else if let Some(pair) = id.strip_suffix("-SPOT") {
        pair.to_string()
    } else {
        id.to_string()
    }
}

fn prepare_levels(raw: &[BookLevel], descending: bool) -> Vec<PriceLevel> {
    let mut levels: Vec<PriceLevel> = raw
        .iter()
        .filter(|l| l.1 != Decimal::ZERO)
        .map(|l| PriceLevel::new(l.0, l.1))
        .collect();
    if descending {
        levels.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.cmp(&b.price));
    }
    levels
}

pub fn normalize_book(
    data: &BookData,
    instrument: InstrumentId,
    local_timestamp: DateTime<Utc>,
    depth_levels: u16,
) -> Result<OrderBookSnapshot, BookError> {
    OrderBookSnapshot::new(
        Venue::Okx,
        instrument,
        epoch_millis(data.ts),
        local_timestamp,
        data.seq_id.max(0) as u64,
        prepare_levels(&data.bids, true),
        prepare_levels(&data.asks, false),
        depth_levels,
    )
}

pub fn normalize_rest_book(
    data: &RestBookData,
    instrument: InstrumentId,
    local_timestamp: DateTime<Utc>,
    depth_levels: u16,
) -> Result<OrderBookSnapshot, BookError> {
    OrderBookSnapshot::new(
        Venue::Okx,
        instrument,
        epoch_millis(data.ts),
        local_timestamp,
        0,
        prepare_levels(&data.bids, true),
        prepare_levels(&data.asks, false),
        depth_levels,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::BookLevel;
    use rust_decimal_macros::dec;

    #[test]
    fn test_inst_id_translation() {
        assert_eq!(
            normalize_inst_id("BTC-USDT-SWAP").as_str(),
            "BTC-USDT-PERP"
        );
        assert_eq!(normalize_inst_id("BTC-USDT").as_str(), "BTC-USDT-SPOT");
        assert_eq!(to_okx_inst_id(&"BTC-USDT-PERP".into()), "BTC-USDT-SWAP");
        assert_eq!(to_okx_inst_id(&"BTC-USDT-SPOT".into()), "BTC-USDT");
    }

    #[test]
    fn test_normalize_book_drops_zero_and_sorts() -> eyre::Result<()> {
        let data = BookData {
            bids: vec![
                BookLevel(dec!(49999), dec!(2), "0".into(), "1".into()),
                BookLevel(dec!(50000), dec!(1), "0".into(), "1".into()),
                BookLevel(dec!(49998), dec!(0), "0".into(), "0".into()),
            ],
            asks: vec![BookLevel(dec!(50001), dec!(1), "0".into(), "1".into())],
            ts: 1700000000000,
            seq_id: 42,
        };
        let snapshot = normalize_book(&data, "BTC-USDT-PERP".into(), Utc::now(), 20)?;
        assert_eq!(snapshot.bids.len(), 2);
        assert_eq!(snapshot.best_bid(), Some(dec!(50000)));
        assert_eq!(snapshot.sequence_id, 42);
        assert_eq!(snapshot.venue, Venue::Okx);
        Ok(())
    }

    #[test]
    fn test_negative_seq_clamped() -> eyre::Result<()> {
        let data = BookData {
            bids: vec![BookLevel(dec!(100), dec!(1), "0".into(), "1".into())],
            asks: vec![BookLevel(dec!(101), dec!(1), "0".into(), "1".into())],
            ts: 1700000000000,
            seq_id: -1,
        };
        let snapshot = normalize_book(&data, "BTC-USDT-PERP".into(), Utc::now(), 20)?;
        assert_eq!(snapshot.sequence_id, 0);
        Ok(())
    }
}
