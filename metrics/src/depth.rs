//! Depth-at-band calculator. Bands are half-widths around mid; totals are
//! notional (price * quantity) and terminate early on sorted levels.

use rust_decimal::Decimal;
use surveil_model::{DepthMetrics, OrderBookSnapshot, Side};

use crate::MetricError;

pub const DEPTH_BANDS_BPS: [u32; 3] = [5, 10, 25];
pub const DEFAULT_REFERENCE_BAND_BPS: u32 = 10;

pub struct DepthCalculator {
    reference_band_bps: u32,
}

impl DepthCalculator {
    pub fn new(reference_band_bps: u32) -> Self {
        Self { reference_band_bps }
    }

    pub fn calculate(&self, snapshot: &OrderBookSnapshot) -> Result<DepthMetrics, MetricError> {
        if !snapshot.is_valid() {
            return Err(MetricError::EmptySide(snapshot.instrument.clone()));
        }

        let depth_5bps_bid = snapshot.depth_at_bps(5, Side::Bid);
        let depth_5bps_ask = snapshot.depth_at_bps(5, Side::Ask);
        let depth_10bps_bid = snapshot.depth_at_bps(10, Side::Bid);
        let depth_10bps_ask = snapshot.depth_at_bps(10, Side::Ask);
        let depth_25bps_bid = snapshot.depth_at_bps(25, Side::Bid);
        let depth_25bps_ask = snapshot.depth_at_bps(25, Side::Ask);

        let (bid_ref, ask_ref) = match self.reference_band_bps {
            5 => (depth_5bps_bid, depth_5bps_ask),
            25 => (depth_25bps_bid, depth_25bps_ask),
            _ => (depth_10bps_bid, depth_10bps_ask),
        };

        Ok(DepthMetrics {
            depth_5bps_bid,
            depth_5bps_ask,
            depth_5bps_total: depth_5bps_bid + depth_5bps_ask,
            depth_10bps_bid,
            depth_10bps_ask,
            depth_10bps_total: depth_10bps_bid + depth_10bps_ask,
            depth_25bps_bid,
            depth_25bps_ask,
            depth_25bps_total: depth_25bps_bid + depth_25bps_ask,
            imbalance: imbalance_ratio(bid_ref, ask_ref),
        })
    }
}

impl Default for DepthCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_BAND_BPS)
    }
}

/// `(bid - ask) / (bid + ask)`; 0 when both sides are empty, never
/// undefined.
pub fn imbalance_ratio(bid_value: Decimal, ask_value: Decimal) -> Decimal {
    let total = bid_value + ask_value;
    if total == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (bid_value - ask_value) / total
}
