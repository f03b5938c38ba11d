//! Sequence-gap policy shared by all adapters.
//!
//! Top-N partial-depth subscriptions only deliver updates touching the top
//! N levels while the venue-global sequence keeps advancing, so forward
//! jumps of any size are expected and never gaps. Only a sequence moving
//! backwards (reconnect replay) or repeating (duplicate/stale frame) is a
//! data integrity event. Time gaps are detected separately by the
//! pipeline from local inter-arrival times.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use surveil_model::{GapMarker, GapReason, InstrumentId, Venue};

pub fn detect_sequence_gap(
    venue: Venue,
    instrument: &InstrumentId,
    prev_seq: Option<u64>,
    curr_seq: u64,
    now: DateTime<Utc>,
) -> Option<GapMarker> {
    let prev = prev_seq?;
    if curr_seq > prev {
        return None;
    }
    let reason = if curr_seq < prev {
        GapReason::SequenceBackwards
    } else {
        GapReason::SequenceDuplicate
    };
    // a pure sequence event has no duration; endpoints coincide
    GapMarker::new(
        venue,
        instrument.clone(),
        now,
        now,
        Decimal::ZERO,
        reason,
        Some(prev),
        Some(curr_seq),
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap()
    }

    fn gap(prev: Option<u64>, curr: u64) -> Option<GapMarker> {
        detect_sequence_gap(Venue::Binance, &"BTC-USDT-PERP".into(), prev, curr, now())
    }

    #[test]
    fn test_first_message_is_never_a_gap() {
        assert_eq!(gap(None, 42), None);
    }

    #[test]
    fn test_forward_jumps_are_expected() {
        assert_eq!(gap(Some(100), 101), None);
        // arbitrarily large jumps are normal under partial-depth feeds
        assert_eq!(gap(Some(100), 1_000_000), None);
    }

    #[test]
    fn test_backwards_sequence_is_a_gap() {
        let marker = gap(Some(100), 90).expect("backwards must gap");
        assert_eq!(marker.reason, GapReason::SequenceBackwards);
        assert_eq!(marker.sequence_id_before, Some(100));
        assert_eq!(marker.sequence_id_after, Some(90));
    }

    #[test]
    fn test_duplicate_sequence_is_a_gap() {
        let marker = gap(Some(100), 100).expect("duplicate must gap");
        assert_eq!(marker.reason, GapReason::SequenceDuplicate);
    }

    #[test]
    fn test_only_two_reasons_ever_produced() {
        for (prev, curr) in [(Some(5u64), 1u64), (Some(5), 5), (Some(5), 4)] {
            let marker = gap(prev, curr).unwrap();
            assert!(matches!(
                marker.reason,
                GapReason::SequenceBackwards | GapReason::SequenceDuplicate
            ));
        }
    }
}
