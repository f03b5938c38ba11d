//! Pub/sub envelopes. Broadcasts carry only the identifiers a subscriber
//! needs to fetch authoritative state from the KV store; full payloads
//! are never published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surveil_model::{AlertPriority, GapReason, InstrumentId, Venue};

pub const CHANNEL_ORDERBOOK: &str = "updates:orderbook";
pub const CHANNEL_METRICS: &str = "updates:metrics";
pub const CHANNEL_ALERTS: &str = "updates:alerts";
pub const CHANNEL_HEALTH: &str = "updates:health";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookUpdate {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub sequence_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub alert_id: String,
    pub alert_type: String,
    pub priority: AlertPriority,
    pub venue: Venue,
    pub instrument: InstrumentId,
}

/// Health channel carries both periodic health beats and gap events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealthUpdate {
    Health {
        venue: Venue,
    },
    Gap {
        venue: Venue,
        instrument: InstrumentId,
        reason: GapReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_orderbook_update_round_trip() -> eyre::Result<()> {
        let update = OrderbookUpdate {
            venue: Venue::Binance,
            instrument: "BTC-USDT-PERP".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap(),
            sequence_id: 42,
        };
        let json = serde_json::to_string(&update)?;
        // identifiers only: the full book never travels over pub/sub
        assert!(!json.contains("bids"));
        let back: OrderbookUpdate = serde_json::from_str(&json)?;
        assert_eq!(back, update);
        Ok(())
    }

    #[test]
    fn test_health_update_gap_tag() -> eyre::Result<()> {
        let update = HealthUpdate::Gap {
            venue: Venue::Okx,
            instrument: "BTC-USDT-PERP".into(),
            reason: GapReason::SequenceBackwards,
        };
        let json = serde_json::to_string(&update)?;
        assert!(json.contains("\"event\":\"gap\""));
        assert!(json.contains("\"sequence_backwards\""));
        Ok(())
    }
}
