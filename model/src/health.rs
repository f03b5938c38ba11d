//! Connection health and data-gap records.

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
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Degraded,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Still receiving data, even if impaired.
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Degraded)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    SequenceBackwards,
    SequenceDuplicate,
    TimeGap,
    Disconnect,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GapError {
    #[error("gap_end {0} must be >= gap_start {1}")]
    EndBeforeStart(DateTime<Utc>, DateTime<Utc>),
}

/// Marks a documented discontinuity in one instrument's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapMarker {
    pub venue: Venue,
    pub instrument: InstrumentId,
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub duration_seconds: Decimal,
    pub reason: GapReason,
    pub sequence_id_before: Option<u64>,
    pub sequence_id_after: Option<u64>,
}

impl GapMarker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Venue,
        instrument: InstrumentId,
        gap_start: DateTime<Utc>,
        gap_end: DateTime<Utc>,
        duration_seconds: Decimal,
        reason: GapReason,
        sequence_id_before: Option<u64>,
        sequence_id_after: Option<u64>,
    ) -> Result<Self, GapError> {
        if gap_end < gap_start {
            return Err(GapError::EndBeforeStart(gap_end, gap_start));
        }
        Ok(Self {
            venue,
            instrument,
            gap_start,
            gap_end,
            duration_seconds,
            reason,
            sequence_id_before,
            sequence_id_after,
        })
    }

    /// Number of missed sequences, when both endpoints are known.
    pub fn sequence_gap_size(&self) -> Option<i64> {
        match (self.sequence_id_before, self.sequence_id_after) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64 - 1),
            _ => None,
        }
    }
}

/// Per-venue connection health, synthesized without blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub venue: Venue,
    pub status: ConnectionStatus,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub lag_ms: u64,
    pub reconnect_count: u32,
    pub gaps_last_hour: u32,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy() && self.lag_ms < 1000 && self.gaps_last_hour < 5
    }

    pub fn is_degraded(&self) -> bool {
        self.status.is_usable() && (self.lag_ms >= 1000 || self.gaps_last_hour >= 5)
    }
}

/// Warmup progress for one (venue, instrument, metric) z-score tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreWarmupStatus {
    pub metric_name: String,
    pub instrument: InstrumentId,
    pub venue: Venue,
    pub is_warmed_up: bool,
    pub sample_count: usize,
    pub min_samples: usize,
    pub last_update: DateTime<Utc>,
}

impl ZScoreWarmupStatus {
    pub fn samples_remaining(&self) -> usize {
        self.min_samples.saturating_sub(self.sample_count)
    }

    pub fn display_text(&self) -> String {
        if self.is_warmed_up {
            "active".to_string()
        } else {
            format!("warming up ({}/{})", self.sample_count, self.min_samples)
        }
    }
}
