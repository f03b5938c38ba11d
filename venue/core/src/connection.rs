//! Per-venue connection bookkeeping behind `health_check`.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use surveil_model::{ConnectionStatus, HealthStatus, Venue};

const GAP_WINDOW: i64 = 3600;
const DEGRADED_GAPS: usize = 5;
const DEGRADED_LAG_MS: u64 = 1000;

/// Message, reconnect and gap counters for one venue. Owned by the
/// adapter's task; health synthesis never blocks.
pub struct ConnectionTracker {
    venue: Venue,
    status: ConnectionStatus,
    last_message_at: Option<DateTime<Utc>>,
    message_count: u64,
    reconnect_count: u32,
    gap_times: VecDeque<DateTime<Utc>>,
}

impl ConnectionTracker {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            status: ConnectionStatus::Disconnected,
            last_message_at: None,
            message_count: 0,
            reconnect_count: 0,
            gap_times: VecDeque::new(),
        }
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn on_message(&mut self, at: DateTime<Utc>) {
        self.message_count += 1;
        self.last_message_at = Some(at);
    }

    pub fn on_reconnect(&mut self) {
        self.reconnect_count += 1;
        self.status = ConnectionStatus::Reconnecting;
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    pub fn on_gap(&mut self, at: DateTime<Utc>) {
        self.gap_times.push_back(at);
        self.prune_gaps(at);
    }

    fn prune_gaps(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(GAP_WINDOW);
        while let Some(front) = self.gap_times.front() {
            if *front < cutoff {
                self.gap_times.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn gaps_last_hour(&self, now: DateTime<Utc>) -> u32 {
        let cutoff = now - Duration::seconds(GAP_WINDOW);
        self.gap_times.iter().filter(|t| **t >= cutoff).count() as u32
    }

    pub fn lag_ms(&self, now: DateTime<Utc>) -> u64 {
        match self.last_message_at {
            Some(at) => (now - at).num_milliseconds().max(0) as u64,
            None => 0,
        }
    }

    /// Synthesizes the externally visible health record without blocking
    /// or mutating. A connected transport with repeated gaps or high lag
    /// is reported degraded, still usable.
    pub fn health(&self, now: DateTime<Utc>) -> HealthStatus {
        let lag_ms = self.lag_ms(now);
        let gaps_last_hour = self.gaps_last_hour(now);

        let status = match self.status {
            ConnectionStatus::Connected
                if gaps_last_hour >= DEGRADED_GAPS as u32 || lag_ms >= DEGRADED_LAG_MS =>
            {
                ConnectionStatus::Degraded
            }
            other => other,
        };

        HealthStatus {
            venue: self.venue,
            status,
            last_message_at: self.last_message_at,
            message_count: self.message_count,
            lag_ms,
            reconnect_count: self.reconnect_count,
            gaps_last_hour,
        }
    }
}
