//! Capability interface every venue adapter satisfies. Venue-family
//! message parsing stays private to each adapter crate.

use async_trait::async_trait;
use surveil_model::{
    GapMarker, HealthStatus, InstrumentId, OrderBookSnapshot, TickerSnapshot, Venue,
};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("not connected")]
    NotConnected,
    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),
    #[error("no venue mapping for instrument {0}")]
    MissingVenueSymbol(InstrumentId),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("rest request failed: {0}")]
    Rest(String),
    #[error("venue reported error code {code}: {message}")]
    VenueError { code: i64, message: String },
    #[error("max reconnect attempts ({0}) exceeded")]
    MaxReconnectsExceeded(u32),
}

impl AdapterError {
    /// Fatal errors terminate the venue's stream; everything else is
    /// handled in place (reconnect or drop-and-continue).
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::MaxReconnectsExceeded(_))
    }
}

/// One item from a venue's live stream.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEvent {
    Snapshot(OrderBookSnapshot),
    Ticker(TickerSnapshot),
    Gap(GapMarker),
}

impl VenueEvent {
    pub fn instrument(&self) -> &InstrumentId {
        match self {
            VenueEvent::Snapshot(s) => &s.instrument,
            VenueEvent::Ticker(t) => &t.instrument,
            VenueEvent::Gap(g) => &g.instrument,
        }
    }
}

/// Adapter contract. `next_event` is the lazy, restartable, unbounded
/// sequence: reconnection happens inside it and only a fatal error ends
/// the stream.
#[async_trait]
pub trait VenueAdapter: Send {
    fn venue(&self) -> Venue;

    fn is_connected(&self) -> bool;

    /// Idempotent. Establishes transport and REST clients.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Idempotent. Drains and releases all streams and timers.
    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    /// Fails with `NotConnected` before `connect`, and with
    /// `UnknownInstrument`/`MissingVenueSymbol` for unmapped ids.
    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), AdapterError>;

    /// Next normalized event from the live stream.
    async fn next_event(&mut self) -> Result<VenueEvent, AdapterError>;

    /// Single-shot REST fallback; rate-limited.
    async fn get_order_book_rest(
        &mut self,
        instrument: &InstrumentId,
    ) -> Result<OrderBookSnapshot, AdapterError>;

    /// Single-shot REST fallback; rate-limited.
    async fn get_ticker_rest(
        &mut self,
        instrument: &InstrumentId,
    ) -> Result<TickerSnapshot, AdapterError>;

    /// Non-blocking synthesis of the current connection health.
    fn health_check(&self) -> HealthStatus;

    /// Pure sequence-gap check; forward jumps never produce a marker.
    fn detect_gap(
        &self,
        instrument: &InstrumentId,
        prev_seq: Option<u64>,
        curr_seq: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<GapMarker> {
        crate::gap::detect_sequence_gap(self.venue(), instrument, prev_seq, curr_seq, now)
    }
}
