//! One Binance market connection (futures or spot) over a combined
//! stream URL. Reconnection is internal: the combined URL carries the
//! full subscription set, so a fresh connect restores every stream.

use common::ws::{Message, WsSession};
use surveil_model::config::ConnectionConfig;
use surveil_venue_core::{reconnect_delay, AdapterError};
use tracing::{debug, error, info, warn};

use crate::msg::{
    CombinedStreamEnvelope, DepthUpdateMessage, ErrorMessageOuter, MarkPriceMessage,
    PartialDepthMessage, Ticker24hMessage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    Futures,
    Spot,
}

/// One parsed frame from the combined stream.
#[derive(Debug)]
pub enum BinanceStreamEvent {
    DepthUpdate(DepthUpdateMessage),
    /// Spot partial depth carries no symbol; the combined-stream name is
    /// the only context available.
    PartialDepth {
        stream_symbol: Option<String>,
        msg: PartialDepthMessage,
    },
    Ticker(Ticker24hMessage),
    MarkPrice(MarkPriceMessage),
}

pub struct BinanceMarketConnection {
    pub market: MarketKind,
    base_url: String,
    streams: Vec<String>,
    ws: WsSession,
    connection: ConnectionConfig,
    reconnect_attempts: u32,
    /// Incremented on every successful (re)connect after the first.
    pub reconnect_count: u32,
}

impl BinanceMarketConnection {
    pub fn new(market: MarketKind, base_url: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self {
            market,
            base_url: base_url.into(),
            streams: Vec::new(),
            ws: WsSession::new(),
            connection,
            reconnect_attempts: 0,
            reconnect_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_connected()
    }

    pub fn set_streams(&mut self, streams: Vec<String>) {
        self.streams = streams;
    }

    pub fn has_streams(&self) -> bool {
        !self.streams.is_empty()
    }

    fn combined_url(&self) -> String {
        format!("{}?streams={}", self.base_url, self.streams.join("/"))
    }

    /// Connects (or reconnects) to the combined stream URL.
    pub async fn connect(&mut self) -> Result<(), AdapterError> {
        let url = self.combined_url();
        match WsSession::connect(url.as_str()).await {
            Ok(ws) => {
                self.ws = ws;
                self.reconnect_attempts = 0;
                Ok(())
            }
            Err(e) => Err(AdapterError::Transport(e.to_string())),
        }
    }

    pub async fn close(&mut self) {
        self.ws.close().await;
        self.streams.clear();
    }

    async fn reconnect(&mut self) -> Result<(), AdapterError> {
        self.reconnect_attempts += 1;
        if self.reconnect_attempts > self.connection.max_reconnect_attempts {
            return Err(AdapterError::MaxReconnectsExceeded(
                self.connection.max_reconnect_attempts,
            ));
        }
        let delay = reconnect_delay(
            self.connection.reconnect_delay_seconds,
            self.reconnect_attempts - 1,
        );
        warn!(
            market = ?self.market,
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "binance websocket lost, reconnecting"
        );
        tokio::time::sleep(delay).await;
        match self.connect().await {
            Ok(()) => {
                self.reconnect_count += 1;
                info!(market = ?self.market, "binance websocket reconnected");
                Ok(())
            }
            Err(e) => {
                error!(market = ?self.market, ?e, "binance reconnect attempt failed");
                Ok(())
            }
        }
    }

    /// Next parsed event. Reconnects internally; parse failures are logged
    /// and skipped; only exceeding the reconnect budget is fatal.
    pub async fn next(&mut self) -> Result<BinanceStreamEvent, AdapterError> {
        loop {
            let Some(message) = self.ws.next().await else {
                self.reconnect().await?;
                continue;
            };
            match message {
                Message::Text(text) => match self.handle_text(&text) {
                    Ok(Some(event)) => return Ok(event),
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(
                            market = ?self.market,
                            %err,
                            envelope = %truncate(&text, 256),
                            "dropping unparseable binance message"
                        );
                        continue;
                    }
                },
                Message::Ping(payload) => {
                    self.ws.feed(Message::Pong(payload));
                }
                _ => {}
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> eyre::Result<Option<BinanceStreamEvent>> {
        if text.starts_with("{\"error") {
            let outer: ErrorMessageOuter = serde_json::from_str(text)?;
            error!(
                market = ?self.market,
                code = outer.error.code,
                msg = %outer.error.msg,
                "binance stream error message"
            );
            return Ok(None);
        }
        // subscription acks: {"result": null, "id": n}
        if text.contains("\"result\"") {
            debug!(market = ?self.market, "binance stream ack: {}", text);
            return Ok(None);
        }

        let (stream_symbol, data) = match serde_json::from_str::<CombinedStreamEnvelope>(text) {
            Ok(envelope) => (
                envelope.stream_symbol().map(|s| s.to_string()),
                envelope.data,
            ),
            // raw (non-combined) connections deliver the payload bare
            Err(_) => (None, serde_json::from_str(text)?),
        };

        let event_type = data.get("e").and_then(|e| e.as_str());
        match event_type {
            Some("depthUpdate") => Ok(Some(BinanceStreamEvent::DepthUpdate(
                serde_json::from_value(data)?,
            ))),
            Some("24hrTicker") => Ok(Some(BinanceStreamEvent::Ticker(serde_json::from_value(
                data,
            )?))),
            Some("markPriceUpdate") => Ok(Some(BinanceStreamEvent::MarkPrice(
                serde_json::from_value(data)?,
            ))),
            Some(_) => Ok(None),
            None => {
                if data.get("lastUpdateId").is_some() && data.get("bids").is_some() {
                    Ok(Some(BinanceStreamEvent::PartialDepth {
                        stream_symbol,
                        msg: serde_json::from_value(data)?,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
