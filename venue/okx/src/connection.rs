//! Single multiplexed public-stream connection. Subscribe frames are
//! cached in the SubscriptionManager and replayed after every reconnect.

use std::time::Duration;

use common::ws::{Message, WsSession};
use surveil_model::config::ConnectionConfig;
use surveil_venue_core::{reconnect_delay, AdapterError, SubscriptionManager};
use tracing::{debug, error, info, warn};

use crate::msg::{BooksMessage, EventMessage, MarkPriceMessage, TickersMessage};

#[derive(Debug)]
pub enum OkxStreamEvent {
    Books(BooksMessage),
    Tickers(TickersMessage),
    MarkPrice(MarkPriceMessage),
}

pub struct OkxPublicConnection {
    url: String,
    ws: WsSession,
    pub subs: SubscriptionManager,
    connection: ConnectionConfig,
    heartbeat: tokio::time::Interval,
    reconnect_attempts: u32,
    pub reconnect_count: u32,
}

impl OkxPublicConnection {
    pub fn new(url: impl Into<String>, connection: ConnectionConfig) -> Self {
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(connection.ping_interval_seconds.max(1)));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self {
            url: url.into(),
            ws: WsSession::new(),
            subs: SubscriptionManager::new(),
            connection,
            heartbeat,
            reconnect_attempts: 0,
            reconnect_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_connected()
    }

    pub async fn connect(&mut self) -> Result<(), AdapterError> {
        let mut ws = WsSession::connect(self.url.as_str())
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        for frame in self.subs.messages() {
            ws.send(Message::Text(frame)).await;
        }
        self.ws = ws;
        self.reconnect_attempts = 0;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.ws.close().await;
        self.subs.clear();
    }

    /// Queues a subscribe frame for the live session and caches it for
    /// replay after reconnects.
    pub async fn subscribe_frame(&mut self, frame: String) -> Result<(), AdapterError> {
        self.subs.register_global(frame.clone());
        if self.ws.is_connected() && !self.ws.send(Message::Text(frame)).await {
            return Err(AdapterError::Transport("subscribe send failed".into()));
        }
        Ok(())
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
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "okx websocket lost, reconnecting"
        );
        tokio::time::sleep(delay).await;
        match self.connect().await {
            Ok(()) => {
                self.reconnect_count += 1;
                info!("okx websocket reconnected");
                Ok(())
            }
            Err(e) => {
                error!(?e, "okx reconnect attempt failed");
                Ok(())
            }
        }
    }

    /// Next parsed event. A text `ping` is answered with `pong` by the
    /// venue; we send the ping on the configured heartbeat interval.
    pub async fn next(&mut self) -> Result<OkxStreamEvent, AdapterError> {
        loop {
            tokio::select! {
                message = self.ws.next() => {
                    let Some(message) = message else {
                        self.reconnect().await?;
                        continue;
                    };
                    match message {
                        Message::Text(text) => match self.handle_text(&text) {
                            Ok(Some(event)) => return Ok(event),
                            Ok(None) => continue,
                            Err(err) => {
                                warn!(
                                    %err,
                                    envelope = %truncate(&text, 256),
                                    "dropping unparseable okx message"
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
                _ = self.heartbeat.tick() => {
                    if self.ws.is_connected() {
                        self.ws.send(Message::Text("ping".to_string())).await;
                    }
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> eyre::Result<Option<OkxStreamEvent>> {
        if text == "pong" {
            return Ok(None);
        }
        if text.contains("\"event\"") {
            let event: EventMessage = serde_json::from_str(text)?;
            match event.event.as_str() {
                "error" => error!(
                    code = event.code.as_deref().unwrap_or(""),
                    msg = event.msg.as_deref().unwrap_or(""),
                    "okx stream error event"
                ),
                other => debug!(event = other, "okx stream event"),
            }
            return Ok(None);
        }

        if text.contains("\"channel\":\"books") {
            return Ok(Some(OkxStreamEvent::Books(serde_json::from_str(text)?)));
        }
        if text.contains("\"channel\":\"tickers\"") {
            return Ok(Some(OkxStreamEvent::Tickers(serde_json::from_str(text)?)));
        }
        if text.contains("\"channel\":\"mark-price\"") {
            return Ok(Some(OkxStreamEvent::MarkPrice(serde_json::from_str(text)?)));
        }
        Ok(None)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
