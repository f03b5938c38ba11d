//! OKX adapter: one combined public stream for every subscribed
//! instrument, with channel + instId arguments on each message.

pub mod connection;
pub mod msg;
pub mod normalize;
pub mod rest;

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use surveil_model::config::{ExchangeConfig, InstrumentConfig};
use surveil_model::{
    ConnectionStatus, HealthStatus, InstrumentId, OrderBookSnapshot, TickerSnapshot, Venue,
};
use surveil_venue_core::{
    detect_sequence_gap, AdapterError, ConnectionTracker, VenueAdapter, VenueEvent,
};
use tracing::{info, warn};

use crate::connection::{OkxPublicConnection, OkxStreamEvent};
use crate::msg::{encode_subscribe, ChannelArg, MarkPriceData, TickerData};
use crate::rest::OkxRestClient;

pub struct OkxAdapter {
    config: ExchangeConfig,
    instruments: Vec<InstrumentConfig>,
    started: bool,

    conn: Option<OkxPublicConnection>,
    rest: Option<OkxRestClient>,

    /// venue instId -> canonical instrument.
    inst_ids: HashMap<String, InstrumentId>,
    last_sequence_ids: HashMap<InstrumentId, u64>,
    tracker: ConnectionTracker,
    pending: VecDeque<VenueEvent>,

    ticker_cache: HashMap<String, TickerData>,
    mark_price_cache: HashMap<String, MarkPriceData>,
}

impl OkxAdapter {
    pub fn new(config: ExchangeConfig, instruments: Vec<InstrumentConfig>) -> Self {
        Self {
            config,
            instruments,
            started: false,
            conn: None,
            rest: None,
            inst_ids: HashMap::new(),
            last_sequence_ids: HashMap::new(),
            tracker: ConnectionTracker::new(Venue::Okx),
            pending: VecDeque::new(),
            ticker_cache: HashMap::new(),
            mark_price_cache: HashMap::new(),
        }
    }

    fn instrument_config(&self, id: &InstrumentId) -> Result<&InstrumentConfig, AdapterError> {
        self.instruments
            .iter()
            .find(|i| &i.id == id)
            .ok_or_else(|| AdapterError::UnknownInstrument(id.clone()))
    }

    fn venue_inst_id(&self, config: &InstrumentConfig) -> Result<String, AdapterError> {
        Ok(config
            .venue_symbol(Venue::Okx)
            .ok_or_else(|| AdapterError::MissingVenueSymbol(config.id.clone()))?
            .symbol
            .clone())
    }

    fn depth_levels(&self, instrument: &InstrumentId) -> u16 {
        self.instruments
            .iter()
            .find(|i| &i.id == instrument)
            .map(|i| i.depth_levels)
            .unwrap_or(self.config.streams.orderbook_depth)
    }

    fn track_sequence(&mut self, snapshot: &OrderBookSnapshot) {
        let prev = self.last_sequence_ids.get(&snapshot.instrument).copied();
        if let Some(gap) = detect_sequence_gap(
            Venue::Okx,
            &snapshot.instrument,
            prev,
            snapshot.sequence_id,
            snapshot.local_timestamp,
        ) {
            warn!(
                instrument = %snapshot.instrument,
                reason = %gap.reason,
                prev_seq = ?gap.sequence_id_before,
                curr_seq = ?gap.sequence_id_after,
                "okx sequence gap"
            );
            self.tracker.on_gap(snapshot.local_timestamp);
            self.pending.push_back(VenueEvent::Gap(gap));
        }
        self.last_sequence_ids
            .insert(snapshot.instrument.clone(), snapshot.sequence_id);
    }

    fn handle_stream_event(&mut self, event: OkxStreamEvent) {
        let now = Utc::now();
        match event {
            OkxStreamEvent::Books(msg) => {
                let Some(instrument) = self.inst_ids.get(&msg.arg.inst_id).cloned() else {
                    warn!(inst_id = %msg.arg.inst_id, "books for unmapped okx instrument");
                    return;
                };
                let depth_levels = self.depth_levels(&instrument);
                for data in &msg.data {
                    match normalize::normalize_book(data, instrument.clone(), now, depth_levels) {
                        Ok(snapshot) => {
                            self.tracker.on_message(now);
                            self.track_sequence(&snapshot);
                            self.pending.push_back(VenueEvent::Snapshot(snapshot));
                        }
                        Err(err) => warn!(%err, "dropping invalid okx book"),
                    }
                }
            }
            OkxStreamEvent::Tickers(msg) => {
                self.tracker.on_message(now);
                for data in msg.data {
                    self.ticker_cache.insert(data.inst_id.clone(), data.clone());
                    self.emit_ticker(&data.inst_id);
                }
            }
            OkxStreamEvent::MarkPrice(msg) => {
                self.tracker.on_message(now);
                for data in msg.data {
                    self.mark_price_cache
                        .insert(data.inst_id.clone(), data.clone());
                    self.emit_ticker(&data.inst_id);
                }
            }
        }
    }

    fn emit_ticker(&mut self, inst_id: &str) {
        let Some(ticker) = self.ticker_cache.get(inst_id) else {
            return;
        };
        let Some(instrument) = self.inst_ids.get(inst_id).cloned() else {
            return;
        };
        let mark = self.mark_price_cache.get(inst_id);
        let snapshot = TickerSnapshot {
            venue: Venue::Okx,
            instrument,
            timestamp: normalize::epoch_millis(ticker.ts),
            local_timestamp: Utc::now(),
            last_price: ticker.last,
            mark_price: mark.map(|m| m.mark_px),
            index_price: None,
            volume_24h: ticker.vol_24h,
            funding_rate: None,
            next_funding_time: None,
        };
        self.pending.push_back(VenueEvent::Ticker(snapshot));
    }
}

#[async_trait]
impl VenueAdapter for OkxAdapter {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn is_connected(&self) -> bool {
        self.conn.as_ref().map_or(false, |c| c.is_connected())
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        if self.started {
            return Ok(());
        }
        let ws_url = self
            .config
            .websocket_url("public")
            .ok_or_else(|| AdapterError::Protocol("no public websocket url".into()))?
            .to_string();
        let mut conn = OkxPublicConnection::new(ws_url, self.config.connection.clone());
        conn.connect().await?;
        self.conn = Some(conn);

        if let Some(rest_url) = self.config.rest_url("public") {
            self.rest = Some(OkxRestClient::new(
                rest_url,
                self.config.connection.rate_limit_per_second,
            ));
        }
        self.started = true;
        self.tracker.set_status(ConnectionStatus::Connected);
        info!("okx adapter connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if let Some(conn) = &mut self.conn {
            conn.close().await;
        }
        self.conn = None;
        self.rest = None;
        self.pending.clear();
        self.started = false;
        self.tracker.set_status(ConnectionStatus::Disconnected);
        info!("okx adapter disconnected");
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), AdapterError> {
        if !self.started {
            return Err(AdapterError::NotConnected);
        }

        let channel = self
            .config
            .streams
            .orderbook_channel
            .clone()
            .unwrap_or_else(|| "books".to_string());

        let mut args: Vec<ChannelArg> = Vec::new();
        for id in instruments {
            let config = self.instrument_config(id)?.clone();
            let inst_id = self.venue_inst_id(&config)?;
            self.inst_ids.insert(inst_id.clone(), id.clone());

            args.push(ChannelArg {
                channel: channel.clone(),
                inst_id: inst_id.clone(),
            });
            if config.venue_symbol(Venue::Okx).and_then(|s| s.ticker_stream.as_ref()).is_some() {
                args.push(ChannelArg {
                    channel: "tickers".to_string(),
                    inst_id: inst_id.clone(),
                });
            }
            if config
                .venue_symbol(Venue::Okx)
                .and_then(|s| s.mark_price_stream.as_ref())
                .is_some()
            {
                args.push(ChannelArg {
                    channel: "mark-price".to_string(),
                    inst_id,
                });
            }
        }

        let conn = self.conn.as_mut().ok_or(AdapterError::NotConnected)?;
        conn.subscribe_frame(encode_subscribe(&args)).await?;
        info!(count = args.len(), "okx channels subscribed");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<VenueEvent, AdapterError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            let conn = self.conn.as_mut().ok_or(AdapterError::NotConnected)?;
            match conn.next().await {
                Ok(event) => self.handle_stream_event(event),
                Err(err) if err.is_fatal() => {
                    self.tracker.set_status(ConnectionStatus::Disconnected);
                    return Err(err);
                }
                Err(err) => {
                    warn!(%err, "okx stream error");
                    self.tracker.on_reconnect();
                }
            }
        }
    }

    async fn get_order_book_rest(
        &mut self,
        instrument: &InstrumentId,
    ) -> Result<OrderBookSnapshot, AdapterError> {
        let config = self.instrument_config(instrument)?.clone();
        let inst_id = self.venue_inst_id(&config)?;
        let depth = config.depth_levels;
        let rest = self.rest.as_mut().ok_or(AdapterError::NotConnected)?;
        rest.get_orderbook(&inst_id, depth, instrument).await
    }

    async fn get_ticker_rest(
        &mut self,
        instrument: &InstrumentId,
    ) -> Result<TickerSnapshot, AdapterError> {
        let config = self.instrument_config(instrument)?.clone();
        let inst_id = self.venue_inst_id(&config)?;
        let rest = self.rest.as_mut().ok_or(AdapterError::NotConnected)?;
        rest.get_ticker(&inst_id, instrument).await
    }

    fn health_check(&self) -> HealthStatus {
        let mut health = self.tracker.health(Utc::now());
        health.reconnect_count += self.conn.as_ref().map_or(0, |c| c.reconnect_count);
        health
    }
}
