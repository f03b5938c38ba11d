//! Binance adapter: separate connections for the futures and spot
//! markets, both multiplexing their instruments over combined streams.

pub mod connection;
pub mod msg;
pub mod normalize;
pub mod rest;

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use surveil_model::config::{ExchangeConfig, InstrumentConfig};
use surveil_model::{
    HealthStatus, InstrumentId, OrderBookSnapshot, TickerSnapshot, Venue,
};
use surveil_venue_core::{
    detect_sequence_gap, AdapterError, ConnectionTracker, VenueAdapter, VenueEvent,
};
use tracing::{info, warn};

use crate::connection::{BinanceMarketConnection, BinanceStreamEvent, MarketKind};
use crate::msg::{MarkPriceMessage, Ticker24hMessage};
use crate::rest::BinanceRestClient;

pub struct BinanceAdapter {
    config: ExchangeConfig,
    instruments: Vec<InstrumentConfig>,
    started: bool,

    futures_conn: Option<BinanceMarketConnection>,
    spot_conn: Option<BinanceMarketConnection>,
    rest_futures: Option<BinanceRestClient>,
    rest_spot: Option<BinanceRestClient>,

    /// venue symbol (upper case) -> instrument, per market.
    futures_symbols: HashMap<String, InstrumentId>,
    spot_symbols: HashMap<String, InstrumentId>,
    /// Subscribed spot instruments in subscription order; partial-depth
    /// frames resolve against this when the stream name is missing.
    spot_subscriptions: Vec<InstrumentId>,

    last_sequence_ids: HashMap<InstrumentId, u64>,
    tracker: ConnectionTracker,
    pending: VecDeque<VenueEvent>,

    ticker_cache: HashMap<String, Ticker24hMessage>,
    mark_price_cache: HashMap<String, MarkPriceMessage>,
}

impl BinanceAdapter {
    pub fn new(config: ExchangeConfig, instruments: Vec<InstrumentConfig>) -> Self {
        Self {
            config,
            instruments,
            started: false,
            futures_conn: None,
            spot_conn: None,
            rest_futures: None,
            rest_spot: None,
            futures_symbols: HashMap::new(),
            spot_symbols: HashMap::new(),
            spot_subscriptions: Vec::new(),
            last_sequence_ids: HashMap::new(),
            tracker: ConnectionTracker::new(Venue::Binance),
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

    /// Stream name for one instrument, from config or synthesized from the
    /// venue symbol and the configured depth/speed.
    fn stream_name(&self, instrument: &InstrumentConfig) -> Result<String, AdapterError> {
        let symbol = instrument
            .venue_symbol(Venue::Binance)
            .ok_or_else(|| AdapterError::MissingVenueSymbol(instrument.id.clone()))?;
        if let Some(stream) = &symbol.stream {
            return Ok(stream.clone());
        }
        let speed = self
            .config
            .streams
            .orderbook_speed
            .as_deref()
            .unwrap_or("100ms");
        Ok(format!(
            "{}@depth{}@{}",
            symbol.symbol.to_ascii_lowercase(),
            self.config.streams.orderbook_depth,
            speed
        ))
    }

    fn resolve_futures_symbol(&self, symbol: &str) -> Option<InstrumentId> {
        self.futures_symbols.get(&symbol.to_ascii_uppercase()).cloned()
    }

    /// Spot partial-depth frames carry no symbol. The combined-stream name
    /// resolves it; with a single subscribed spot instrument the
    /// subscription context alone is enough.
    fn resolve_spot_instrument(&self, stream_symbol: Option<&str>) -> Option<InstrumentId> {
        if let Some(symbol) = stream_symbol {
            if let Some(id) = self.spot_symbols.get(&symbol.to_ascii_uppercase()) {
                return Some(id.clone());
            }
        }
        self.spot_subscriptions.first().cloned()
    }

    fn track_sequence(&mut self, snapshot: &OrderBookSnapshot) {
        let prev = self.last_sequence_ids.get(&snapshot.instrument).copied();
        if let Some(gap) = detect_sequence_gap(
            Venue::Binance,
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
                "binance sequence gap"
            );
            self.tracker.on_gap(snapshot.local_timestamp);
            self.pending.push_back(VenueEvent::Gap(gap));
        }
        self.last_sequence_ids
            .insert(snapshot.instrument.clone(), snapshot.sequence_id);
    }

    fn depth_levels(&self, instrument: &InstrumentId) -> u16 {
        self.instruments
            .iter()
            .find(|i| &i.id == instrument)
            .map(|i| i.depth_levels)
            .unwrap_or(self.config.streams.orderbook_depth)
    }

    fn handle_stream_event(&mut self, event: BinanceStreamEvent, market: MarketKind) {
        let now = Utc::now();
        match event {
            BinanceStreamEvent::DepthUpdate(msg) => {
                let Some(instrument) = self.resolve_futures_symbol(&msg.s) else {
                    warn!(symbol = %msg.s, "depth update for unmapped binance symbol");
                    return;
                };
                let depth_levels = self.depth_levels(&instrument);
                match normalize::normalize_depth_update(msg, instrument, now, depth_levels) {
                    Ok(snapshot) => {
                        self.tracker.on_message(now);
                        self.track_sequence(&snapshot);
                        self.pending.push_back(VenueEvent::Snapshot(snapshot));
                    }
                    Err(err) => warn!(%err, "dropping invalid binance futures book"),
                }
            }
            BinanceStreamEvent::PartialDepth { stream_symbol, msg } => {
                if market != MarketKind::Spot {
                    return;
                }
                let Some(instrument) = self.resolve_spot_instrument(stream_symbol.as_deref())
                else {
                    warn!("partial depth with no subscribed spot instrument");
                    return;
                };
                let depth_levels = self.depth_levels(&instrument);
                match normalize::normalize_partial_depth(msg, instrument, now, depth_levels) {
                    Ok(snapshot) => {
                        self.tracker.on_message(now);
                        self.track_sequence(&snapshot);
                        self.pending.push_back(VenueEvent::Snapshot(snapshot));
                    }
                    Err(err) => warn!(%err, "dropping invalid binance spot book"),
                }
            }
            BinanceStreamEvent::Ticker(msg) => {
                self.tracker.on_message(now);
                self.ticker_cache.insert(msg.s.to_ascii_uppercase(), msg.clone());
                self.emit_ticker(&msg.s, market);
            }
            BinanceStreamEvent::MarkPrice(msg) => {
                self.tracker.on_message(now);
                self.mark_price_cache
                    .insert(msg.s.to_ascii_uppercase(), msg.clone());
                self.emit_ticker(&msg.s, market);
            }
        }
    }

    /// Combines the cached 24hr ticker with the mark-price cache; emits
    /// only once the 24hr side exists.
    fn emit_ticker(&mut self, symbol: &str, market: MarketKind) {
        let key = symbol.to_ascii_uppercase();
        let Some(ticker) = self.ticker_cache.get(&key) else {
            return;
        };
        let instrument = match market {
            MarketKind::Futures => self.resolve_futures_symbol(&key),
            MarketKind::Spot => self.spot_symbols.get(&key).cloned(),
        };
        let Some(instrument) = instrument else {
            return;
        };
        let mark = self.mark_price_cache.get(&key);
        let snapshot = TickerSnapshot {
            venue: Venue::Binance,
            instrument,
            timestamp: normalize::epoch_millis(ticker.E),
            local_timestamp: Utc::now(),
            last_price: ticker.c,
            mark_price: mark.map(|m| m.p),
            index_price: mark.and_then(|m| m.i),
            volume_24h: ticker.v,
            funding_rate: mark.and_then(|m| m.r),
            next_funding_time: mark.and_then(|m| m.T).map(normalize::epoch_millis),
        };
        self.pending.push_back(VenueEvent::Ticker(snapshot));
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn is_connected(&self) -> bool {
        self.futures_conn.as_ref().map_or(false, |c| c.is_connected())
            || self.spot_conn.as_ref().map_or(false, |c| c.is_connected())
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        if self.started {
            return Ok(());
        }
        let rate = self.config.connection.rate_limit_per_second;
        if let Some(url) = self.config.rest_url("futures") {
            self.rest_futures = Some(BinanceRestClient::new(url, true, rate));
        }
        if let Some(url) = self.config.rest_url("spot") {
            self.rest_spot = Some(BinanceRestClient::new(url, false, rate));
        }
        self.started = true;
        self.tracker.set_status(surveil_model::ConnectionStatus::Connected);
        info!(
            futures = self.config.websocket_url("futures").is_some(),
            spot = self.config.websocket_url("spot").is_some(),
            "binance adapter connected"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if let Some(conn) = &mut self.futures_conn {
            conn.close().await;
        }
        if let Some(conn) = &mut self.spot_conn {
            conn.close().await;
        }
        self.futures_conn = None;
        self.spot_conn = None;
        self.rest_futures = None;
        self.rest_spot = None;
        self.pending.clear();
        self.started = false;
        self.tracker
            .set_status(surveil_model::ConnectionStatus::Disconnected);
        info!("binance adapter disconnected");
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), AdapterError> {
        if !self.started {
            return Err(AdapterError::NotConnected);
        }

        let mut futures_streams: Vec<String> = Vec::new();
        let mut spot_streams: Vec<String> = Vec::new();

        for id in instruments {
            let instrument = self.instrument_config(id)?.clone();
            let symbol = instrument
                .venue_symbol(Venue::Binance)
                .ok_or_else(|| AdapterError::MissingVenueSymbol(id.clone()))?
                .clone();
            let stream = self.stream_name(&instrument)?;
            let upper = symbol.symbol.to_ascii_uppercase();

            if instrument.is_perpetual() {
                self.futures_symbols.insert(upper, id.clone());
                futures_streams.push(stream);
                if let Some(mark) = &symbol.mark_price_stream {
                    futures_streams.push(mark.clone());
                }
                if let Some(ticker) = &symbol.ticker_stream {
                    futures_streams.push(ticker.clone());
                }
            } else {
                self.spot_symbols.insert(upper, id.clone());
                self.spot_subscriptions.push(id.clone());
                spot_streams.push(stream);
                if let Some(ticker) = &symbol.ticker_stream {
                    spot_streams.push(ticker.clone());
                }
            }
        }

        if !futures_streams.is_empty() {
            let url = self
                .config
                .websocket_url("futures")
                .ok_or_else(|| AdapterError::Protocol("no futures websocket url".into()))?;
            let mut conn = BinanceMarketConnection::new(
                MarketKind::Futures,
                url,
                self.config.connection.clone(),
            );
            conn.set_streams(futures_streams.clone());
            conn.connect().await?;
            self.futures_conn = Some(conn);
            info!(streams = ?futures_streams, "binance futures subscribed");
        }

        if !spot_streams.is_empty() {
            let url = self
                .config
                .websocket_url("spot")
                .ok_or_else(|| AdapterError::Protocol("no spot websocket url".into()))?;
            let mut conn =
                BinanceMarketConnection::new(MarketKind::Spot, url, self.config.connection.clone());
            conn.set_streams(spot_streams.clone());
            conn.connect().await?;
            self.spot_conn = Some(conn);
            info!(streams = ?spot_streams, "binance spot subscribed");
        }

        Ok(())
    }

    async fn next_event(&mut self) -> Result<VenueEvent, AdapterError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let event = match (&mut self.futures_conn, &mut self.spot_conn) {
                (Some(futures), Some(spot)) => {
                    tokio::select! {
                        event = futures.next() => event.map(|e| (e, MarketKind::Futures)),
                        event = spot.next() => event.map(|e| (e, MarketKind::Spot)),
                    }
                }
                (Some(futures), None) => futures.next().await.map(|e| (e, MarketKind::Futures)),
                (None, Some(spot)) => spot.next().await.map(|e| (e, MarketKind::Spot)),
                (None, None) => return Err(AdapterError::NotConnected),
            };

            match event {
                Ok((event, market)) => self.handle_stream_event(event, market),
                Err(err) if err.is_fatal() => {
                    self.tracker
                        .set_status(surveil_model::ConnectionStatus::Disconnected);
                    return Err(err);
                }
                Err(err) => {
                    warn!(%err, "binance stream error");
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
        let symbol = config
            .venue_symbol(Venue::Binance)
            .ok_or_else(|| AdapterError::MissingVenueSymbol(instrument.clone()))?
            .symbol
            .clone();
        let limit = config.depth_levels;
        let client = if config.is_perpetual() {
            self.rest_futures.as_mut()
        } else {
            self.rest_spot.as_mut()
        };
        let client = client.ok_or(AdapterError::NotConnected)?;
        client.get_orderbook(&symbol, limit, instrument).await
    }

    async fn get_ticker_rest(
        &mut self,
        instrument: &InstrumentId,
    ) -> Result<TickerSnapshot, AdapterError> {
        let config = self.instrument_config(instrument)?.clone();
        let symbol = config
            .venue_symbol(Venue::Binance)
            .ok_or_else(|| AdapterError::MissingVenueSymbol(instrument.clone()))?
            .symbol
            .clone();
        let client = if config.is_perpetual() {
            self.rest_futures.as_mut()
        } else {
            self.rest_spot.as_mut()
        };
        let client = client.ok_or(AdapterError::NotConnected)?;
        client.get_ticker(&symbol, instrument).await
    }

    fn health_check(&self) -> HealthStatus {
        let mut health = self.tracker.health(Utc::now());
        health.reconnect_count += self.futures_conn.as_ref().map_or(0, |c| c.reconnect_count)
            + self.spot_conn.as_ref().map_or(0, |c| c.reconnect_count);
        health
    }
}
