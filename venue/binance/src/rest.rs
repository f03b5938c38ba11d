//! Single-shot REST fallback, rate limited per the venue config.

use chrono::Utc;
use common::IntervalLimiter;
use surveil_model::{InstrumentId, OrderBookSnapshot, TickerSnapshot, Venue};
use surveil_venue_core::AdapterError;

use crate::msg::{RestDepthResponse, RestPremiumIndexResponse, RestTickerResponse};
use crate::normalize;

pub struct BinanceRestClient {
    base_url: String,
    futures: bool,
    http: reqwest::Client,
    limiter: IntervalLimiter,
}

impl BinanceRestClient {
    pub fn new(base_url: impl Into<String>, futures: bool, rate_limit_per_second: u64) -> Self {
        Self {
            base_url: base_url.into(),
            futures,
            http: reqwest::Client::new(),
            limiter: IntervalLimiter::per_second(rate_limit_per_second),
        }
    }

    fn depth_path(&self) -> &'static str {
        if self.futures {
            "/fapi/v1/depth"
        } else {
            "/api/v3/depth"
        }
    }

    fn ticker_path(&self) -> &'static str {
        if self.futures {
            "/fapi/v1/ticker/24hr"
        } else {
            "/api/v3/ticker/24hr"
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AdapterError> {
        self.limiter.wait().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AdapterError::Rest(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::Rest(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::Rest(e.to_string()))
    }

    pub async fn get_orderbook(
        &mut self,
        symbol: &str,
        limit: u16,
        instrument: &InstrumentId,
    ) -> Result<OrderBookSnapshot, AdapterError> {
        let depth: RestDepthResponse = self
            .get_json(
                self.depth_path(),
                &[
                    ("symbol", symbol.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        normalize::normalize_rest_depth(depth, instrument.clone(), Utc::now(), limit)
            .map_err(|e| AdapterError::Protocol(e.to_string()))
    }

    pub async fn get_ticker(
        &mut self,
        symbol: &str,
        instrument: &InstrumentId,
    ) -> Result<TickerSnapshot, AdapterError> {
        let ticker: RestTickerResponse = self
            .get_json(self.ticker_path(), &[("symbol", symbol.to_string())])
            .await?;

        let mut snapshot = TickerSnapshot {
            venue: Venue::Binance,
            instrument: instrument.clone(),
            timestamp: Utc::now(),
            local_timestamp: Utc::now(),
            last_price: ticker.last_price,
            mark_price: None,
            index_price: None,
            volume_24h: ticker.volume,
            funding_rate: None,
            next_funding_time: None,
        };

        if self.futures {
            let premium: RestPremiumIndexResponse = self
                .get_json("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
                .await?;
            snapshot.mark_price = Some(premium.mark_price);
            snapshot.index_price = premium.index_price;
            snapshot.funding_rate = premium.last_funding_rate;
            snapshot.next_funding_time = premium
                .next_funding_time
                .map(normalize::epoch_millis);
        }

        Ok(snapshot)
    }
}
