//! OKX REST fallback, rate limited.

use chrono::Utc;
use common::IntervalLimiter;
use surveil_model::{InstrumentId, OrderBookSnapshot, TickerSnapshot, Venue};
use surveil_venue_core::AdapterError;

use crate::msg::{RestBookData, RestEnvelope, RestTickerData};
use crate::normalize;

pub struct OkxRestClient {
    base_url: String,
    http: reqwest::Client,
    limiter: IntervalLimiter,
}

impl OkxRestClient {
    pub fn new(base_url: impl Into<String>, rate_limit_per_second: u64) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            limiter: IntervalLimiter::per_second(rate_limit_per_second),
        }
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AdapterError> {
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
        let envelope: RestEnvelope<T> = response
            .json()
            .await
            .map_err(|e| AdapterError::Rest(e.to_string()))?;
        if envelope.code != "0" {
            return Err(AdapterError::VenueError {
                code: envelope.code.parse().unwrap_or(-1),
                message: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    pub async fn get_orderbook(
        &mut self,
        inst_id: &str,
        depth: u16,
        instrument: &InstrumentId,
    ) -> Result<OrderBookSnapshot, AdapterError> {
        let data: Vec<RestBookData> = self
            .get_data(
                "/api/v5/market/books",
                &[
                    ("instId", inst_id.to_string()),
                    ("sz", depth.to_string()),
                ],
            )
            .await?;
        let book = data
            .first()
            .ok_or_else(|| AdapterError::Rest("empty books response".into()))?;
        normalize::normalize_rest_book(book, instrument.clone(), Utc::now(), depth)
            .map_err(|e| AdapterError::Protocol(e.to_string()))
    }

    pub async fn get_ticker(
        &mut self,
        inst_id: &str,
        instrument: &InstrumentId,
    ) -> Result<TickerSnapshot, AdapterError> {
        let data: Vec<RestTickerData> = self
            .get_data("/api/v5/market/ticker", &[("instId", inst_id.to_string())])
            .await?;
        let ticker = data
            .first()
            .ok_or_else(|| AdapterError::Rest("empty ticker response".into()))?;
        Ok(TickerSnapshot {
            venue: Venue::Okx,
            instrument: instrument.clone(),
            timestamp: normalize::epoch_millis(ticker.ts),
            local_timestamp: Utc::now(),
            last_price: ticker.last,
            mark_price: None,
            index_price: None,
            volume_24h: ticker.vol_24h,
            funding_rate: None,
            next_funding_time: None,
        })
    }
}
