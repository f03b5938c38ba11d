//! Binance wire messages. All numeric fields arrive string-encoded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Combined-stream envelope: `{"stream": "btcusdt@depth20@100ms", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedStreamEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

impl CombinedStreamEnvelope {
    /// Lower-case venue symbol prefix of the stream name.
    pub fn stream_symbol(&self) -> Option<&str> {
        self.stream.split('@').next().filter(|s| !s.is_empty())
    }
}

/// Futures diff-depth event (`"e": "depthUpdate"`). The final update id
/// `u` is the sequence id used for gap detection.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct DepthUpdateMessage {
    /// Event time, epoch millis.
    pub E: i64,
    /// Venue symbol, e.g. BTCUSDT.
    pub s: String,
    /// First update id in event.
    pub U: u64,
    /// Final update id in event.
    pub u: u64,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub b: Vec<(Decimal, Decimal)>,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub a: Vec<(Decimal, Decimal)>,
}

/// Spot partial-depth message: no event type, no symbol, no server time.
/// The instrument is resolved from the subscription context.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDepthMessage {
    pub last_update_id: u64,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// 24hr rolling ticker event (`"e": "24hrTicker"`).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct Ticker24hMessage {
    pub E: i64,
    pub s: String,
    /// Last price.
    #[serde_as(as = "DisplayFromStr")]
    pub c: Decimal,
    /// Base asset volume.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub v: Option<Decimal>,
}

/// Mark price event (`"e": "markPriceUpdate"`, futures only).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct MarkPriceMessage {
    pub E: i64,
    pub s: String,
    /// Mark price.
    #[serde_as(as = "DisplayFromStr")]
    pub p: Decimal,
    /// Index price.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub i: Option<Decimal>,
    /// Funding rate.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub r: Option<Decimal>,
    /// Next funding time, epoch millis.
    #[serde(default)]
    pub T: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessageOuter {
    #[serde(default)]
    pub id: Option<i64>,
    pub error: ErrorMessage,
}

/// REST depth response, shared by futures and spot endpoints.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestDepthResponse {
    pub last_update_id: u64,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde_as(as = "Vec<(DisplayFromStr, DisplayFromStr)>")]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// REST 24hr ticker response (subset).
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTickerResponse {
    pub symbol: String,
    #[serde_as(as = "DisplayFromStr")]
    pub last_price: Decimal,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub volume: Option<Decimal>,
}

/// REST premium index response (futures mark price).
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestPremiumIndexResponse {
    pub symbol: String,
    #[serde_as(as = "DisplayFromStr")]
    pub mark_price: Decimal,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub index_price: Option<Decimal>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub last_funding_rate: Option<Decimal>,
    #[serde(default)]
    pub next_funding_time: Option<i64>,
}
