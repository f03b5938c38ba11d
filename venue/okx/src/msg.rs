//! OKX v5 public stream wire messages. Every instrument multiplexes over
//! one connection; messages carry a channel + instrument argument.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

/// Event frames: subscribe acks and errors.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub arg: Option<ChannelArg>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Book level: `[price, size, liquidated orders, order count]`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel(
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    #[serde_as(as = "DisplayFromStr")] pub Decimal,
    pub String,
    pub String,
);

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BookData {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Epoch millis, string encoded.
    #[serde_as(as = "DisplayFromStr")]
    pub ts: i64,
    /// Sequence id for gap detection.
    #[serde(rename = "seqId")]
    pub seq_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BooksMessage {
    pub arg: ChannelArg,
    #[serde(default)]
    pub action: Option<String>,
    pub data: Vec<BookData>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub last: Decimal,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(rename = "vol24h", default)]
    pub vol_24h: Option<Decimal>,
    #[serde_as(as = "DisplayFromStr")]
    pub ts: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickersMessage {
    pub arg: ChannelArg,
    pub data: Vec<TickerData>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPriceData {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "markPx")]
    pub mark_px: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub ts: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPriceMessage {
    pub arg: ChannelArg,
    pub data: Vec<MarkPriceData>,
}

/// REST envelope: `{"code": "0", "msg": "", "data": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RestEnvelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Vec<T>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct RestBookData {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde_as(as = "DisplayFromStr")]
    pub ts: i64,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct RestTickerData {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub last: Decimal,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(rename = "vol24h", default)]
    pub vol_24h: Option<Decimal>,
    #[serde_as(as = "DisplayFromStr")]
    pub ts: i64,
}

pub fn encode_subscribe(args: &[ChannelArg]) -> String {
    serde_json::json!({
        "op": "subscribe",
        "args": args,
    })
    .to_string()
}
