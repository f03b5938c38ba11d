use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Exchange venues wired into the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    parse_display::Display,
    parse_display::FromStr,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Okx,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    parse_display::Display,
    parse_display::FromStr,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Perpetual,
    Spot,
}

impl InstrumentKind {
    pub fn is_perpetual(&self) -> bool {
        matches!(self, InstrumentKind::Perpetual)
    }
    pub fn is_spot(&self) -> bool {
        matches!(self, InstrumentKind::Spot)
    }
}

/// Canonical instrument identifier, e.g. `BTC-USDT-PERP` / `BTC-USDT-SPOT`.
/// Cheap to clone; every venue symbol maps into exactly one of these.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId(Arc<str>);

impl InstrumentId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn from_parts(base: &str, quote: &str, kind: InstrumentKind) -> Self {
        let suffix = match kind {
            InstrumentKind::Perpetual => "PERP",
            InstrumentKind::Spot => "SPOT",
        };
        Self::new(format!(
            "{}-{}-{}",
            base.to_ascii_uppercase(),
            quote.to_ascii_uppercase(),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind inferred from the canonical suffix, if well-formed.
    pub fn kind(&self) -> Option<InstrumentKind> {
        if self.0.ends_with("-PERP") {
            Some(InstrumentKind::Perpetual)
        } else if self.0.ends_with("-SPOT") {
            Some(InstrumentKind::Spot)
        } else {
            None
        }
    }
}

impl Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl Debug for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

impl FromStr for InstrumentId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for InstrumentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for InstrumentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_round_trip() -> eyre::Result<()> {
        assert_eq!(Venue::from_str("binance")?, Venue::Binance);
        assert_eq!(Venue::Okx.to_string(), "okx");
        Ok(())
    }

    #[test]
    fn test_instrument_id_from_parts() {
        let id = InstrumentId::from_parts("btc", "usdt", InstrumentKind::Perpetual);
        assert_eq!(id.as_str(), "BTC-USDT-PERP");
        assert_eq!(id.kind(), Some(InstrumentKind::Perpetual));

        let spot = InstrumentId::from_parts("ETH", "USDT", InstrumentKind::Spot);
        assert_eq!(spot.as_str(), "ETH-USDT-SPOT");
        assert_eq!(spot.kind(), Some(InstrumentKind::Spot));
    }

    #[test]
    fn test_instrument_id_serde() -> eyre::Result<()> {
        let id: InstrumentId = "BTC-USDT-PERP".into();
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, "\"BTC-USDT-PERP\"");
        let back: InstrumentId = serde_json::from_str(&json)?;
        assert_eq!(back, id);
        Ok(())
    }
}
