use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{InstrumentId, InstrumentKind, Venue};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsFile {
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub basis_pairs: Vec<BasisPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: InstrumentId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InstrumentKind,
    pub base: String,
    pub quote: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_depth_levels")]
    pub depth_levels: u16,
    pub venue_symbols: BTreeMap<Venue, VenueSymbolConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_depth_levels() -> u16 {
    20
}

impl InstrumentConfig {
    pub fn is_perpetual(&self) -> bool {
        self.kind.is_perpetual()
    }

    pub fn is_spot(&self) -> bool {
        self.kind.is_spot()
    }

    pub fn venue_symbol(&self, venue: Venue) -> Option<&VenueSymbolConfig> {
        self.venue_symbols.get(&venue)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSymbolConfig {
    /// Venue-native symbol, e.g. `BTCUSDT` or `BTC-USDT-SWAP`.
    pub symbol: String,
    /// Order book stream or channel name.
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub ticker_stream: Option<String>,
    #[serde(default)]
    pub mark_price_stream: Option<String>,
    #[serde(default)]
    pub inst_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisPair {
    pub perp: InstrumentId,
    pub spot: InstrumentId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_config_parsing() -> eyre::Result<()> {
        let config: InstrumentConfig = serde_yaml::from_str(
            r#"
id: BTC-USDT-PERP
name: Bitcoin USDT Perpetual
type: perpetual
base: BTC
quote: USDT
venue_symbols:
  binance:
    symbol: BTCUSDT
    stream: btcusdt@depth20@100ms
  okx:
    symbol: BTC-USDT-SWAP
    inst_type: SWAP
"#,
        )?;
        assert!(config.is_perpetual());
        assert!(config.enabled);
        assert_eq!(config.depth_levels, 20);
        assert_eq!(
            config.venue_symbol(Venue::Binance).map(|s| s.symbol.as_str()),
            Some("BTCUSDT")
        );
        assert_eq!(
            config.venue_symbol(Venue::Okx).and_then(|s| s.inst_type.as_deref()),
            Some("SWAP")
        );
        Ok(())
    }
}
