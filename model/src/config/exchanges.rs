use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Venue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangesFile {
    pub exchanges: BTreeMap<Venue, ExchangeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Endpoint name -> websocket URL (e.g. `futures`/`spot`, or `public`).
    pub websocket: BTreeMap<String, String>,
    /// Endpoint name -> REST base URL.
    pub rest: BTreeMap<String, String>,
    pub connection: ConnectionConfig,
    pub streams: StreamsConfig,
}

fn default_enabled() -> bool {
    true
}

impl ExchangeConfig {
    pub fn websocket_url(&self, endpoint: &str) -> Option<&str> {
        self.websocket.get(endpoint).map(|s| s.as_str())
    }

    pub fn rest_url(&self, endpoint: &str) -> Option<&str> {
        self.rest.get(endpoint).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    #[serde(default = "default_max_reconnects")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
}

fn default_rate_limit() -> u64 {
    10
}
fn default_reconnect_delay() -> u64 {
    1
}
fn default_max_reconnects() -> u32 {
    10
}
fn default_ping_interval() -> u64 {
    30
}
fn default_ping_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_orderbook_depth")]
    pub orderbook_depth: u16,
    /// Update speed suffix for venues that encode it in the stream name.
    #[serde(default)]
    pub orderbook_speed: Option<String>,
    /// Channel name for venues with named channels.
    #[serde(default)]
    pub orderbook_channel: Option<String>,
}

fn default_orderbook_depth() -> u16 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_defaults() -> eyre::Result<()> {
        let config: ConnectionConfig = serde_yaml::from_str("{}")?;
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.ping_interval_seconds, 30);
        Ok(())
    }

    #[test]
    fn test_endpoint_lookup() -> eyre::Result<()> {
        let config: ExchangeConfig = serde_yaml::from_str(
            r#"
websocket:
  public: wss://ws.okx.com:8443/ws/v5/public
rest:
  public: https://www.okx.com
connection: {}
streams:
  orderbook_channel: books
"#,
        )?;
        assert_eq!(
            config.websocket_url("public"),
            Some("wss://ws.okx.com:8443/ws/v5/public")
        );
        assert_eq!(config.websocket_url("futures"), None);
        assert_eq!(config.streams.orderbook_channel.as_deref(), Some("books"));
        Ok(())
    }
}
