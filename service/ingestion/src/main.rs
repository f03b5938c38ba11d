//! Venue ingest service: one reader task per venue pushes normalized
//! events into a bounded channel; the root pipeline writes snapshots to
//! the KV store, announces them over pub/sub, and records gaps and
//! health.

mod pipeline;

use std::path::PathBuf;

use clap::Parser;
use common::{load_env_recursively, setup_logs, LogLevel};
use eyre::Result;
use surveil_model::config::InstrumentConfig;
use surveil_model::{AppConfig, InstrumentId, Venue};
use surveil_storage::{KvStore, TimeSeriesStore};
use surveil_venue_binance::BinanceAdapter;
use surveil_venue_core::VenueAdapter;
use surveil_venue_okx::OkxAdapter;
use tracing::{info, warn};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgument {
    /// Directory holding the YAML config documents
    #[clap(short, long, value_parser, value_name = "DIR", env = "CONFIG_PATH", default_value = "config")]
    config: PathBuf,
    #[clap(long, env = "KV_URL", default_value = "redis://localhost:6379")]
    kv_url: String,
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,
    /// Overrides the configured log level
    #[clap(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_recursively()?;
    let args = CliArgument::parse();
    let config = AppConfig::load(&args.config)?;
    let log_level = match &args.log_level {
        Some(raw) => raw.parse::<LogLevel>()?,
        None => config.features.logging.level,
    };
    setup_logs(log_level, config.features.logging.format)?;

    let kv = KvStore::connect(&args.kv_url, config.features.storage.kv.clone()).await?;
    let tsdb = TimeSeriesStore::connect(&args.database_url, 8).await?;

    let mut adapters: Vec<(Box<dyn VenueAdapter>, Vec<InstrumentId>)> = Vec::new();
    for (venue, exchange_config) in config.enabled_exchanges() {
        let instruments: Vec<InstrumentConfig> = config
            .enabled_instruments()
            .filter(|i| i.venue_symbol(venue).is_some())
            .cloned()
            .collect();
        if instruments.is_empty() {
            warn!(%venue, "no instruments mapped for venue, skipping");
            continue;
        }
        let ids: Vec<InstrumentId> = instruments.iter().map(|i| i.id.clone()).collect();
        let adapter: Box<dyn VenueAdapter> = match venue {
            Venue::Binance => Box::new(BinanceAdapter::new(exchange_config.clone(), instruments)),
            Venue::Okx => Box::new(OkxAdapter::new(exchange_config.clone(), instruments)),
        };
        adapters.push((adapter, ids));
    }
    if adapters.is_empty() {
        eyre::bail!("no enabled venue has mapped instruments");
    }

    info!(venues = adapters.len(), "data ingestion starting");
    pipeline::run(config, kv, tsdb, adapters).await
}
