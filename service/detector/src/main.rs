//! Anomaly detector service: consumes metrics announcements, drives the
//! alert lifecycle, and fans out notifications.

mod detector;

use std::path::PathBuf;

use clap::Parser;
use common::{load_env_recursively, setup_logs, LogLevel};
use eyre::Result;
use surveil_model::AppConfig;
use surveil_storage::{KvStore, TimeSeriesStore};
use tracing::info;

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
    /// Operations webhook endpoint; the webhook channel is disabled
    /// without it
    #[clap(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,
    #[clap(long, env = "WEBHOOK_CHANNEL", default_value = "#market-ops")]
    webhook_channel: String,
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

    info!("anomaly detector starting");
    detector::run(config, kv, tsdb, args.webhook_url, args.webhook_channel).await
}
