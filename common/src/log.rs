use std::str::FromStr;

use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(eyre!("Invalid log level: {}", s)),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(eyre!("Invalid log format: {}", s)),
        }
    }
}

fn build_env_filter(log_level: LogLevel) -> Result<EnvFilter> {
    let filter = EnvFilter::from_default_env()
        .add_directive(log_level.as_level_filter().into())
        .add_directive("tungstenite::protocol=info".parse()?)
        .add_directive("tokio_tungstenite=info".parse()?)
        .add_directive("tokio_postgres::connection=info".parse()?)
        .add_directive("h2=info".parse()?)
        .add_directive("rustls=info".parse()?)
        .add_directive("hyper=info".parse()?)
        .add_directive("mio=info".parse()?)
        .add_directive("want=info".parse()?);
    Ok(filter)
}

/// Installs the global subscriber, the log bridge and the panic hook.
/// Must be called exactly once per process, before any task is spawned.
pub fn setup_logs(log_level: LogLevel, format: LogFormat) -> Result<()> {
    color_eyre::install()?;
    LogTracer::init().context("Cannot setup_logs")?;
    let filter = build_env_filter(log_level)?;

    match format {
        LogFormat::Text => {
            let subscriber = fmt()
                .with_thread_names(true)
                .with_line_number(true)
                .with_env_filter(filter)
                .finish();
            tracing::subscriber::set_global_default(subscriber).context("Cannot setup_logs")?;
        }
        LogFormat::Json => {
            let subscriber = fmt().json().with_env_filter(filter).finish();
            tracing::subscriber::set_global_default(subscriber).context("Cannot setup_logs")?;
        }
    }
    log_panics::init();
    Ok(())
}
