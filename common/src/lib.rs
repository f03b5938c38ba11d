pub mod config;
pub mod env;
pub mod log;
pub mod throttle;
pub mod ws;

pub use config::load_yaml_file;
pub use env::{load_env_recursively, redact_url};
pub use log::{setup_logs, LogFormat, LogLevel};
pub use throttle::IntervalLimiter;
