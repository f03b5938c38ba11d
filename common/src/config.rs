use std::fmt::Debug;
use std::path::Path;

use eyre::{Context, Result};
use serde::de::DeserializeOwned;

/// Reads and deserializes one YAML document from a config directory.
pub fn load_yaml_file<C: DeserializeOwned + Debug>(path: impl AsRef<Path>) -> Result<C> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: C = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}
