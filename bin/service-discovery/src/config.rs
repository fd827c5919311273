//! Daemon configuration

use anyhow::{Context, Result};
use discovery_api::{DiscoveryOptions, Record};
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "DISCOVERY_CONFIG";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryOptions,
    pub bridges: Vec<BridgeConfig>,
}

/// A static bridge and the records it imports
#[derive(Clone, Debug, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid discovery configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_yaml(&text)
    }

    /// Load the file named by `DISCOVERY_CONFIG`, or defaults when unset
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
