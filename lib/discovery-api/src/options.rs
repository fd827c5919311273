//! Discovery instance configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default address announcements are published on
pub const DEFAULT_ANNOUNCE_ADDRESS: &str = "discovery.announce";
/// Default address usage events are published on
pub const DEFAULT_USAGE_ADDRESS: &str = "discovery.usage";

/// Options of a discovery instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryOptions {
    /// Identifies this instance in diagnostics
    pub name: String,
    pub announce_address: String,
    pub usage_address: String,
    /// Overall deadline for stopping every bridge on close
    pub bridge_stop_timeout_ms: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            name: "service-discovery".to_string(),
            announce_address: DEFAULT_ANNOUNCE_ADDRESS.to_string(),
            usage_address: DEFAULT_USAGE_ADDRESS.to_string(),
            bridge_stop_timeout_ms: 5000,
        }
    }
}

impl DiscoveryOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_announce_address(mut self, address: impl Into<String>) -> Self {
        self.announce_address = address.into();
        self
    }

    pub fn with_usage_address(mut self, address: impl Into<String>) -> Self {
        self.usage_address = address.into();
        self
    }

    pub fn with_bridge_stop_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn bridge_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_stop_timeout_ms)
    }
}
