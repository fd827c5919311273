//! Bridge publishing a fixed list of records

use async_trait::async_trait;
use discovery_api::Record;
use discovery_core::{BridgeContext, DiscoveryBridge, DiscoveryError, Result, ServicePublisher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration document of a static bridge
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticBridgeConfig {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// StaticBridge imports records listed in its configuration and removes
/// them again when stopped
pub struct StaticBridge {
    name: String,
    // Registration ids of the records this bridge published
    owned: Mutex<Vec<String>>,
}

impl StaticBridge {
    /// Create a new static bridge
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owned: Mutex::new(Vec::new()),
        }
    }

    /// Registration ids currently owned by this bridge
    pub async fn registrations(&self) -> Vec<String> {
        self.owned.lock().await.clone()
    }
}

#[async_trait]
impl DiscoveryBridge for StaticBridge {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(
        &self,
        context: &BridgeContext,
        discovery: Arc<dyn ServicePublisher>,
        config: Value,
    ) -> Result<()> {
        let config: StaticBridgeConfig = if config.is_null() {
            StaticBridgeConfig::default()
        } else {
            serde_json::from_value(config)?
        };

        let mut owned = self.owned.lock().await;
        for record in config.records {
            let published = discovery.publish(record).await?;
            debug!(
                "Bridge {} imported {} into {}",
                self.name, published.name, context.discovery_name
            );
            owned.extend(published.registration);
        }

        info!("Bridge {} imported {} records", self.name, owned.len());
        Ok(())
    }

    async fn stop(&self, _context: &BridgeContext, discovery: Arc<dyn ServicePublisher>) -> Result<()> {
        let mut owned = self.owned.lock().await;
        let mut failures = Vec::new();

        for registration in owned.drain(..) {
            match discovery.unpublish(&registration).await {
                Ok(()) => {}
                // Someone else already removed it
                Err(DiscoveryError::NotFound(_)) => {
                    debug!("Bridge {} record {} already gone", self.name, registration)
                }
                Err(e) => {
                    warn!("Bridge {} cannot unpublish {}: {}", self.name, registration, e);
                    failures.push(registration);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiscoveryError::Internal(format!(
                "{} records left published: {}",
                failures.len(),
                failures.join(", ")
            )))
        }
    }
}
