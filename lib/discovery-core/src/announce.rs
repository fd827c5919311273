//! Status change announcements

use discovery_api::Record;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::metrics::DiscoveryMetrics;

/// Broadcasts the full record on every status transition
#[derive(Clone)]
pub struct Announcer {
    bus: Arc<dyn EventBus>,
    address: String,
    metrics: DiscoveryMetrics,
}

impl Announcer {
    pub fn new(bus: Arc<dyn EventBus>, address: impl Into<String>, metrics: DiscoveryMetrics) -> Self {
        Self {
            bus,
            address: address.into(),
            metrics,
        }
    }

    /// Address announcements are published on
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Publish one announcement carrying the record document
    pub fn announce(&self, record: &Record) {
        match record.to_json() {
            Ok(body) => {
                let status = record.status.to_string();
                self.bus.publish(&self.address, body);
                self.metrics
                    .announcements_total
                    .with_label_values(&[status.as_str()])
                    .inc();
                debug!(
                    "Announced {} ({}) as {}",
                    record.name,
                    record.registration.as_deref().unwrap_or("-"),
                    record.status
                );
            }
            Err(e) => warn!("Cannot announce record {}: {}", record.name, e),
        }
    }
}
