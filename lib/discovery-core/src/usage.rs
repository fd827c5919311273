//! Service usage events

use discovery_api::Record;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::metrics::DiscoveryMetrics;

/// Kind of usage transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Bind,
    Release,
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageType::Bind => f.write_str("bind"),
            UsageType::Release => f.write_str("release"),
        }
    }
}

/// Message body published on the usage address
#[derive(Debug, Serialize)]
pub struct UsageEvent<'a> {
    pub record: &'a Record,
    #[serde(rename = "type")]
    pub usage_type: UsageType,
    /// Unique per event, unrelated to the registration id
    pub id: String,
}

/// Publishes bind/release events for service references
#[derive(Clone)]
pub struct UsageReporter {
    bus: Arc<dyn EventBus>,
    address: String,
    metrics: DiscoveryMetrics,
}

impl UsageReporter {
    pub fn new(bus: Arc<dyn EventBus>, address: impl Into<String>, metrics: DiscoveryMetrics) -> Self {
        Self {
            bus,
            address: address.into(),
            metrics,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Publish a usage event for `record`
    pub fn report(&self, record: &Record, usage_type: UsageType) {
        let event = UsageEvent {
            record,
            usage_type,
            id: Uuid::new_v4().to_string(),
        };

        match serde_json::to_value(&event) {
            Ok(body) => {
                let label = usage_type.to_string();
                self.bus.publish(&self.address, body);
                self.metrics
                    .usage_events_total
                    .with_label_values(&[label.as_str()])
                    .inc();
                debug!("Usage event {} for {} ({})", usage_type, record.name, event.id);
            }
            Err(e) => warn!("Cannot report {} of {}: {}", usage_type, record.name, e),
        }
    }
}
