//! Prometheus metrics for registry observability

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::Result;

/// Prometheus metrics collector for a discovery instance
#[derive(Clone)]
pub struct DiscoveryMetrics {
    /// Records currently published
    pub records_published: IntGauge,
    /// Announcements sent, by record status
    pub announcements_total: IntCounterVec,
    /// Usage events sent, by event type
    pub usage_events_total: IntCounterVec,
    /// Service references created and not yet released
    pub bindings_active: IntGauge,
    /// Bridges currently running
    pub bridges_active: IntGauge,
    pub registry: Arc<Registry>,
}

impl DiscoveryMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let records_published = IntGauge::new(
            "discovery_records_published",
            "Records currently published",
        )?;

        let announcements_total = IntCounterVec::new(
            Opts::new("discovery_announcements_total", "Total record announcements by status"),
            &["status"],
        )?;

        let usage_events_total = IntCounterVec::new(
            Opts::new("discovery_usage_events_total", "Total service usage events by type"),
            &["type"],
        )?;

        let bindings_active = IntGauge::new(
            "discovery_bindings_active",
            "Service references not yet released",
        )?;

        let bridges_active = IntGauge::new(
            "discovery_bridges_active",
            "Discovery bridges currently running",
        )?;

        registry.register(Box::new(records_published.clone()))?;
        registry.register(Box::new(announcements_total.clone()))?;
        registry.register(Box::new(usage_events_total.clone()))?;
        registry.register(Box::new(bindings_active.clone()))?;
        registry.register(Box::new(bridges_active.clone()))?;

        Ok(Self {
            records_published,
            announcements_total,
            usage_events_total,
            bindings_active,
            bridges_active,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::DiscoveryError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = DiscoveryMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_gather_contains_families() {
        let metrics = DiscoveryMetrics::new().unwrap();
        metrics.records_published.set(2);
        metrics.announcements_total.with_label_values(&["UP"]).inc();
        metrics.usage_events_total.with_label_values(&["bind"]).inc();

        let output = metrics.gather().unwrap();
        assert!(output.contains("discovery_records_published 2"));
        assert!(output.contains("discovery_announcements_total{status=\"UP\"} 1"));
        assert!(output.contains("discovery_usage_events_total{type=\"bind\"} 1"));
    }

    #[test]
    fn test_metrics_clone_shares_registry() {
        let metrics = DiscoveryMetrics::new().unwrap();
        let cloned = metrics.clone();
        cloned.bindings_active.inc();
        assert_eq!(metrics.bindings_active.get(), 1);
    }
}
