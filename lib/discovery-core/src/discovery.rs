//! Discovery service facade

use async_trait::async_trait;
use discovery_api::{Document, DiscoveryOptions, Record};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::announce::Announcer;
use crate::bridge::{BridgeContext, BridgeManager, BridgeReport, DiscoveryBridge, ServicePublisher};
use crate::bus::{EventBus, LocalEventBus};
use crate::metrics::DiscoveryMetrics;
use crate::reference::ServiceReference;
use crate::registry::RecordStore;
use crate::types::{ServiceType, ServiceTypes};
use crate::usage::UsageReporter;
use crate::{DiscoveryError, Result};

struct DiscoveryInner {
    options: DiscoveryOptions,
    store: RecordStore,
    types: Arc<ServiceTypes>,
    usage: UsageReporter,
    bindings: Arc<AtomicUsize>,
    metrics: DiscoveryMetrics,
    closed: AtomicBool,
}

impl DiscoveryInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Closed);
        }
        Ok(())
    }

    async fn publish(&self, record: Record) -> Result<Record> {
        self.ensure_open()?;
        self.store.publish(record).await
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        self.ensure_open()?;
        self.store.unpublish(registration).await.map(|_| ())
    }
}

/// Publish/unpublish handle onto a discovery instance, as seen by bridges
#[derive(Clone)]
pub struct DiscoveryHandle {
    inner: Arc<DiscoveryInner>,
}

#[async_trait]
impl ServicePublisher for DiscoveryHandle {
    async fn publish(&self, record: Record) -> Result<Record> {
        self.inner.publish(record).await
    }

    async fn unpublish(&self, registration: &str) -> Result<()> {
        self.inner.unpublish(registration).await
    }
}

/// Service discovery instance: record store, bridges, announcements and
/// usage reporting behind one API.
pub struct Discovery {
    inner: Arc<DiscoveryInner>,
    bridges: BridgeManager,
    bus: Arc<dyn EventBus>,
    local_bus: Option<Arc<LocalEventBus>>,
}

impl Discovery {
    /// Open a discovery instance on a fresh in-process event bus
    pub fn new(options: DiscoveryOptions) -> Result<Self> {
        let bus = Arc::new(LocalEventBus::default());
        let mut discovery = Self::with_bus(options, bus.clone())?;
        discovery.local_bus = Some(bus);
        Ok(discovery)
    }

    /// Open a discovery instance publishing events on `bus`
    pub fn with_bus(options: DiscoveryOptions, bus: Arc<dyn EventBus>) -> Result<Self> {
        let metrics = DiscoveryMetrics::new()?;
        let types = Arc::new(ServiceTypes::with_defaults());
        let announcer = Announcer::new(bus.clone(), options.announce_address.clone(), metrics.clone());
        let usage = UsageReporter::new(bus.clone(), options.usage_address.clone(), metrics.clone());
        let store = RecordStore::new(types.clone(), announcer, metrics.clone());

        let inner = Arc::new(DiscoveryInner {
            options: options.clone(),
            store,
            types,
            usage,
            bindings: Arc::new(AtomicUsize::new(0)),
            metrics: metrics.clone(),
            closed: AtomicBool::new(false),
        });

        let context = BridgeContext {
            discovery_name: options.name.clone(),
            bus: bus.clone(),
        };
        let handle = Arc::new(DiscoveryHandle { inner: inner.clone() });
        let bridges = BridgeManager::new(context, handle, options.bridge_stop_timeout(), metrics);

        info!(
            "Discovery {} opened (announce: {}, usage: {})",
            options.name, options.announce_address, options.usage_address
        );

        Ok(Self {
            inner,
            bridges,
            bus,
            local_bus: None,
        })
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.inner.options
    }

    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Bus announcements and usage events are published on
    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    /// The in-process bus, when this instance created one
    pub fn local_bus(&self) -> Option<Arc<LocalEventBus>> {
        self.local_bus.clone()
    }

    pub fn metrics(&self) -> &DiscoveryMetrics {
        &self.inner.metrics
    }

    /// Handle exposing only publish and unpublish
    pub fn handle(&self) -> DiscoveryHandle {
        DiscoveryHandle {
            inner: self.inner.clone(),
        }
    }

    /// Make a service type available for publication and resolution
    pub fn register_service_type(&self, service_type: Arc<dyn ServiceType>) -> Result<()> {
        self.inner.ensure_open()?;
        debug!("Registered service type {}", service_type.name());
        self.inner.types.register(service_type);
        Ok(())
    }

    /// Publish a record; the returned record carries its registration id
    pub async fn publish(&self, record: Record) -> Result<Record> {
        self.inner.publish(record).await
    }

    /// Un-publish the record registered under `registration`
    pub async fn unpublish(&self, registration: &str) -> Result<()> {
        self.inner.unpublish(registration).await
    }

    /// First record matching the filter, in store iteration order
    pub async fn get_record(&self, filter: &Document) -> Result<Option<Record>> {
        self.inner.ensure_open()?;
        Ok(self.inner.store.lookup_one(filter).await)
    }

    /// Every record matching the filter
    pub async fn get_records(&self, filter: &Document) -> Result<Vec<Record>> {
        self.inner.ensure_open()?;
        Ok(self.inner.store.lookup_all(filter).await)
    }

    /// Create an unresolved reference to the service a published record describes
    pub fn get_reference(&self, record: &Record) -> Result<ServiceReference> {
        self.inner.ensure_open()?;
        if record.registration.is_none() {
            return Err(DiscoveryError::InvalidRecord(format!(
                "{} has never been published",
                record.name
            )));
        }

        Ok(ServiceReference::new(
            record.clone(),
            self.inner.types.for_record(record),
            self.inner.usage.clone(),
            self.inner.bindings.clone(),
            self.inner.metrics.clone(),
        ))
    }

    /// Number of references created and not yet released
    pub fn bindings(&self) -> usize {
        self.inner.bindings.load(Ordering::SeqCst)
    }

    /// Start a bridge with its configuration; returns the bridge id
    pub async fn register_bridge(&self, bridge: Arc<dyn DiscoveryBridge>, config: Value) -> Result<String> {
        self.inner.ensure_open()?;
        self.bridges.register(bridge, config).await
    }

    /// Number of running bridges
    pub async fn bridge_count(&self) -> usize {
        self.bridges.bridge_count().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop every bridge, then close. Bridge stop failures are reported, not
    /// returned as errors.
    pub async fn close(&self) -> Result<Vec<BridgeReport>> {
        self.inner.ensure_open()?;
        let reports = self.bridges.close().await?;
        self.inner.closed.store(true, Ordering::SeqCst);
        info!("Discovery {} closed", self.name());
        Ok(reports)
    }
}
