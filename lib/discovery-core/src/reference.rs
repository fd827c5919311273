//! Service references binding a consumer to a record's service object

use discovery_api::Record;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::metrics::DiscoveryMetrics;
use crate::types::{ServiceInstance, ServiceType};
use crate::usage::{UsageReporter, UsageType};
use crate::{DiscoveryError, Result};

/// Leased handle to the service described by a record.
///
/// The service object is resolved lazily on the first `get` and cached for
/// the lifetime of the reference. `release` is idempotent.
pub struct ServiceReference {
    record: Record,
    service_type: Arc<dyn ServiceType>,
    usage: UsageReporter,
    bindings: Arc<AtomicUsize>,
    metrics: DiscoveryMetrics,
    // Serializes resolution against release
    gate: tokio::sync::Mutex<()>,
    cached: Mutex<Option<ServiceInstance>>,
    released: AtomicBool,
}

impl ServiceReference {
    pub(crate) fn new(
        record: Record,
        service_type: Arc<dyn ServiceType>,
        usage: UsageReporter,
        bindings: Arc<AtomicUsize>,
        metrics: DiscoveryMetrics,
    ) -> Self {
        bindings.fetch_add(1, Ordering::SeqCst);
        metrics.bindings_active.inc();
        debug!("Created reference to {}", record.name);

        Self {
            record,
            service_type,
            usage,
            bindings,
            metrics,
            gate: tokio::sync::Mutex::new(()),
            cached: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    /// Record this reference was created from
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Get the service object, resolving it on first use.
    ///
    /// A failed resolution leaves the reference unresolved so the call can be
    /// retried.
    pub async fn get(&self) -> Result<ServiceInstance> {
        let _gate = self.gate.lock().await;
        if self.is_released() {
            return Err(DiscoveryError::Released(self.record.name.clone()));
        }
        if let Some(instance) = self.cached() {
            return Ok(instance);
        }

        let instance = self.service_type.resolve(&self.record).await?;
        *self.slot() = Some(instance.clone());
        self.usage.report(&self.record, UsageType::Bind);
        debug!("Bound reference to {}", self.record.name);
        Ok(instance)
    }

    /// Get the service object downcast to its concrete type
    pub async fn get_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get()
            .await?
            .downcast::<T>()
            .map_err(|_| DiscoveryError::Resolution {
                name: self.record.name.clone(),
                reason: format!("service object is not a {}", std::any::type_name::<T>()),
            })
    }

    /// Cached service object, without resolving
    pub fn cached(&self) -> Option<ServiceInstance> {
        self.slot().clone()
    }

    /// Release the reference. Only the first call has any effect.
    pub async fn release(&self) {
        let _gate = self.gate.lock().await;
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.bindings.fetch_sub(1, Ordering::SeqCst);
        self.metrics.bindings_active.dec();

        let instance = self.slot().take();
        if let Some(instance) = instance {
            self.service_type.release(instance).await;
            self.usage.report(&self.record, UsageType::Release);
        }
        debug!("Released reference to {}", self.record.name);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ServiceInstance>> {
        match self.cached.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ServiceReference {
    // Dropping without `release` frees the binding slot but sends no usage
    // event and skips the type's cleanup
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.bindings.fetch_sub(1, Ordering::SeqCst);
            self.metrics.bindings_active.dec();
            debug!("Dropped unreleased reference to {}", self.record.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Type resolving to the record name, failing the first `failures` times
    struct EchoType {
        failures: AtomicU32,
        resolutions: AtomicU32,
        releases: AtomicU32,
    }

    impl EchoType {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                resolutions: AtomicU32::new(0),
                releases: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ServiceType for EchoType {
        fn name(&self) -> &str {
            "echo"
        }

        async fn resolve(&self, record: &Record) -> Result<ServiceInstance> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(DiscoveryError::Resolution {
                    name: record.name.clone(),
                    reason: "not ready".to_string(),
                });
            }
            self.resolutions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(record.name.clone()))
        }

        async fn release(&self, _instance: ServiceInstance) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        bus: Arc<LocalEventBus>,
        usage: UsageReporter,
        bindings: Arc<AtomicUsize>,
        metrics: DiscoveryMetrics,
    }

    impl Fixture {
        fn new() -> Self {
            let bus = Arc::new(LocalEventBus::default());
            let metrics = DiscoveryMetrics::new().unwrap();
            let usage = UsageReporter::new(bus.clone(), "usage", metrics.clone());
            Self {
                bus,
                usage,
                bindings: Arc::new(AtomicUsize::new(0)),
                metrics,
            }
        }

        fn reference(&self, service_type: Arc<dyn ServiceType>) -> ServiceReference {
            ServiceReference::new(
                Record::new("Hello").with_type("echo"),
                service_type,
                self.usage.clone(),
                self.bindings.clone(),
                self.metrics.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_get_resolves_once() {
        let fixture = Fixture::new();
        let echo = EchoType::new(0);
        let reference = fixture.reference(echo.clone());

        assert!(reference.cached().is_none());
        let first = reference.get_as::<String>().await.unwrap();
        let second = reference.get_as::<String>().await.unwrap();
        assert_eq!(*first, "Hello");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(reference.cached().is_some());
        assert_eq!(echo.resolutions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_usage_events_fire_once() {
        let fixture = Fixture::new();
        let mut rx = fixture.bus.subscribe("usage");
        let echo = EchoType::new(0);
        let reference = fixture.reference(echo.clone());

        reference.get().await.unwrap();
        reference.get().await.unwrap();
        reference.release().await;
        reference.release().await;

        assert_eq!(rx.recv().await.unwrap()["type"], "bind");
        assert_eq!(rx.recv().await.unwrap()["type"], "release");
        assert!(rx.try_recv().is_err());
        assert_eq!(echo.releases.load(Ordering::SeqCst), 1);
        assert!(reference.cached().is_none());
    }

    #[tokio::test]
    async fn test_failed_resolution_can_retry() {
        let fixture = Fixture::new();
        let mut rx = fixture.bus.subscribe("usage");
        let reference = fixture.reference(EchoType::new(1));

        assert!(matches!(
            reference.get().await,
            Err(DiscoveryError::Resolution { .. })
        ));
        assert!(reference.cached().is_none());
        assert!(rx.try_recv().is_err());

        assert!(reference.get().await.is_ok());
        assert_eq!(rx.recv().await.unwrap()["type"], "bind");
    }

    #[tokio::test]
    async fn test_release_unresolved_is_silent() {
        let fixture = Fixture::new();
        let mut rx = fixture.bus.subscribe("usage");
        let reference = fixture.reference(EchoType::new(0));

        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 1);
        reference.release().await;
        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
        assert!(matches!(reference.get().await, Err(DiscoveryError::Released(_))));
    }

    #[tokio::test]
    async fn test_binding_count_converges() {
        let fixture = Fixture::new();
        let echo = EchoType::new(0);
        let references: Vec<_> = (0..5).map(|_| fixture.reference(echo.clone())).collect();
        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 5);
        assert_eq!(fixture.metrics.bindings_active.get(), 5);

        references[0].get().await.unwrap();
        for reference in &references {
            reference.release().await;
            reference.release().await;
        }
        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.metrics.bindings_active.get(), 0);
    }

    #[tokio::test]
    async fn test_drop_frees_binding() {
        let fixture = Fixture::new();
        let mut rx = fixture.bus.subscribe("usage");

        let resolved = fixture.reference(EchoType::new(0));
        resolved.get().await.unwrap();
        assert_eq!(rx.recv().await.unwrap()["type"], "bind");
        let released = fixture.reference(EchoType::new(0));
        released.release().await;
        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 1);

        drop(resolved);
        drop(released);
        assert_eq!(fixture.bindings.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.metrics.bindings_active.get(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wrong_downcast() {
        let fixture = Fixture::new();
        let reference = fixture.reference(EchoType::new(0));
        assert!(reference.get_as::<u32>().await.is_err());
        // The instance stays cached
        assert!(reference.cached().is_some());
    }
}
