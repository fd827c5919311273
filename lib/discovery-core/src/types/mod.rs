//! Service types interpreting record locations

pub mod http_endpoint;

use async_trait::async_trait;
use discovery_api::{Record, UNKNOWN_TYPE};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{DiscoveryError, Result};

pub use http_endpoint::{HttpEndpoint, HttpEndpointClient};

/// Live object a service reference resolves to
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Codec for one kind of service
#[async_trait]
pub trait ServiceType: Send + Sync {
    /// Type tag matched against `Record::service_type`
    fn name(&self) -> &str;

    /// Check that a record carries what this type needs, called on publish
    fn validate(&self, _record: &Record) -> Result<()> {
        Ok(())
    }

    /// Build the service object described by the record
    async fn resolve(&self, record: &Record) -> Result<ServiceInstance>;

    /// Clean up a resolved instance when its reference is released
    async fn release(&self, _instance: ServiceInstance) {}
}

/// Type of records that do not declare a known kind; they can be published
/// and looked up but never resolved
pub struct UnknownType;

#[async_trait]
impl ServiceType for UnknownType {
    fn name(&self) -> &str {
        UNKNOWN_TYPE
    }

    async fn resolve(&self, record: &Record) -> Result<ServiceInstance> {
        Err(DiscoveryError::Resolution {
            name: record.name.clone(),
            reason: format!("records of type '{}' cannot be resolved", UNKNOWN_TYPE),
        })
    }
}

/// Service types known to a discovery instance, keyed by name
pub struct ServiceTypes {
    types: RwLock<HashMap<String, Arc<dyn ServiceType>>>,
}

impl ServiceTypes {
    /// Create a registry holding only the unknown type
    pub fn new() -> Self {
        let types = Self {
            types: RwLock::new(HashMap::new()),
        };
        types.register(Arc::new(UnknownType));
        types
    }

    /// Create a registry holding the built-in types
    pub fn with_defaults() -> Self {
        let types = Self::new();
        types.register(Arc::new(HttpEndpoint));
        types
    }

    /// Register a type, replacing any previous type with the same name
    pub fn register(&self, service_type: Arc<dyn ServiceType>) {
        let mut types = match self.types.write() {
            Ok(types) => types,
            Err(poisoned) => poisoned.into_inner(),
        };
        types.insert(service_type.name().to_string(), service_type);
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceType>> {
        let types = match self.types.read() {
            Ok(types) => types,
            Err(poisoned) => poisoned.into_inner(),
        };
        types.get(name).cloned()
    }

    /// Type interpreting `record`, falling back to the unknown type
    pub fn for_record(&self, record: &Record) -> Arc<dyn ServiceType> {
        self.get(&record.service_type)
            .or_else(|| self.get(UNKNOWN_TYPE))
            .unwrap_or_else(|| Arc::new(UnknownType))
    }

    /// Validate a record against its declared type
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.name.is_empty() {
            return Err(DiscoveryError::InvalidRecord("record has no name".to_string()));
        }

        let service_type = self.get(&record.service_type).ok_or_else(|| {
            DiscoveryError::InvalidRecord(format!(
                "{} declares unsupported type '{}'",
                record.name, record.service_type
            ))
        })?;
        service_type.validate(record)
    }
}

impl Default for ServiceTypes {
    fn default() -> Self {
        Self::with_defaults()
    }
}
