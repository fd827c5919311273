//! Runtime service discovery
//!
//! This library provides:
//! - Record store with publish/unpublish and filtered lookup
//! - Service references with usage accounting
//! - Status announcements and usage events over an event bus
//! - Bridges federating external registries

pub mod announce;
pub mod bridge;
pub mod bus;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod reference;
pub mod registry;
pub mod types;
pub mod usage;

pub use bridge::{
    BridgeContext, BridgeManager, BridgeReport, BridgeState, BridgeStopOutcome, DiscoveryBridge,
    ServicePublisher,
};
pub use bus::{EventBus, LocalEventBus};
pub use discovery::{Discovery, DiscoveryHandle};
pub use error::{DiscoveryError, Result};
pub use reference::ServiceReference;
pub use registry::RecordStore;
pub use types::{HttpEndpoint, HttpEndpointClient, ServiceInstance, ServiceType, ServiceTypes};
pub use usage::{UsageReporter, UsageType};
