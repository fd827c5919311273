//! Service discovery data model
//!
//! This library defines the types shared by the registry and its bridges:
//! - Record: published description of a discoverable service
//! - Status: lifecycle state carried by a Record
//! - DiscoveryOptions: configuration of a discovery instance

pub mod record;
pub mod options;

pub use record::{Document, Record, Status, UNKNOWN_TYPE};
pub use options::{DiscoveryOptions, DEFAULT_ANNOUNCE_ADDRESS, DEFAULT_USAGE_ADDRESS};
