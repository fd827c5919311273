//! Static record import
pub mod bridge;

pub use bridge::{StaticBridge, StaticBridgeConfig};
