//! Publish/subscribe transport for announcements and usage events

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

/// Transport carrying structured messages to subscribers of an address
pub trait EventBus: Send + Sync {
    /// Publish a message without waiting for subscribers
    fn publish(&self, address: &str, body: Value);
}

/// In-process event bus backed by one broadcast channel per address
pub struct LocalEventBus {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl LocalEventBus {
    /// Create a bus whose channels buffer `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to every message published on `address` from now on
    pub fn subscribe(&self, address: &str) -> broadcast::Receiver<Value> {
        if let Ok(channels) = self.channels.read() {
            if let Some(tx) = channels.get(address) {
                return tx.subscribe();
            }
        }

        let mut channels = match self.channels.write() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(address.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus for LocalEventBus {
    fn publish(&self, address: &str, body: Value) {
        let channels = match self.channels.read() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        match channels.get(address) {
            // Err only means nobody is listening right now
            Some(tx) => {
                let _ = tx.send(body);
            }
            None => trace!("No subscribers on {}", address),
        }
    }
}
