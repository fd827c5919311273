use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Registration not found: {0}")]
    NotFound(String),

    #[error("Discovery is closed")]
    Closed,

    #[error("Bridge {name} failed to start: {reason}")]
    BridgeStart { name: String, reason: String },

    #[error("Bridge {name} failed to stop: {reason}")]
    BridgeStop { name: String, reason: String },

    #[error("Cannot resolve service {name}: {reason}")]
    Resolution { name: String, reason: String },

    #[error("Service reference already released: {0}")]
    Released(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
