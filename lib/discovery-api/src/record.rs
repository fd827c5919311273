//! Service records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Structured key/value document used for record locations, metadata and lookup filters
pub type Document = Map<String, Value>;

/// Type tag of records that do not declare one
pub const UNKNOWN_TYPE: &str = "unknown";

/// Status of a published record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Up,
    Down,
    OutOfService,
    #[default]
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::OutOfService => "OUT_OF_SERVICE",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Description of a discoverable service.
///
/// A record with a `registration` is published; records without one are
/// construction objects that lookups never see.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Human label, not unique
    #[serde(default)]
    pub name: String,
    /// Service kind, selects the service type interpreting `location`
    #[serde(rename = "type", default = "default_type")]
    pub service_type: String,
    /// Where the service lives, opaque to the registry
    #[serde(default)]
    pub location: Document,
    /// Arbitrary key/value pairs used for filtering
    #[serde(default)]
    pub metadata: Document,
    #[serde(default)]
    pub status: Status,
    /// Assigned by the registry on publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

fn default_type() -> String {
    UNKNOWN_TYPE.to_string()
}

impl Default for Record {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_type: default_type(),
            location: Document::new(),
            metadata: Document::new(),
            status: Status::default(),
            registration: None,
        }
    }
}

impl Record {
    /// Create an unpublished record of unknown type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    pub fn with_location(mut self, location: Document) -> Self {
        self.location = location;
        self
    }

    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Whether the registry has assigned a registration id
    pub fn is_published(&self) -> bool {
        self.registration.is_some()
    }

    /// Serialize the record into a structured document
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Parse a record from a structured document
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_is_unpublished() {
        let record = Record::new("Hello");
        assert_eq!(record.service_type, UNKNOWN_TYPE);
        assert_eq!(record.status, Status::Unknown);
        assert!(!record.is_published());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(Status::Up).unwrap(), json!("UP"));
        assert_eq!(serde_json::to_value(Status::OutOfService).unwrap(), json!("OUT_OF_SERVICE"));
        assert_eq!(Status::Down.to_string(), "DOWN");
    }

    #[test]
    fn test_record_document_fields() {
        let mut record = Record::new("Hello")
            .with_type("http-endpoint")
            .with_meta("key", "A")
            .with_status(Status::Up);
        record.location.insert("endpoint".to_string(), json!("address"));
        record.registration = Some("reg-1".to_string());

        let doc = record.to_json().unwrap();
        assert_eq!(doc["name"], "Hello");
        assert_eq!(doc["type"], "http-endpoint");
        assert_eq!(doc["location"]["endpoint"], "address");
        assert_eq!(doc["metadata"]["key"], "A");
        assert_eq!(doc["status"], "UP");
        assert_eq!(doc["registration"], "reg-1");

        assert_eq!(Record::from_json(doc).unwrap(), record);
    }

    #[test]
    fn test_missing_fields_default() {
        let record = Record::from_json(json!({"name": "bare"})).unwrap();
        assert_eq!(record.service_type, UNKNOWN_TYPE);
        assert!(record.location.is_empty());
        assert!(record.registration.is_none());
    }
}
