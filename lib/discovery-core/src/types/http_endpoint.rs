//! HTTP endpoint service type

use async_trait::async_trait;
use discovery_api::{Document, Record};
use serde_json::Value;
use std::sync::Arc;

use super::{ServiceInstance, ServiceType};
use crate::{DiscoveryError, Result};

/// Type tag of HTTP endpoint records
pub const TYPE: &str = "http-endpoint";

/// Records describing a reachable HTTP server.
///
/// The location document carries `host`, `port`, `ssl`, `root` and the
/// derived `endpoint` URL.
pub struct HttpEndpoint;

impl HttpEndpoint {
    /// Build an unpublished record for an HTTP endpoint
    pub fn create_record(name: &str, host: &str, port: u16, root: &str) -> Record {
        Self::create_record_with_ssl(name, host, port, root, false)
    }

    pub fn create_record_with_ssl(name: &str, host: &str, port: u16, root: &str, ssl: bool) -> Record {
        let root = if root.starts_with('/') {
            root.to_string()
        } else {
            format!("/{}", root)
        };
        let scheme = if ssl { "https" } else { "http" };

        let mut location = Document::new();
        location.insert("host".to_string(), Value::from(host));
        location.insert("port".to_string(), Value::from(port));
        location.insert("root".to_string(), Value::from(root.clone()));
        location.insert("ssl".to_string(), Value::from(ssl));
        location.insert(
            "endpoint".to_string(),
            Value::from(format!("{}://{}:{}{}", scheme, host, port, root)),
        );

        Record::new(name).with_type(TYPE).with_location(location)
    }
}

/// Client bound to the endpoint of an HTTP endpoint record
#[derive(Clone, Debug)]
pub struct HttpEndpointClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl HttpEndpointClient {
    /// Absolute URL of `path` on this endpoint
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn endpoint_of(record: &Record) -> Option<String> {
    if let Some(endpoint) = record.location.get("endpoint").and_then(Value::as_str) {
        return Some(endpoint.to_string());
    }

    let host = record.location.get("host").and_then(Value::as_str)?;
    let ssl = record.location.get("ssl").and_then(Value::as_bool).unwrap_or(false);
    let port = record
        .location
        .get("port")
        .and_then(Value::as_u64)
        .unwrap_or(if ssl { 443 } else { 80 });
    let root = record.location.get("root").and_then(Value::as_str).unwrap_or("/");
    let scheme = if ssl { "https" } else { "http" };
    Some(format!("{}://{}:{}{}", scheme, host, port, root))
}

#[async_trait]
impl ServiceType for HttpEndpoint {
    fn name(&self) -> &str {
        TYPE
    }

    fn validate(&self, record: &Record) -> Result<()> {
        match record.location.get("host").and_then(Value::as_str) {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(DiscoveryError::InvalidRecord(format!(
                "{} has no host in its location",
                record.name
            ))),
        }
    }

    async fn resolve(&self, record: &Record) -> Result<ServiceInstance> {
        let base_url = endpoint_of(record).ok_or_else(|| DiscoveryError::Resolution {
            name: record.name.clone(),
            reason: "location has no endpoint".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DiscoveryError::Resolution {
                name: record.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Arc::new(HttpEndpointClient { client, base_url }))
    }
}
