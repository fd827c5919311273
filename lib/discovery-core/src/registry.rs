//! Record store mapping registration ids to published records

use crate::announce::Announcer;
use crate::filter;
use crate::metrics::DiscoveryMetrics;
use crate::types::ServiceTypes;
use crate::{DiscoveryError, Result};
use discovery_api::{Document, Record, Status};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// RecordStore maintains the published records of a discovery instance
pub struct RecordStore {
    // Map of registration id to record
    records: Arc<RwLock<HashMap<String, Record>>>,
    types: Arc<ServiceTypes>,
    announcer: Announcer,
    metrics: DiscoveryMetrics,
}

impl RecordStore {
    pub fn new(types: Arc<ServiceTypes>, announcer: Announcer, metrics: DiscoveryMetrics) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            types,
            announcer,
            metrics,
        }
    }

    /// Publish a record under a fresh registration id
    ///
    /// The UP announcement is sent while the store is still locked so it can
    /// never trail the DOWN announcement of a racing unpublish.
    pub async fn publish(&self, mut record: Record) -> Result<Record> {
        if let Some(registration) = &record.registration {
            return Err(DiscoveryError::InvalidRecord(format!(
                "{} is already published as {}",
                record.name, registration
            )));
        }
        self.types.validate(&record)?;

        let registration = Uuid::new_v4().to_string();
        record.registration = Some(registration.clone());
        if record.status == Status::Unknown {
            record.status = Status::Up;
        }

        let mut records = self.records.write().await;
        records.insert(registration.clone(), record.clone());
        self.metrics.records_published.set(records.len() as i64);
        self.announcer.announce(&record);
        drop(records);

        debug!("Published record {} as {}", record.name, registration);
        Ok(record)
    }

    /// Remove a published record and announce it DOWN
    pub async fn unpublish(&self, registration: &str) -> Result<Record> {
        let mut records = self.records.write().await;
        let mut record = records
            .remove(registration)
            .ok_or_else(|| DiscoveryError::NotFound(registration.to_string()))?;
        self.metrics.records_published.set(records.len() as i64);
        record.status = Status::Down;
        self.announcer.announce(&record);
        drop(records);

        debug!("Unpublished record {} ({})", record.name, registration);
        Ok(record)
    }

    /// First record matching the filter, in store iteration order
    pub async fn lookup_one(&self, filter: &Document) -> Option<Record> {
        let records = self.records.read().await;
        records
            .values()
            .find(|record| filter::matches(filter, record))
            .cloned()
    }

    /// Every record matching the filter
    pub async fn lookup_all(&self, filter: &Document) -> Vec<Record> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|record| filter::matches(filter, record))
            .cloned()
            .collect()
    }

    /// Get a record by registration id
    pub async fn get(&self, registration: &str) -> Result<Record> {
        let records = self.records.read().await;
        records
            .get(registration)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(registration.to_string()))
    }

    /// Get count of published records
    pub async fn record_count(&self) -> usize {
        let records = self.records.read().await;
        records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalEventBus;
    use serde_json::json;
    use std::collections::HashSet;

    fn store_with_bus() -> (RecordStore, Arc<LocalEventBus>) {
        let bus = Arc::new(LocalEventBus::default());
        let metrics = DiscoveryMetrics::new().unwrap();
        let announcer = Announcer::new(bus.clone(), "announce", metrics.clone());
        let store = RecordStore::new(Arc::new(ServiceTypes::with_defaults()), announcer, metrics);
        (store, bus)
    }

    fn filter(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_publish_assigns_registration() {
        let (store, _bus) = store_with_bus();
        let record = store.publish(Record::new("Hello")).await.unwrap();

        let registration = record.registration.clone().unwrap();
        assert_eq!(record.status, Status::Up);
        assert_eq!(store.get(&registration).await.unwrap(), record);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_keeps_explicit_status() {
        let (store, _bus) = store_with_bus();
        let record = store
            .publish(Record::new("Hello").with_status(Status::OutOfService))
            .await
            .unwrap();
        assert_eq!(record.status, Status::OutOfService);
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_record() {
        let (store, _bus) = store_with_bus();
        let result = store.publish(Record::new("")).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidRecord(_))));
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_twice_rejected() {
        let (store, _bus) = store_with_bus();
        let first = store.publish(Record::new("Hello")).await.unwrap();

        let again = store.publish(first.clone()).await;
        assert!(matches!(again, Err(DiscoveryError::InvalidRecord(_))));
        assert_eq!(store.record_count().await, 1);
        assert_eq!(
            store.get(first.registration.as_deref().unwrap()).await.unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn test_unpublish_removes_visibility() {
        let (store, _bus) = store_with_bus();
        let record = store.publish(Record::new("Hello")).await.unwrap();
        let registration = record.registration.unwrap();

        let removed = store.unpublish(&registration).await.unwrap();
        assert_eq!(removed.status, Status::Down);
        assert!(store.lookup_one(&filter(json!({"name": "Hello"}))).await.is_none());
        assert!(store.lookup_all(&Document::new()).await.is_empty());

        let again = store.unpublish(&registration).await;
        assert!(matches!(again, Err(DiscoveryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_filtered_lookup() {
        let (store, _bus) = store_with_bus();
        store.publish(Record::new("Hello").with_meta("key", "A")).await.unwrap();
        store.publish(Record::new("Hello-2").with_meta("key", "B")).await.unwrap();

        let found = store.lookup_one(&filter(json!({"key": "B"}))).await.unwrap();
        assert_eq!(found.name, "Hello-2");
        assert!(store.lookup_one(&filter(json!({"key": "C"}))).await.is_none());
        assert!(store
            .lookup_one(&filter(json!({"key": "B", "foo": "bar"})))
            .await
            .is_none());
        assert_eq!(store.lookup_all(&Document::new()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_one_is_stable() {
        let (store, _bus) = store_with_bus();
        for i in 0..8 {
            store.publish(Record::new(format!("svc-{}", i)).with_meta("group", "g")).await.unwrap();
        }

        let group = filter(json!({"group": "g"}));
        let first = store.lookup_one(&group).await.unwrap();
        for _ in 0..5 {
            assert_eq!(store.lookup_one(&group).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_announcement_ordering() {
        let (store, bus) = store_with_bus();
        let mut rx = bus.subscribe("announce");

        store.publish(Record::new("Hello")).await.unwrap();
        let second = store.publish(Record::new("Hello-2")).await.unwrap();
        store.unpublish(second.registration.as_deref().unwrap()).await.unwrap();

        let mut announces = Vec::new();
        for _ in 0..3 {
            announces.push(Record::from_json(rx.recv().await.unwrap()).unwrap());
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(announces[0].status, Status::Up);
        assert_eq!(announces[1].status, Status::Up);
        assert_eq!(announces[2].status, Status::Down);
        assert_eq!(announces[2].registration, second.registration);
    }

    #[tokio::test]
    async fn test_no_announcement_on_lookup() {
        let (store, bus) = store_with_bus();
        store.publish(Record::new("Hello")).await.unwrap();
        let mut rx = bus.subscribe("announce");

        store.lookup_one(&Document::new()).await;
        store.lookup_all(&Document::new()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_ids_unique() {
        let (store, _bus) = store_with_bus();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.publish(Record::new(format!("svc-{}", i))).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let record = handle.await.unwrap();
            assert!(ids.insert(record.registration.unwrap()));
        }
        assert_eq!(store.record_count().await, 64);
    }
}
