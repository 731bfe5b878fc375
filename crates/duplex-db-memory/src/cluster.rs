//! In-memory external clusters.
//!
//! [`InMemoryCluster`] behaves like a declarative object API: objects are
//! addressed by namespace/name, `apply` is a JSON merge patch and every
//! write bumps `metadata.resourceVersion`. [`InMemoryClusterHub`] hands out
//! clusters by name.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use duplex_core::Cluster;
use duplex_storage::{
    ChangeFeed, ClusterClient, ClusterConnector, EventType, StorageError, WatchEvent, WatchStream,
};
use papaya::HashMap as PapayaHashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

type ObjectKey = (String, String);

fn object_key(payload: &Value) -> Result<ObjectKey, StorageError> {
    let name = payload
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StorageError::invalid_record("metadata.name is required"))?;
    let namespace = payload
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok((namespace.to_string(), name.to_string()))
}

fn kind_of(payload: &Value) -> &str {
    payload.get("kind").and_then(Value::as_str).unwrap_or_default()
}

fn set_metadata(payload: &mut Value, field: &str, value: Value) {
    if !payload.is_object() {
        *payload = Value::Object(Map::new());
    }
    if let Some(root) = payload.as_object_mut() {
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(field.to_string(), value);
        }
    }
}

/// One in-memory cluster.
pub struct InMemoryCluster {
    name: String,
    objects: PapayaHashMap<ObjectKey, Value>,
    feed: ChangeFeed,
    resource_version: AtomicU64,
    writes: Mutex<()>,
}

impl InMemoryCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: PapayaHashMap::new(),
            feed: ChangeFeed::new(),
            resource_version: AtomicU64::new(1),
            writes: Mutex::new(()),
        }
    }

    fn next_resource_version(&self) -> Value {
        Value::String(
            self.resource_version
                .fetch_add(1, Ordering::SeqCst)
                .to_string(),
        )
    }

    fn publish(&self, event_type: EventType, object: &Value) {
        self.feed
            .publish(WatchEvent::new(event_type, kind_of(object), object.clone()));
    }

    /// Snapshot of every object, ordered by namespace/name.
    pub fn objects(&self) -> Vec<Value> {
        let guard = self.objects.pin();
        let mut entries: Vec<(&ObjectKey, &Value)> = guard.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, object)| object.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("name", &self.name)
            .field("objects", &self.len())
            .finish()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn create(&self, payload: &Value) -> Result<Value, StorageError> {
        let _write = self.writes.lock().await;
        let key = object_key(payload)?;
        let guard = self.objects.pin();

        if guard.get(&key).is_some() {
            return Err(StorageError::already_exists(
                kind_of(payload),
                format!("{}/{}", key.0, key.1),
            ));
        }

        let mut object = payload.clone();
        set_metadata(&mut object, "resourceVersion", self.next_resource_version());
        guard.insert(key, object.clone());
        debug!(cluster = %self.name, kind = kind_of(&object), "Created object");
        self.publish(EventType::Added, &object);
        Ok(object)
    }

    async fn apply(
        &self,
        namespace: &str,
        name: &str,
        payload: &Value,
    ) -> Result<(Value, bool), StorageError> {
        let _write = self.writes.lock().await;
        let key = (namespace.to_string(), name.to_string());
        let guard = self.objects.pin();

        let before = guard.get(&key).cloned();
        let mut object = before.clone().unwrap_or_else(|| Value::Object(Map::new()));
        json_patch::merge(&mut object, payload);
        set_metadata(&mut object, "namespace", Value::String(namespace.to_string()));
        set_metadata(&mut object, "name", Value::String(name.to_string()));

        if before.as_ref() == Some(&object) {
            return Ok((object, false));
        }

        set_metadata(&mut object, "resourceVersion", self.next_resource_version());
        guard.insert(key, object.clone());
        let event_type = if before.is_some() {
            EventType::Modified
        } else {
            EventType::Added
        };
        debug!(cluster = %self.name, namespace, name, event_type = %event_type, "Applied object");
        self.publish(event_type, &object);
        Ok((object, true))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let key = (namespace.to_string(), name.to_string());
        let guard = self.objects.pin();

        let object = guard
            .remove(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found("object", format!("{namespace}/{name}")))?;
        debug!(cluster = %self.name, namespace, name, "Deleted object");
        self.publish(EventType::Deleted, &object);
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Value>, StorageError> {
        let key = (namespace.to_string(), name.to_string());
        Ok(self.objects.pin().get(&key).cloned())
    }

    async fn watch(&self, kind: &str) -> Result<WatchStream, StorageError> {
        let receiver = self.feed.subscribe();
        let replay = self
            .objects()
            .into_iter()
            .filter(|object| kind_of(object) == kind)
            .map(|object| WatchEvent::new(EventType::Added, kind, object))
            .collect();
        Ok(ChangeFeed::into_stream(receiver, kind, replay))
    }
}

/// Named in-memory clusters, handed out by [`ClusterConnector::connect`].
#[derive(Debug, Default)]
pub struct InMemoryClusterHub {
    clusters: DashMap<String, Arc<InMemoryCluster>>,
    auto_provision: bool,
}

impl InMemoryClusterHub {
    /// A hub that only connects to clusters added with [`Self::add_cluster`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub that creates an empty cluster on first connect.
    pub fn auto_provisioning() -> Self {
        Self {
            clusters: DashMap::new(),
            auto_provision: true,
        }
    }

    /// Adds a cluster, or returns the existing one with that name.
    pub fn add_cluster(&self, name: &str) -> Arc<InMemoryCluster> {
        self.clusters
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(cluster = name, "Provisioned in-memory cluster");
                Arc::new(InMemoryCluster::new(name))
            })
            .clone()
    }

    pub fn cluster(&self, name: &str) -> Option<Arc<InMemoryCluster>> {
        self.clusters.get(name).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ClusterConnector for InMemoryClusterHub {
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterClient>, StorageError> {
        let name = cluster.name();
        let client = match self.cluster(name) {
            Some(client) => client,
            None if self.auto_provision => self.add_cluster(name),
            None => {
                return Err(StorageError::connection_error(format!(
                    "cluster {name} is not reachable"
                )));
            }
        };
        Ok(client as Arc<dyn ClusterClient>)
    }
}
