use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::{KindRegistry, Object, ObjectList, RecordKey, SharedRegistry};
use duplex_storage::{
    ChangeFeed, EventType, LabelSelector, RecordStore, StorageError, WatchEvent, WatchStream,
};
use futures_util::StreamExt;
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::paths;

const IS_DELETE_PATH: &str = "metadata.isDelete";

/// In-memory authoritative store using papaya lock-free HashMap.
///
/// Reads are lock-free. Writes are serialized so that each read-modify-write
/// and its watch event happen atomically with respect to other writers.
pub struct InMemoryStore {
    data: Arc<PapayaHashMap<RecordKey, Object>>,
    feed: ChangeFeed,
    registry: SharedRegistry,
    writes: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an empty store that decodes the built-in kinds.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(KindRegistry::with_builtin_kinds()))
    }

    /// Creates an empty store decoding merged records through `registry`.
    pub fn with_registry(registry: SharedRegistry) -> Self {
        Self {
            data: Arc::new(PapayaHashMap::new()),
            feed: ChangeFeed::new(),
            registry,
            writes: Mutex::new(()),
        }
    }

    /// Number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event_type: EventType, object: &Object) {
        self.feed.publish(WatchEvent::new(
            event_type,
            object.kind(),
            Value::Object(object.to_attributes()),
        ));
    }

    /// Builds the record an apply would store, without the version bump.
    fn merge(
        &self,
        stored: &Object,
        incoming: &Object,
        force: bool,
        field_paths: &[&str],
    ) -> Result<Object, StorageError> {
        let mut attrs = stored.to_attributes();
        let source = incoming.to_attributes();

        if field_paths.is_empty() {
            paths::copy(&mut attrs, &source, "spec");
        } else {
            for path in field_paths {
                paths::copy(&mut attrs, &source, path);
            }
        }

        let mut merged = self.registry.decode(stored.kind(), &attrs)?;
        if merged.key() != stored.key() {
            return Err(StorageError::invalid_record(format!(
                "apply may not change the address of {}",
                stored.key()
            )));
        }

        let meta = merged.metadata_mut();
        if field_paths.is_empty() {
            meta.labels.extend(incoming.metadata().labels.clone());
            if !incoming.metadata().namespace.is_empty() {
                meta.namespace = incoming.metadata().namespace.clone();
            }
            if force {
                meta.is_delete = incoming.metadata().is_delete;
            }
        }
        meta.uuid = stored.metadata().uuid.clone();
        meta.version = stored.version();
        Ok(merged)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("records", &self.len())
            .field("feed", &self.feed)
            .finish()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create(&self, mut object: Object) -> Result<Object, StorageError> {
        let _write = self.writes.lock().await;
        let key = object.key();
        let guard = self.data.pin();

        if guard.get(&key).is_some() {
            return Err(StorageError::already_exists(&key.kind, key.to_string()));
        }

        object.generate_version();
        guard.insert(key.clone(), object.clone());
        debug!(key = %key, version = object.version(), "Created record");
        self.publish(EventType::Added, &object);
        Ok(object)
    }

    async fn apply(
        &self,
        object: Object,
        force: bool,
        field_paths: &[&str],
    ) -> Result<Object, StorageError> {
        let _write = self.writes.lock().await;
        let key = object.key();
        let guard = self.data.pin();

        let stored = guard
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(&key.kind, key.to_string()))?;

        if !force {
            let undeletes =
                field_paths.contains(&IS_DELETE_PATH) && !object.metadata().is_delete;
            if stored.is_deleted() && !undeletes {
                return Err(StorageError::deleted(key.to_string()));
            }
            if object.version() != 0 && object.version() != stored.version() {
                return Err(StorageError::version_conflict(
                    key.to_string(),
                    object.version(),
                    stored.version(),
                ));
            }
        }

        let mut merged = self.merge(&stored, &object, force, field_paths)?;
        merged.generate_version();
        guard.insert(key.clone(), merged.clone());
        debug!(key = %key, version = merged.version(), force, "Applied record");
        self.publish(EventType::Modified, &merged);
        Ok(merged)
    }

    async fn delete(&self, key: &RecordKey) -> Result<Object, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.data.pin();

        let mut object = guard
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(&key.kind, key.to_string()))?;
        if object.is_deleted() {
            return Ok(object);
        }

        object.delete();
        object.generate_version();
        guard.insert(key.clone(), object.clone());
        debug!(key = %key, "Tombstoned record");
        self.publish(EventType::Deleted, &object);
        Ok(object)
    }

    async fn purge(&self, key: &RecordKey) -> Result<Object, StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.data.pin();

        let object = guard
            .remove(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(&key.kind, key.to_string()))?;
        debug!(key = %key, "Purged record");
        self.publish(EventType::Removed, &object);
        Ok(object)
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Object>, StorageError> {
        Ok(self.data.pin().get(key).cloned())
    }

    async fn list(
        &self,
        database: &str,
        kind: &str,
        selector: &LabelSelector,
    ) -> Result<ObjectList, StorageError> {
        let guard = self.data.pin();
        let mut items: Vec<Object> = guard
            .iter()
            .filter(|(key, object)| {
                key.database == database && key.kind == kind && selector.matches(object.metadata())
            })
            .map(|(_, object)| object.clone())
            .collect();
        items.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(ObjectList::new(items))
    }

    async fn watch(
        &self,
        database: &str,
        kind: &str,
        resource_version: Option<u64>,
    ) -> Result<WatchStream, StorageError> {
        let receiver = self.feed.subscribe();

        let replay = match resource_version {
            Some(since) => self
                .list(database, kind, &LabelSelector::everything())
                .await?
                .into_iter()
                .filter(|object| object.version() > since)
                .map(|object| {
                    // Tombstones replay as deletions so teardown is not lost.
                    let event_type = if object.is_deleted() {
                        EventType::Deleted
                    } else {
                        EventType::Added
                    };
                    WatchEvent::new(
                        event_type,
                        object.kind(),
                        Value::Object(object.to_attributes()),
                    )
                })
                .collect(),
            None => Vec::new(),
        };

        let database = database.to_string();
        let stream = ChangeFeed::into_stream(receiver, kind, replay).filter(move |item| {
            let keep = match item {
                Ok(event) => {
                    event.object.pointer("/metadata/database").and_then(Value::as_str)
                        == Some(database.as_str())
                }
                Err(_) => true,
            };
            std::future::ready(keep)
        });
        Ok(stream.boxed())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::{Record, SecurityGroup, SyncStatus};

    fn sg(name: &str) -> Object {
        SecurityGroup::new("db", "ws", name)
            .with_status(SyncStatus::Init)
            .into()
    }

    #[tokio::test]
    async fn test_create_assigns_version_and_uuid() {
        let store = InMemoryStore::new();
        let created = store.create(sg("sg-1")).await.unwrap();
        assert!(created.version() > 0);
        assert!(!created.metadata().uuid.is_empty());

        let err = store.create(sg("sg-1")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_apply_field_paths_only_touches_listed_fields() {
        let store = InMemoryStore::new();
        let created = store.create(sg("sg-1")).await.unwrap();

        let mut incoming = created.clone().into_security_group().unwrap();
        incoming.spec.status = SyncStatus::Active;
        incoming.spec.message = "ignored".to_string();

        let applied = store
            .apply(incoming.into(), false, &["spec.status"])
            .await
            .unwrap();
        let applied = applied.into_security_group().unwrap();
        assert_eq!(applied.status(), SyncStatus::Active);
        assert!(applied.spec.message.is_empty());
        assert!(applied.metadata.version > created.version());
        assert_eq!(applied.metadata.uuid, created.metadata().uuid);
    }

    #[tokio::test]
    async fn test_apply_rejects_stale_version() {
        let store = InMemoryStore::new();
        let created = store.create(sg("sg-1")).await.unwrap();
        store.apply(created.clone(), false, &[]).await.unwrap();

        let err = store.apply(created.clone(), false, &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { .. }));

        store.apply(created, true, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_rejects_tombstone_unless_forced_or_undeleting() {
        let store = InMemoryStore::new();
        let created = store.create(sg("sg-1")).await.unwrap();
        let key = created.key();
        store.delete(&key).await.unwrap();

        let mut incoming = created.clone();
        incoming.metadata_mut().version = 0;
        let err = store.apply(incoming.clone(), false, &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Deleted { .. }));

        let revived = store
            .apply(incoming.clone(), false, &["metadata.isDelete"])
            .await
            .unwrap();
        assert!(!revived.is_deleted());

        store.delete(&key).await.unwrap();
        let forced = store.apply(incoming, true, &[]).await.unwrap();
        assert!(!forced.is_deleted());
    }

    #[tokio::test]
    async fn test_unforced_full_apply_ignores_incoming_tombstone() {
        let store = InMemoryStore::new();
        let created = store.create(sg("sg-1")).await.unwrap();
        let mut incoming = created.clone();
        incoming.delete();
        let applied = store.apply(incoming, false, &[]).await.unwrap();
        assert!(!applied.is_deleted());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_purge_removes() {
        let store = InMemoryStore::new();
        let key = store.create(sg("sg-1")).await.unwrap().key();

        let first = store.delete(&key).await.unwrap();
        let second = store.delete(&key).await.unwrap();
        assert!(first.is_deleted());
        assert_eq!(first.version(), second.version());

        store.purge(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.purge(&key).await.unwrap_err().is_not_found());
        assert!(store.delete(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_labels() {
        let store = InMemoryStore::new();
        let mut labelled = SecurityGroup::new("db", "ws", "sg-a");
        labelled.metadata.labels.insert("cluster".into(), "east".into());
        store.create(labelled.into()).await.unwrap();
        store.create(sg("sg-b")).await.unwrap();
        store
            .create(duplex_core::Cluster::new("db", "ws", "east", "mem://east").into())
            .await
            .unwrap();

        let all = store
            .list("db", SecurityGroup::KIND, &LabelSelector::everything())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let east = store
            .list(
                "db",
                SecurityGroup::KIND,
                &LabelSelector::everything().with_label("cluster", "east"),
            )
            .await
            .unwrap();
        assert_eq!(east.len(), 1);
        assert_eq!(east.items[0].name(), "sg-a");

        let other_db = store
            .list("other", SecurityGroup::KIND, &LabelSelector::everything())
            .await
            .unwrap();
        assert!(other_db.is_empty());
    }

    #[tokio::test]
    async fn test_watch_reports_every_write() {
        let store = InMemoryStore::new();
        let mut stream = store.watch("db", SecurityGroup::KIND, None).await.unwrap();

        let key = store.create(sg("sg-1")).await.unwrap().key();
        store.delete(&key).await.unwrap();
        store.purge(&key).await.unwrap();

        let kinds: Vec<EventType> = vec![
            stream.next().await.unwrap().unwrap().event_type,
            stream.next().await.unwrap().unwrap().event_type,
            stream.next().await.unwrap().unwrap().event_type,
        ];
        assert_eq!(
            kinds,
            vec![EventType::Added, EventType::Deleted, EventType::Removed]
        );
    }

    #[tokio::test]
    async fn test_watch_replays_newer_records() {
        let store = InMemoryStore::new();
        let first = store.create(sg("sg-1")).await.unwrap();
        store.create(sg("sg-2")).await.unwrap();

        let mut stream = store
            .watch("db", SecurityGroup::KIND, Some(first.version()))
            .await
            .unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(
            event.object.pointer("/metadata/name"),
            Some(&serde_json::json!("sg-2"))
        );
    }

    #[tokio::test]
    async fn test_watch_replays_tombstones_as_deleted() {
        let store = InMemoryStore::new();
        let key = store.create(sg("sg-1")).await.unwrap().key();
        store.create(sg("sg-2")).await.unwrap();
        store.delete(&key).await.unwrap();

        let mut stream = store
            .watch("db", SecurityGroup::KIND, Some(0))
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, EventType::Deleted);
        assert_eq!(
            first.object.pointer("/metadata/name"),
            Some(&serde_json::json!("sg-1"))
        );
        assert_eq!(second.event_type, EventType::Added);
    }
}
