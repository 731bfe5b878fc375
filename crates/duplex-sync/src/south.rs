//! South: external cluster changes ingested into the authoritative store.
//!
//! Loop avoidance rests on the status field:
//! - an added object still in `INIT` is North's own create and is skipped
//! - a modified object in `UPDATE` or `DELETE` is North's own apply and is skipped
//! - `FAIL` is force-applied and clears the store tombstone so the failure
//!   stays visible
//!
//! External reports carry no version expectation: the version echoed in the
//! object annotations is the one North last pushed, not the one South last
//! wrote. A stored tombstone still rejects non-forced merges.
//!
//! A removed external object purges the store record addressed by the
//! workspace label.

use async_trait::async_trait;
use duplex_core::{CLUSTER_LABEL, Object, Record, RecordKey, SecurityGroup, SyncStatus};
use duplex_storage::DynStore;
use tracing::{debug, info};

use crate::channel::Change;
use crate::error::SyncError;
use crate::handler::{Action, ChangeHandler};

pub struct SouthIngestor {
    store: DynStore,
}

impl SouthIngestor {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    fn security_group(change: &Change) -> Result<&SecurityGroup, SyncError> {
        change
            .object
            .as_security_group()
            .ok_or_else(|| SyncError::unexpected_kind(SecurityGroup::KIND, change.object.kind()))
    }

    async fn merge(&self, record: &SecurityGroup, forced: bool) -> Result<Action, SyncError> {
        let mut incoming = record.clone();
        incoming.metadata.version = 0;
        if forced {
            incoming.metadata.is_delete = false;
        }
        let merged = self.store.apply(incoming.into(), forced, &[]).await?;
        debug!(
            key = %merged.key(),
            version = merged.version(),
            status = %record.status(),
            forced,
            "Merged external state"
        );
        Ok(Action::Merged { forced })
    }
}

#[async_trait]
impl ChangeHandler for SouthIngestor {
    fn name(&self) -> &str {
        "south"
    }

    async fn on_add(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        if record.status() == SyncStatus::Init {
            return Ok(Action::Skipped("external controller has not acted yet"));
        }

        let key = record.metadata.key();
        if self.store.get(&key).await?.is_some() {
            return self.merge(record, false).await;
        }

        let mut first = record.clone();
        first
            .metadata
            .labels
            .entry(CLUSTER_LABEL.to_string())
            .or_insert_with(|| change.source.to_string());
        self.store.create(Object::from(first)).await?;
        info!(
            key = %key,
            cluster = %change.source,
            status = %record.status(),
            "Inserted record first seen on cluster"
        );
        Ok(Action::Inserted)
    }

    async fn on_update(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        match record.status() {
            SyncStatus::Update | SyncStatus::Delete => Ok(Action::Skipped("echo of north")),
            SyncStatus::Fail => self.merge(record, true).await,
            _ => self.merge(record, false).await,
        }
    }

    async fn on_delete(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        let meta = &record.metadata;
        let key = RecordKey::new(&meta.database, &meta.kind, &meta.workspace, &meta.name);

        match self.store.purge(&key).await {
            Ok(_) => {
                info!(key = %key, cluster = %change.source, "Purged record removed from cluster");
                Ok(Action::Purged)
            }
            Err(e) if e.is_not_found() => Ok(Action::Skipped("already gone")),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for SouthIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SouthIngestor")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use duplex_db_memory::InMemoryStore;
    use duplex_storage::{EventType, RecordStore};

    fn setup() -> (SouthIngestor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (SouthIngestor::new(store.clone()), store)
    }

    fn change(event_type: EventType, record: SecurityGroup) -> Change {
        Change {
            event_type,
            object: record.into(),
            source: Arc::from("east"),
        }
    }

    fn sg(status: SyncStatus) -> SecurityGroup {
        SecurityGroup::new("db", "ws", "sg-1").with_status(status)
    }

    fn key() -> RecordKey {
        RecordKey::new("db", "SecurityGroup", "ws", "sg-1")
    }

    async fn stored(store: &InMemoryStore) -> SecurityGroup {
        store
            .get(&key())
            .await
            .unwrap()
            .and_then(Object::into_security_group)
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_init_never_touches_store() {
        let (south, store) = setup();
        let action = south
            .handle(&change(EventType::Added, sg(SyncStatus::Init)))
            .await
            .unwrap();
        assert!(action.is_skipped());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_add_first_sighting_inserts_with_cluster_label() {
        let (south, store) = setup();
        let action = south
            .handle(&change(EventType::Added, sg(SyncStatus::Active)))
            .await
            .unwrap();
        assert_eq!(action, Action::Inserted);

        let record = stored(&store).await;
        assert_eq!(record.status(), SyncStatus::Active);
        assert_eq!(record.metadata.label(CLUSTER_LABEL), Some("east"));
    }

    #[tokio::test]
    async fn test_add_existing_merges_unforced() {
        let (south, store) = setup();
        let created = store.create(sg(SyncStatus::Init).into()).await.unwrap();

        let mut incoming = sg(SyncStatus::Active);
        incoming.metadata.version = created.version();
        let action = south
            .handle(&change(EventType::Added, incoming))
            .await
            .unwrap();
        assert_eq!(action, Action::Merged { forced: false });
        assert_eq!(stored(&store).await.status(), SyncStatus::Active);
    }

    #[tokio::test]
    async fn test_add_existing_tombstone_conflict_is_surfaced() {
        let (south, store) = setup();
        store.create(sg(SyncStatus::Init).into()).await.unwrap();
        store.delete(&key()).await.unwrap();

        let err = south
            .handle(&change(EventType::Added, sg(SyncStatus::Active)))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_echo_statuses_never_mutate_store() {
        let (south, store) = setup();
        let created = store.create(sg(SyncStatus::Active).into()).await.unwrap();

        for status in [SyncStatus::Update, SyncStatus::Delete] {
            let action = south
                .handle(&change(EventType::Modified, sg(status)))
                .await
                .unwrap();
            assert!(action.is_skipped());
        }
        assert_eq!(stored(&store).await.metadata.version, created.version());
    }

    #[tokio::test]
    async fn test_consecutive_reports_ignore_echoed_version() {
        let (south, store) = setup();
        let created = store.create(sg(SyncStatus::Init).into()).await.unwrap();

        let mut active = sg(SyncStatus::Active);
        active.metadata.version = created.version();
        south
            .handle(&change(EventType::Modified, active))
            .await
            .unwrap();

        // Still carries the version North pushed, now older than the store.
        let mut ready = sg(SyncStatus::Ready);
        ready.metadata.version = created.version();
        ready.spec.external_id = "sg-abc".to_string();
        let action = south
            .handle(&change(EventType::Modified, ready))
            .await
            .unwrap();
        assert_eq!(action, Action::Merged { forced: false });

        let record = stored(&store).await;
        assert_eq!(record.status(), SyncStatus::Ready);
        assert_eq!(record.spec.external_id, "sg-abc");
        assert!(record.metadata.version > created.version());
    }

    #[tokio::test]
    async fn test_update_fail_forces_and_clears_tombstone() {
        let (south, store) = setup();
        store.create(sg(SyncStatus::Delete).into()).await.unwrap();
        store.delete(&key()).await.unwrap();

        let mut incoming = sg(SyncStatus::Fail);
        incoming.spec.message = "quota exceeded".to_string();
        incoming.metadata.version = 1;
        let action = south
            .handle(&change(EventType::Modified, incoming))
            .await
            .unwrap();
        assert_eq!(action, Action::Merged { forced: true });

        let record = stored(&store).await;
        assert!(!record.metadata.is_delete);
        assert_eq!(record.status(), SyncStatus::Fail);
        assert_eq!(record.spec.message, "quota exceeded");
    }

    #[tokio::test]
    async fn test_delete_purges_by_workspace() {
        let (south, store) = setup();
        store.create(sg(SyncStatus::Active).into()).await.unwrap();

        let mut external = sg(SyncStatus::Active);
        external.metadata.namespace = "somewhere-else".to_string();
        let action = south
            .handle(&change(EventType::Deleted, external.clone()))
            .await
            .unwrap();
        assert_eq!(action, Action::Purged);
        assert!(store.is_empty());

        let action = south
            .handle(&change(EventType::Deleted, external))
            .await
            .unwrap();
        assert!(action.is_skipped());
    }
}
