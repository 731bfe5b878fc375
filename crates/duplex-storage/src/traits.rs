//! Contracts consumed by the reconciler.
//!
//! [`RecordStore`] is the authoritative store; [`ClusterClient`] is one
//! external cluster; [`ClusterConnector`] opens clients for registered
//! clusters.

use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::{Cluster, Object, ObjectList, RecordKey};
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{LabelSelector, WatchStream};

/// The authoritative record store.
///
/// Implementations must be thread-safe (`Send + Sync`) and emit a watch
/// event for every successful write.
///
/// # Example
///
/// ```ignore
/// use duplex_storage::{RecordStore, StorageError};
///
/// async fn find(store: &dyn RecordStore, key: &RecordKey) -> Result<Object, StorageError> {
///     store
///         .get(key)
///         .await?
///         .ok_or_else(|| StorageError::not_found(&key.kind, key.to_string()))
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new record, assigning its version and uuid.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the key is taken.
    async fn create(&self, object: Object) -> Result<Object, StorageError>;

    /// Merges `object` onto the stored record.
    ///
    /// With empty `field_paths` the whole spec and the labels are applied;
    /// otherwise only the listed dotted paths (for example `spec.status`)
    /// are copied.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    /// Without `force`, returns `StorageError::Deleted` when the stored record
    /// is tombstoned (unless `metadata.isDelete` is listed and cleared by the
    /// caller) and `StorageError::VersionConflict` when the caller's non-zero
    /// version differs from the stored one.
    async fn apply(
        &self,
        object: Object,
        force: bool,
        field_paths: &[&str],
    ) -> Result<Object, StorageError>;

    /// Sets the tombstone flag. Deleting a tombstoned record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn delete(&self, key: &RecordKey) -> Result<Object, StorageError>;

    /// Removes the record entirely.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn purge(&self, key: &RecordKey) -> Result<Object, StorageError>;

    /// Reads a record, tombstoned or not. `None` if absent.
    async fn get(&self, key: &RecordKey) -> Result<Option<Object>, StorageError>;

    /// Lists records of a kind, tombstoned ones included.
    async fn list(
        &self,
        database: &str,
        kind: &str,
        selector: &LabelSelector,
    ) -> Result<ObjectList, StorageError>;

    /// Watches changes to one kind.
    ///
    /// With a `resource_version`, records newer than it are replayed as
    /// `ADDED` before live events.
    async fn watch(
        &self,
        database: &str,
        kind: &str,
        resource_version: Option<u64>,
    ) -> Result<WatchStream, StorageError>;

    /// Returns the name of this store backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// One external cluster's declarative object API.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Name of the cluster this client talks to.
    fn cluster_name(&self) -> &str;

    /// Creates an object from a rendered payload.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the object exists.
    async fn create(&self, payload: &Value) -> Result<Value, StorageError>;

    /// Merge-patches the object addressed by namespace/name, creating it if
    /// absent. Returns the resulting object and whether anything changed.
    async fn apply(
        &self,
        namespace: &str,
        name: &str,
        payload: &Value,
    ) -> Result<(Value, bool), StorageError>;

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StorageError>;

    /// Reads an object. `None` if absent.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Value>, StorageError>;

    /// Watches objects of one kind. Existing objects are reported as `ADDED` first.
    async fn watch(&self, kind: &str) -> Result<WatchStream, StorageError>;
}

/// Opens clients for clusters registered in the store.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connects to a registered cluster.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionError` if the cluster is unreachable.
    async fn connect(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterClient>, StorageError>;
}
