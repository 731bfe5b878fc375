//! In-memory backends for the duplex reconciler.
//!
//! This crate provides an in-memory implementation of the `RecordStore`
//! trait from `duplex-storage`, using papaya lock-free HashMap for concurrent
//! access, plus in-memory external clusters behind a `ClusterConnector`.
//!
//! # Example
//!
//! ```ignore
//! use duplex_db_memory::{InMemoryClusterHub, InMemoryStore};
//! use duplex_storage::RecordStore;
//!
//! let store = InMemoryStore::new();
//! let hub = InMemoryClusterHub::auto_provisioning();
//!
//! let sg = SecurityGroup::new("duplex", "team-a", "web").with_status(SyncStatus::Init);
//! let created = store.create(sg.into()).await?;
//! ```

mod cluster;
mod paths;
mod store;

pub use cluster::{InMemoryCluster, InMemoryClusterHub};
pub use store::InMemoryStore;

// Re-export the contracts for convenience
pub use duplex_storage::{ClusterClient, ClusterConnector, RecordStore, StorageError};

/// Creates a new shareable in-memory store.
pub fn create_store() -> duplex_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
