//! # duplex-storage
//!
//! Contracts for the two collaborators the reconciler talks to: the
//! authoritative [`RecordStore`] and external clusters ([`ClusterClient`],
//! opened through a [`ClusterConnector`]).
//!
//! This crate holds no backend. The in-memory implementations live in
//! `duplex-db-memory`.
//!
//! ## Example
//!
//! ```ignore
//! use duplex_storage::{LabelSelector, RecordStore, StorageError};
//!
//! async fn registered_clusters(store: &dyn RecordStore) -> Result<usize, StorageError> {
//!     let list = store.list("duplex", "Cluster", &LabelSelector::everything()).await?;
//!     Ok(list.len())
//! }
//! ```

mod error;
pub mod evented;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::ChangeFeed;
pub use traits::{ClusterClient, ClusterConnector, RecordStore};
pub use types::{EventType, LabelSelector, WatchEvent, WatchStream};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn RecordStore>;

/// Type alias for a shared connector trait object.
pub type DynConnector = std::sync::Arc<dyn ClusterConnector>;
