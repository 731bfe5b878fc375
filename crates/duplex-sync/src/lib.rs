//! Bidirectional reconciliation between the authoritative store and
//! external clusters.
//!
//! - [`NorthPropagator`] pushes store changes outward.
//! - [`SouthIngestor`] merges cluster changes back into the store.
//! - [`watch_clusters`] opens one watch per registered cluster.
//! - [`EventChannel`] carries decoded changes, errors and close requests to
//!   one consumer.
//! - [`SyncService`] wires it all together with per-event task isolation.
//!
//! The two directions coordinate only through the record's status field;
//! see the `north` and `south` module docs for the transition tables.

pub mod channel;
pub mod clusters;
pub mod dispatch;
pub mod error;
pub mod fanin;
pub mod handler;
pub mod north;
pub mod render;
pub mod south;

pub use channel::{Change, ChangeReceiver, ChangeSender, ChannelMessage, EventChannel};
pub use clusters::ClusterSet;
pub use dispatch::{STORE_SOURCE, SyncOptions, SyncService};
pub use error::SyncError;
pub use fanin::{ClusterWatch, watch_clusters};
pub use handler::{Action, ChangeHandler};
pub use north::NorthPropagator;
pub use render::{decode_external, render, render_with_status};
pub use south::SouthIngestor;
