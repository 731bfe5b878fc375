//! Standalone reconciler process: configuration, logging and the
//! supervised sync loop.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ClusterConfig, LoggingConfig, SyncConfig};
pub use observability::init_tracing;
pub use server::{Reconciler, ReconcilerBuilder, SYSTEM_WORKSPACE, seed_clusters};
