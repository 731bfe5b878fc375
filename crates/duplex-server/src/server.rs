use std::sync::Arc;

use duplex_core::{Cluster, KindRegistry, SharedRegistry};
use duplex_db_memory::{InMemoryClusterHub, InMemoryStore};
use duplex_storage::RecordStore;
use duplex_sync::{SyncError, SyncService};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ClusterConfig};

/// Workspace holding the registered `Cluster` records.
pub const SYSTEM_WORKSPACE: &str = "system";

/// Registers the configured clusters in the store.
///
/// Clusters already present are left as they are. Returns the number of
/// records created.
///
/// # Errors
///
/// Returns the first store error other than `AlreadyExists`.
pub async fn seed_clusters(
    store: &dyn RecordStore,
    database: &str,
    clusters: &[ClusterConfig],
) -> anyhow::Result<usize> {
    let mut created = 0;
    for cfg in clusters {
        let mut cluster = Cluster::new(database, SYSTEM_WORKSPACE, &cfg.name, &cfg.endpoint);
        cluster.spec.region = cfg.region.clone();
        cluster.spec.description = cfg.description.clone();

        match store.create(cluster.into()).await {
            Ok(_) => {
                tracing::info!(cluster = %cfg.name, endpoint = %cfg.endpoint, "Cluster registered");
                created += 1;
            }
            Err(e) if e.is_already_exists() => {
                tracing::debug!(cluster = %cfg.name, "Cluster already registered");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(created)
}

pub struct ReconcilerBuilder {
    config: AppConfig,
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Builds the in-memory backends and registers the configured clusters.
    pub async fn build(self) -> anyhow::Result<Reconciler> {
        let registry: SharedRegistry = Arc::new(KindRegistry::with_builtin_kinds());
        let store = Arc::new(InMemoryStore::with_registry(registry.clone()));
        let hub = Arc::new(InMemoryClusterHub::auto_provisioning());

        let seeded = seed_clusters(&*store, &self.config.sync.database, &self.config.clusters).await?;
        tracing::info!(
            database = %self.config.sync.database,
            clusters = seeded,
            kinds = ?registry.kinds(),
            "Reconciler initialized"
        );

        let service = Arc::new(SyncService::new(
            store.clone(),
            hub.clone(),
            registry,
            self.config.sync.to_options(),
        ));

        Ok(Reconciler {
            config: self.config,
            store,
            hub,
            service,
        })
    }
}

pub struct Reconciler {
    config: AppConfig,
    store: Arc<InMemoryStore>,
    hub: Arc<InMemoryClusterHub>,
    service: Arc<SyncService>,
}

impl Reconciler {
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<InMemoryClusterHub> {
        &self.hub
    }

    pub fn service(&self) -> &Arc<SyncService> {
        &self.service
    }

    /// Runs until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_signal(cancel.clone()));
        self.run_until(cancel).await
    }

    /// Runs the sync service, restarting it after `retry_delay` whenever
    /// fan-in fails or every event source ends, until `cancel` fires.
    pub async fn run_until(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let retry_delay = self.config.sync.retry_delay();
        loop {
            match self.service.run(cancel.clone()).await {
                Ok(()) if cancel.is_cancelled() => break,
                Err(SyncError::Cancelled) => break,
                Ok(()) => {
                    tracing::warn!(retry_in = ?retry_delay, "Event sources ended, restarting sync");
                }
                Err(e @ SyncError::NoDecoder(_)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?retry_delay, "Sync setup failed, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry_delay) => {}
            }
        }
        tracing::info!("Reconciler stopped");
        Ok(())
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();
}
