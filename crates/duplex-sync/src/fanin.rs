//! Multi-cluster fan-in: one watch per registered cluster.

use std::sync::Arc;

use duplex_core::{Cluster, Record};
use duplex_storage::{ClusterClient, ClusterConnector, LabelSelector, RecordStore, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::SyncError;

/// An open watch on one cluster.
pub struct ClusterWatch {
    pub cluster: Cluster,
    pub client: Arc<dyn ClusterClient>,
    pub stream: WatchStream,
}

impl std::fmt::Debug for ClusterWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterWatch")
            .field("cluster", &self.cluster.name())
            .finish_non_exhaustive()
    }
}

/// Opens a `kind` watch on every cluster registered in `database`.
///
/// Tombstoned cluster records are skipped. The call is all-or-nothing: the
/// first connect or watch failure drops the watches opened so far and is
/// returned, and the caller retries the whole fan-in.
///
/// # Errors
///
/// Returns `SyncError::Cancelled` when `cancel` fires during setup,
/// `SyncError::External` when a cluster cannot be reached or watched, and
/// `SyncError::Store` when the cluster list cannot be read.
pub async fn watch_clusters(
    store: &dyn RecordStore,
    connector: &dyn ClusterConnector,
    database: &str,
    kind: &str,
    cancel: &CancellationToken,
) -> Result<Vec<ClusterWatch>, SyncError> {
    let everything = LabelSelector::everything();
    let registered = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        list = store.list(database, Cluster::KIND, &everything) => list?,
    };

    let mut watches = Vec::with_capacity(registered.len());
    for object in registered {
        if object.is_deleted() {
            continue;
        }
        let Some(cluster) = object.into_cluster() else {
            continue;
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            opened = open(connector, &cluster, kind) => opened,
        };

        match opened {
            Ok((client, stream)) => {
                info!(cluster = cluster.name(), kind, "Watching cluster");
                watches.push(ClusterWatch {
                    cluster,
                    client,
                    stream,
                });
            }
            Err(e) => {
                warn!(
                    cluster = cluster.name(),
                    opened = watches.len(),
                    error = %e,
                    "Cluster fan-in failed, releasing opened watches"
                );
                return Err(e);
            }
        }
    }

    Ok(watches)
}

async fn open(
    connector: &dyn ClusterConnector,
    cluster: &Cluster,
    kind: &str,
) -> Result<(Arc<dyn ClusterClient>, WatchStream), SyncError> {
    let client = connector
        .connect(cluster)
        .await
        .map_err(|e| SyncError::external(cluster.name(), e))?;
    let stream = client
        .watch(kind)
        .await
        .map_err(|e| SyncError::external(cluster.name(), e))?;
    Ok((client, stream))
}
