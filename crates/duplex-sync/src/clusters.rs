//! Connected cluster clients shared by both directions.

use std::sync::Arc;

use dashmap::DashMap;
use duplex_core::{CLUSTER_LABEL, Metadata};
use duplex_storage::ClusterClient;

/// Clients for every connected cluster, keyed by cluster name.
#[derive(Default)]
pub struct ClusterSet {
    clients: DashMap<String, Arc<dyn ClusterClient>>,
}

impl ClusterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client: Arc<dyn ClusterClient>) {
        self.clients
            .insert(client.cluster_name().to_string(), client);
    }

    /// Makes `clients` the whole set, dropping clusters not among them.
    pub fn replace(&self, clients: impl IntoIterator<Item = Arc<dyn ClusterClient>>) {
        let clients: Vec<_> = clients.into_iter().collect();
        self.clients.retain(|name, _| {
            clients.iter().any(|client| client.cluster_name() == name)
        });
        for client in clients {
            self.insert(client);
        }
    }

    pub fn clear(&self) {
        self.clients.clear();
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn ClusterClient>> {
        self.clients.remove(name).map(|(_, client)| client)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ClusterClient>> {
        self.clients.get(name).map(|entry| entry.value().clone())
    }

    /// Clusters a record is pushed to.
    ///
    /// A record labelled with a cluster goes to that cluster only (none if it
    /// is not connected); an unlabelled record goes to every cluster.
    pub fn targets(&self, metadata: &Metadata) -> Vec<Arc<dyn ClusterClient>> {
        match metadata.label(CLUSTER_LABEL) {
            Some(name) => self.get(name).into_iter().collect(),
            None => {
                let mut all: Vec<Arc<dyn ClusterClient>> =
                    self.clients.iter().map(|entry| entry.value().clone()).collect();
                all.sort_by(|a, b| a.cluster_name().cmp(b.cluster_name()));
                all
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ClusterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSet")
            .field("clusters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_db_memory::InMemoryCluster;

    #[test]
    fn test_targets_follow_cluster_label() {
        let set = ClusterSet::new();
        set.insert(Arc::new(InMemoryCluster::new("west")));
        set.insert(Arc::new(InMemoryCluster::new("east")));

        let unlabelled = Metadata::new("db", "SecurityGroup", "ws", "sg-1");
        let names: Vec<String> = set
            .targets(&unlabelled)
            .iter()
            .map(|c| c.cluster_name().to_string())
            .collect();
        assert_eq!(names, vec!["east", "west"]);

        let labelled = unlabelled.clone().with_label(CLUSTER_LABEL, "west");
        assert_eq!(set.targets(&labelled).len(), 1);

        let unknown = unlabelled.with_label(CLUSTER_LABEL, "north");
        assert!(set.targets(&unknown).is_empty());
    }

    #[test]
    fn test_replace_drops_stale_clusters() {
        let set = ClusterSet::new();
        set.insert(Arc::new(InMemoryCluster::new("east")));
        set.insert(Arc::new(InMemoryCluster::new("west")));

        let north: Arc<dyn ClusterClient> = Arc::new(InMemoryCluster::new("north"));
        let east: Arc<dyn ClusterClient> = Arc::new(InMemoryCluster::new("east"));
        set.replace([east, north]);
        assert_eq!(set.names(), vec!["east", "north"]);

        set.clear();
        assert!(set.is_empty());
    }
}
