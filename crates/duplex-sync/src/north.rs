//! North: authoritative store changes pushed to external clusters.
//!
//! | store event | acts when        | cluster call                       |
//! |-------------|------------------|------------------------------------|
//! | added       | status `INIT`    | create                             |
//! | added       | tombstoned       | same as deleted                    |
//! | modified    | status `UPDATE`  | apply                              |
//! | deleted     | always           | apply with status forced to DELETE |
//! | removed     | never            |                                    |
//!
//! Cluster failures are logged and the change is dropped. There is no retry
//! at this layer.

use std::sync::Arc;

use async_trait::async_trait;
use duplex_core::{Record, SecurityGroup, SyncStatus};
use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::Change;
use crate::clusters::ClusterSet;
use crate::error::SyncError;
use crate::handler::{Action, ChangeHandler};
use crate::render;

pub struct NorthPropagator {
    clusters: Arc<ClusterSet>,
}

impl NorthPropagator {
    pub fn new(clusters: Arc<ClusterSet>) -> Self {
        Self { clusters }
    }

    fn security_group(change: &Change) -> Result<&SecurityGroup, SyncError> {
        change
            .object
            .as_security_group()
            .ok_or_else(|| SyncError::unexpected_kind(SecurityGroup::KIND, change.object.kind()))
    }

    /// Applies `payload` on every target cluster.
    async fn apply_everywhere(
        &self,
        record: &SecurityGroup,
        payload: &Value,
    ) -> Result<Action, SyncError> {
        let targets = self.clusters.targets(&record.metadata);
        if targets.is_empty() {
            return Ok(Action::Skipped("no target cluster connected"));
        }

        let namespace = render::external_namespace(record);
        let name = &record.metadata.name;
        let mut applied = 0;
        let mut changed = 0;
        let mut last_error = None;

        for client in targets {
            match client.apply(namespace, name, payload).await {
                Ok((_, mutated)) => {
                    applied += 1;
                    if mutated {
                        changed += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        cluster = client.cluster_name(),
                        workspace = %record.metadata.workspace,
                        name = %name,
                        error = %e,
                        "Cluster apply failed"
                    );
                    last_error = Some(SyncError::external(client.cluster_name(), e));
                }
            }
        }

        match last_error {
            Some(error) if applied == 0 => Err(error),
            _ => Ok(Action::Applied {
                clusters: applied,
                changed,
            }),
        }
    }
}

#[async_trait]
impl ChangeHandler for NorthPropagator {
    fn name(&self) -> &str {
        "north"
    }

    async fn on_add(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        if record.metadata.is_delete {
            return self.on_delete(change).await;
        }
        if record.status() != SyncStatus::Init {
            return Ok(Action::Skipped("not pending creation"));
        }

        let targets = self.clusters.targets(&record.metadata);
        if targets.is_empty() {
            return Ok(Action::Skipped("no target cluster connected"));
        }

        let payload = render::render(record);
        let mut created = 0;
        let mut last_error = None;

        for client in targets {
            match client.create(&payload).await {
                Ok(_) => {
                    created += 1;
                    debug!(
                        cluster = client.cluster_name(),
                        name = %record.metadata.name,
                        "Created external object"
                    );
                }
                // Replayed INIT records that were already pushed.
                Err(e) if e.is_already_exists() => {
                    debug!(
                        cluster = client.cluster_name(),
                        name = %record.metadata.name,
                        "External object already exists"
                    );
                }
                Err(e) => {
                    warn!(
                        cluster = client.cluster_name(),
                        workspace = %record.metadata.workspace,
                        name = %record.metadata.name,
                        error = %e,
                        "Cluster create failed"
                    );
                    last_error = Some(SyncError::external(client.cluster_name(), e));
                }
            }
        }

        match last_error {
            Some(error) if created == 0 => Err(error),
            _ => Ok(Action::Created { clusters: created }),
        }
    }

    async fn on_update(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        if record.status() != SyncStatus::Update {
            return Ok(Action::Skipped("not pending update"));
        }
        let payload = render::render_with_status(record, SyncStatus::Update);
        self.apply_everywhere(record, &payload).await
    }

    async fn on_delete(&self, change: &Change) -> Result<Action, SyncError> {
        let record = Self::security_group(change)?;
        let payload = render::render_with_status(record, SyncStatus::Delete);
        self.apply_everywhere(record, &payload).await
    }
}

impl std::fmt::Debug for NorthPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NorthPropagator")
            .field("clusters", &self.clusters)
            .finish()
    }
}
