//! Handler trait shared by the north and south directions.
//!
//! Handlers are asynchronous and run in separate tokio tasks, one per change.
//! Errors are logged by the dispatcher and never stop other changes.

use std::fmt;

use async_trait::async_trait;
use duplex_storage::EventType;

use crate::channel::Change;
use crate::error::SyncError;

/// What a handler did with a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do; the reason is logged at debug level.
    Skipped(&'static str),
    /// Created on this many clusters.
    Created { clusters: usize },
    /// Applied on this many clusters, of which `changed` reported a mutation.
    Applied { clusters: usize, changed: usize },
    /// Inserted into the store as a first sighting.
    Inserted,
    /// Merged into the store.
    Merged { forced: bool },
    /// Removed from the store.
    Purged,
}

impl Action {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Action::Skipped(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Skipped(reason) => write!(f, "skipped ({reason})"),
            Action::Created { clusters } => write!(f, "created on {clusters} cluster(s)"),
            Action::Applied { clusters, changed } => {
                write!(f, "applied on {clusters} cluster(s), {changed} changed")
            }
            Action::Inserted => write!(f, "inserted"),
            Action::Merged { forced: true } => write!(f, "merged (forced)"),
            Action::Merged { forced: false } => write!(f, "merged"),
            Action::Purged => write!(f, "purged"),
        }
    }
}

/// Trait for one reconciliation direction.
///
/// # Example
///
/// ```ignore
/// struct AuditHandler;
///
/// #[async_trait]
/// impl ChangeHandler for AuditHandler {
///     fn name(&self) -> &str { "audit" }
///
///     async fn on_add(&self, change: &Change) -> Result<Action, SyncError> {
///         info!(name = change.object.name(), "added");
///         Ok(Action::Skipped("audit only"))
///     }
///     async fn on_update(&self, _: &Change) -> Result<Action, SyncError> { Ok(Action::Skipped("audit only")) }
///     async fn on_delete(&self, _: &Change) -> Result<Action, SyncError> { Ok(Action::Skipped("audit only")) }
/// }
/// ```
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Unique name for this handler (for logging).
    fn name(&self) -> &str;

    async fn on_add(&self, change: &Change) -> Result<Action, SyncError>;

    async fn on_update(&self, change: &Change) -> Result<Action, SyncError>;

    async fn on_delete(&self, change: &Change) -> Result<Action, SyncError>;

    /// Store purge events. Ignored unless overridden.
    async fn on_remove(&self, _change: &Change) -> Result<Action, SyncError> {
        Ok(Action::Skipped("purge is not propagated"))
    }

    /// Routes a change by event type.
    async fn handle(&self, change: &Change) -> Result<Action, SyncError> {
        match change.event_type {
            EventType::Added => self.on_add(change).await,
            EventType::Modified => self.on_update(change).await,
            EventType::Deleted => self.on_delete(change).await,
            EventType::Removed => self.on_remove(change).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Skipped("echo").to_string(), "skipped (echo)");
        assert_eq!(
            Action::Applied {
                clusters: 2,
                changed: 1
            }
            .to_string(),
            "applied on 2 cluster(s), 1 changed"
        );
        assert!(Action::Skipped("x").is_skipped());
        assert!(!Action::Purged.is_skipped());
    }
}
