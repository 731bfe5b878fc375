//! Error type for the reconciliation handlers and their plumbing.

use duplex_core::DecodeError;
use duplex_storage::StorageError;

/// Errors raised while moving a change between the store and a cluster.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The event's attributes could not be decoded into a typed record.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The authoritative store rejected or failed the call.
    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    /// A call against an external cluster failed.
    #[error("Cluster {cluster} call failed: {source}")]
    External {
        cluster: String,
        #[source]
        source: StorageError,
    },

    /// No decoder is registered for the kind a channel was bound to.
    #[error("No decoder registered for kind: {0}")]
    NoDecoder(String),

    /// A handler received a record of a kind it does not handle.
    #[error("Unexpected record kind: expected {expected}, found {found}")]
    UnexpectedKind { expected: String, found: String },

    /// The consumer side of a channel is gone.
    #[error("Channel closed: {0}")]
    Channel(String),

    /// Cancelled before completing.
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create an external call error for `cluster`.
    pub fn external(cluster: impl Into<String>, source: StorageError) -> Self {
        SyncError::External {
            cluster: cluster.into(),
            source,
        }
    }

    /// Create a channel error from a string.
    pub fn channel(msg: impl Into<String>) -> Self {
        SyncError::Channel(msg.into())
    }

    /// Create an unexpected kind error.
    pub fn unexpected_kind(expected: impl Into<String>, found: impl Into<String>) -> Self {
        SyncError::UnexpectedKind {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Returns `true` if a non-forced store apply was rejected.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_conflict())
    }

    /// Returns `true` if the addressed record or object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Store(e) | SyncError::External { source: e, .. } => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` for decode failures, which are terminal for the event.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            SyncError::Decode(_) | SyncError::Store(StorageError::Decode(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let err = SyncError::from(StorageError::deleted("db/SecurityGroup/ws/sg-1"));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());

        let err = SyncError::external("east", StorageError::not_found("object", "ns/sg-1"));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = SyncError::from(DecodeError::missing_field("spec.status"));
        assert!(err.is_decode());
    }

    #[test]
    fn test_external_display() {
        let err = SyncError::external("east", StorageError::connection_error("refused"));
        assert_eq!(
            err.to_string(),
            "Cluster east call failed: Connection error: refused"
        );
    }
}
