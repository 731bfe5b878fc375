//! Event channel between a watch pump and one consumer.
//!
//! Three paths reach the consumer independently:
//! - a bounded queue of decoded [`Change`]s
//! - an error path for failures that break the data path
//! - a close path requesting graceful shutdown
//!
//! Keeping them apart lets the consumer tell "no more data" from "data path
//! broken".

use std::sync::Arc;

use duplex_core::{Attributes, Decoder, Object, SharedRegistry};
use duplex_storage::EventType;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// A decoded change ready for a handler.
#[derive(Debug, Clone)]
pub struct Change {
    pub event_type: EventType,
    pub object: Object,
    /// `store` for the authoritative store, otherwise the cluster name.
    pub source: Arc<str>,
}

/// What the consumer observed.
#[derive(Debug)]
pub enum ChannelMessage {
    Change(Change),
    Failed(SyncError),
    Closed,
}

/// Producer half. Decodes with the decoder bound at construction.
#[derive(Clone)]
pub struct ChangeSender {
    kind: String,
    decoder: Decoder,
    source: Arc<str>,
    data: mpsc::Sender<Change>,
    errors: mpsc::UnboundedSender<SyncError>,
    close: CancellationToken,
}

/// Consumer half.
pub struct ChangeReceiver {
    data: mpsc::Receiver<Change>,
    errors: mpsc::UnboundedReceiver<SyncError>,
    close: CancellationToken,
}

/// Builds channels bound to one kind's decoder.
pub struct EventChannel;

impl EventChannel {
    /// Opens a channel for `kind` fed from `source`.
    ///
    /// A capacity of zero is raised to one so the first delivery never blocks.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NoDecoder` if `kind` is not registered.
    pub fn bind(
        registry: &SharedRegistry,
        kind: &str,
        source: impl Into<Arc<str>>,
        capacity: usize,
    ) -> Result<(ChangeSender, ChangeReceiver), SyncError> {
        let decoder = registry
            .lookup(kind)
            .ok_or_else(|| SyncError::NoDecoder(kind.to_string()))?;
        let (data_tx, data_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let close = CancellationToken::new();

        let sender = ChangeSender {
            kind: kind.to_string(),
            decoder,
            source: source.into(),
            data: data_tx,
            errors: error_tx,
            close: close.clone(),
        };
        let receiver = ChangeReceiver {
            data: data_rx,
            errors: error_rx,
            close,
        };
        Ok((sender, receiver))
    }
}

impl ChangeSender {
    /// Decodes `attributes` and enqueues the change.
    ///
    /// # Errors
    ///
    /// Returns the decode failure to the caller, who decides whether to skip
    /// the event or report it through [`ChangeSender::fail`]. Returns
    /// `SyncError::Channel` if the receiver is gone.
    pub async fn handle(
        &self,
        event_type: EventType,
        attributes: &Attributes,
    ) -> Result<(), SyncError> {
        let object = (self.decoder)(attributes)?;
        let change = Change {
            event_type,
            object,
            source: self.source.clone(),
        };
        self.data
            .send(change)
            .await
            .map_err(|_| SyncError::channel(format!("{} receiver dropped", self.source)))
    }

    /// Reports a failure that breaks the data path.
    pub fn fail(&self, error: SyncError) {
        // A dropped receiver has nobody left to tell.
        let _ = self.errors.send(error);
    }

    /// Requests graceful shutdown. Queued changes are still delivered.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for ChangeSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSender")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("closed", &self.close.is_cancelled())
            .finish_non_exhaustive()
    }
}

enum Woken {
    Data(Option<Change>),
    Error(SyncError),
    Close,
}

impl ChangeReceiver {
    /// Waits for the next message.
    ///
    /// Errors take priority over data. After a close request, queued changes
    /// are drained before `Closed` is reported.
    pub async fn recv(&mut self) -> ChannelMessage {
        if let Ok(error) = self.errors.try_recv() {
            return ChannelMessage::Failed(error);
        }

        let woken = tokio::select! {
            biased;
            change = self.data.recv() => Woken::Data(change),
            Some(error) = self.errors.recv() => Woken::Error(error),
            _ = self.close.cancelled() => Woken::Close,
        };

        match woken {
            Woken::Data(Some(change)) => ChannelMessage::Change(change),
            Woken::Error(error) => ChannelMessage::Failed(error),
            Woken::Data(None) => match self.errors.try_recv() {
                Ok(error) => ChannelMessage::Failed(error),
                Err(_) => ChannelMessage::Closed,
            },
            Woken::Close => match self.data.try_recv() {
                Ok(change) => ChannelMessage::Change(change),
                Err(_) => ChannelMessage::Closed,
            },
        }
    }

    /// Token that closes this channel when cancelled.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }
}

impl std::fmt::Debug for ChangeReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeReceiver")
            .field("closed", &self.close.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::KindRegistry;
    use serde_json::{Value, json};

    fn registry() -> SharedRegistry {
        Arc::new(KindRegistry::with_builtin_kinds())
    }

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }

    fn sg_attrs(name: &str) -> Attributes {
        attrs(json!({
            "metadata": {"database": "db", "workspace": "ws", "name": name},
            "spec": {"status": "INIT"}
        }))
    }

    #[test]
    fn test_bind_unknown_kind() {
        let err = EventChannel::bind(&registry(), "Tenant", "store", 1).unwrap_err();
        assert!(matches!(err, SyncError::NoDecoder(kind) if kind == "Tenant"));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (tx, mut rx) = EventChannel::bind(&registry(), "SecurityGroup", "store", 0).unwrap();
        tx.handle(EventType::Added, &sg_attrs("sg-1")).await.unwrap();
        match rx.recv().await {
            ChannelMessage::Change(change) => {
                assert_eq!(change.object.name(), "sg-1");
                assert_eq!(&*change.source, "store");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_failure_returned_to_caller() {
        let (tx, _rx) = EventChannel::bind(&registry(), "SecurityGroup", "store", 1).unwrap();
        let err = tx
            .handle(EventType::Added, &attrs(json!({"metadata": {"name": "sg-1"}})))
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_close_drains_before_closed() {
        let (tx, mut rx) = EventChannel::bind(&registry(), "SecurityGroup", "store", 4).unwrap();
        tx.handle(EventType::Added, &sg_attrs("sg-1")).await.unwrap();
        tx.handle(EventType::Added, &sg_attrs("sg-2")).await.unwrap();
        tx.close();

        assert!(matches!(rx.recv().await, ChannelMessage::Change(_)));
        assert!(matches!(rx.recv().await, ChannelMessage::Change(_)));
        assert!(matches!(rx.recv().await, ChannelMessage::Closed));
    }

    #[tokio::test]
    async fn test_error_path_is_separate() {
        let (tx, mut rx) = EventChannel::bind(&registry(), "SecurityGroup", "east", 4).unwrap();
        tx.fail(SyncError::channel("watch ended"));
        assert!(matches!(rx.recv().await, ChannelMessage::Failed(_)));
    }

    #[tokio::test]
    async fn test_dropped_sender_closes() {
        let (tx, mut rx) = EventChannel::bind(&registry(), "SecurityGroup", "east", 4).unwrap();
        drop(tx);
        assert!(matches!(rx.recv().await, ChannelMessage::Closed));
    }
}
