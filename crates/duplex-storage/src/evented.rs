//! ChangeFeed - broadcast fan-out of watch events for backends.
//!
//! Backends publish a [`WatchEvent`] after each successful write; every
//! open watch holds its own receiver and filters by kind.
//!
//! # Example
//!
//! ```ignore
//! use duplex_storage::{ChangeFeed, EventType, WatchEvent};
//!
//! let feed = ChangeFeed::new();
//! let receiver = feed.subscribe();
//! let snapshot = load_existing_records();
//! let stream = ChangeFeed::into_stream(receiver, "SecurityGroup", snapshot);
//!
//! feed.publish(WatchEvent::new(EventType::Added, "SecurityGroup", attrs));
//! ```

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::types::{WatchEvent, WatchStream};

/// Default buffer size for the broadcast channel.
/// Watches that fall further behind lose the oldest events.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Broadcaster of watch events for one backend.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<WatchEvent>,
}

impl ChangeFeed {
    /// Create a new feed with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new feed with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every open watch.
    ///
    /// Returns the number of watches that received it.
    pub fn publish(&self, event: WatchEvent) -> usize {
        if self.sender.receiver_count() == 0 {
            return 0;
        }
        let event_type = event.event_type;
        let kind = event.kind.clone();
        let count = self.sender.send(event).unwrap_or_default();
        debug!(
            kind = %kind,
            event_type = %event_type,
            watchers = count,
            "Published watch event"
        );
        count
    }

    /// Subscribe before taking a snapshot so no write falls in between.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Get the number of open watches.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Turn a receiver into a kind-filtered watch stream, preceded by `replay`.
    ///
    /// A write racing the snapshot may be seen twice: once replayed and once
    /// live.
    pub fn into_stream(
        receiver: broadcast::Receiver<WatchEvent>,
        kind: impl Into<String>,
        replay: Vec<WatchEvent>,
    ) -> WatchStream {
        let kind = kind.into();
        let live = BroadcastStream::new(receiver).filter_map(move |item| {
            let kind = kind.clone();
            async move {
                match item {
                    Ok(event) if event.kind == kind => Some(Ok(event)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(kind = %kind, missed, "Watch lagged, missed events");
                        None
                    }
                }
            }
        });
        stream::iter(replay.into_iter().map(Ok)).chain(live).boxed()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use serde_json::json;

    #[test]
    fn test_publish_without_watchers() {
        let feed = ChangeFeed::new();
        let count = feed.publish(WatchEvent::new(EventType::Added, "SecurityGroup", json!({})));
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_stream_replays_then_filters_by_kind() {
        let feed = ChangeFeed::new();
        let receiver = feed.subscribe();
        let replay = vec![WatchEvent::new(EventType::Added, "SecurityGroup", json!({"n": 0}))];
        let mut stream = ChangeFeed::into_stream(receiver, "SecurityGroup", replay);

        feed.publish(WatchEvent::new(EventType::Added, "Cluster", json!({"n": 1})));
        feed.publish(WatchEvent::new(EventType::Modified, "SecurityGroup", json!({"n": 2})));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.object, json!({"n": 0}));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event_type, EventType::Modified);
        assert_eq!(second.object, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_stream_ends_when_feed_dropped() {
        let feed = ChangeFeed::new();
        let mut stream = ChangeFeed::into_stream(feed.subscribe(), "SecurityGroup", Vec::new());
        drop(feed);
        assert!(stream.next().await.is_none());
    }
}
