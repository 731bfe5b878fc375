//! Types exchanged through the store and cluster contracts.

use std::collections::HashMap;
use std::fmt;

use duplex_core::{Attributes, Metadata};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Type of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// Record or object appeared.
    Added,
    /// Record or object changed.
    Modified,
    /// Store: record tombstoned. Cluster: object removed.
    Deleted,
    /// Store only: record purged.
    Removed,
}

impl EventType {
    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change observed on a watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Type of change.
    pub event_type: EventType,
    /// Kind of the record or object.
    pub kind: String,
    /// Store attributes or external payload, depending on the source.
    pub object: Value,
}

impl WatchEvent {
    /// Create a new watch event.
    pub fn new(event_type: EventType, kind: impl Into<String>, object: Value) -> Self {
        Self {
            event_type,
            kind: kind.into(),
            object,
        }
    }

    /// Borrow the payload as an attribute map, if it is an object.
    pub fn attributes(&self) -> Option<&Attributes> {
        self.object.as_object()
    }
}

/// Long-lived stream of watch events. Ends when the source closes.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, StorageError>>;

/// Equality selector over record labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    /// Every entry must match exactly.
    pub match_labels: HashMap<String, String>,
}

impl LabelSelector {
    /// Selector that matches everything.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Adds a required label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the metadata carries every required label.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| metadata.label(key) == Some(value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::Added.to_string(), "ADDED");
        assert_eq!(serde_json::to_value(EventType::Removed).unwrap(), json!("REMOVED"));
    }

    #[test]
    fn test_label_selector() {
        let meta = duplex_core::Metadata::new("db", "SecurityGroup", "ws", "sg")
            .with_label("workspace", "ws")
            .with_label("cluster", "east");
        assert!(LabelSelector::everything().matches(&meta));
        assert!(LabelSelector::everything().with_label("cluster", "east").matches(&meta));
        assert!(!LabelSelector::everything().with_label("cluster", "west").matches(&meta));
    }

    #[test]
    fn test_watch_event_attributes() {
        let event = WatchEvent::new(EventType::Added, "SecurityGroup", json!({"metadata": {}}));
        assert!(event.attributes().is_some());
        let event = WatchEvent::new(EventType::Added, "SecurityGroup", json!(null));
        assert!(event.attributes().is_none());
    }
}
