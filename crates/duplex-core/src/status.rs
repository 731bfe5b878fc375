//! Handshake status shared by the north and south directions.
//!
//! ```text
//!            user create                 external agent
//!   (store) ─────────────► INIT ──north──► (cluster) ──► active | ready | FAIL
//!                                                              │
//!   user edit ──► UPDATE ──north──► (cluster) ──agent──►───────┤
//!   user delete ─► DELETE ──north──► (cluster) ──agent──► object removed
//!                                                              │
//!                                  south ◄─────────────────────┘
//! ```
//!
//! `UPDATE` and `DELETE` are only ever written by the north side, so the south
//! side treats them as echoes. `INIT` seen on an external add is an object the
//! external agent has not acted on yet.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// Closed set of handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncStatus {
    /// Created in the store, not yet acted on externally.
    #[default]
    Init,
    /// User-requested change pending push.
    Update,
    /// User-requested removal pending teardown.
    Delete,
    /// External reconciliation failed.
    Fail,
    /// Terminal success reported by the external agent.
    Active,
    /// Terminal success reported by the external agent.
    Ready,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 6] = [
        SyncStatus::Init,
        SyncStatus::Update,
        SyncStatus::Delete,
        SyncStatus::Fail,
        SyncStatus::Active,
        SyncStatus::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Init => "INIT",
            SyncStatus::Update => "UPDATE",
            SyncStatus::Delete => "DELETE",
            SyncStatus::Fail => "FAIL",
            SyncStatus::Active => "active",
            SyncStatus::Ready => "ready",
        }
    }

    /// States written only by the north side.
    pub fn is_north_owned(&self) -> bool {
        matches!(self, SyncStatus::Update | SyncStatus::Delete)
    }

    /// Outcomes reported by the external side.
    pub fn is_external_outcome(&self) -> bool {
        matches!(self, SyncStatus::Fail | SyncStatus::Active | SyncStatus::Ready)
    }

    pub fn is_terminal_success(&self) -> bool {
        matches!(self, SyncStatus::Active | SyncStatus::Ready)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DecodeError::invalid_value("spec.status", format!("unknown status '{s}'")))
    }
}

impl Serialize for SyncStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SyncStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_state() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_free_text_rejected() {
        assert!("PENDING".parse::<SyncStatus>().is_err());
        assert!("init".parse::<SyncStatus>().is_err());
        assert!("".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_ownership_partition() {
        let north: Vec<_> = SyncStatus::ALL.into_iter().filter(|s| s.is_north_owned()).collect();
        assert_eq!(north, vec![SyncStatus::Update, SyncStatus::Delete]);
        assert!(!SyncStatus::Init.is_external_outcome());
        assert!(SyncStatus::Fail.is_external_outcome());
        assert!(!SyncStatus::Fail.is_terminal_success());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&SyncStatus::Init).unwrap(), "\"INIT\"");
        assert_eq!(serde_json::to_string(&SyncStatus::Active).unwrap(), "\"active\"");
        let parsed: SyncStatus = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(parsed, SyncStatus::Fail);
    }
}
