//! Error types shared by the store and cluster contracts.
//!
//! The same taxonomy covers the authoritative store and external clusters:
//! both are collaborators reached through an API that can miss, conflict or
//! fail.

use std::fmt;

use duplex_core::DecodeError;

/// Errors that can occur during store or cluster operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record or object was not found.
    #[error("Not found: {kind}/{name}")]
    NotFound {
        /// Kind of the missing record.
        kind: String,
        /// Address of the missing record.
        name: String,
    },

    /// A non-forced apply carried a stale version.
    #[error("Version conflict on {name}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Address of the record.
        name: String,
        /// The version the caller based its change on.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },

    /// A non-forced apply targeted a tombstoned record.
    #[error("Record is marked deleted: {name}")]
    Deleted {
        /// Address of the record.
        name: String,
    },

    /// Attempted to create something that already exists.
    #[error("Already exists: {kind}/{name}")]
    AlreadyExists {
        /// Kind of the existing record.
        kind: String,
        /// Address of the existing record.
        name: String,
    },

    /// The payload could not be interpreted.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },

    /// Attributes failed to decode into a typed record.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Failed to reach the backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::VersionConflict {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Creates a new `Deleted` error.
    #[must_use]
    pub fn deleted(name: impl Into<String>) -> Self {
        Self::Deleted { name: name.into() }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if a non-forced apply was rejected.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Deleted { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionConflict { .. } | Self::Deleted { .. } => ErrorCategory::Conflict,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidRecord { .. } | Self::Decode(_) => ErrorCategory::Validation,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Conflict (version, tombstone or existence).
    Conflict,
    /// Validation or decode error.
    Validation,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("SecurityGroup", "ws/sg-1");
        assert_eq!(err.to_string(), "Not found: SecurityGroup/ws/sg-1");

        let err = StorageError::version_conflict("ws/sg-1", 1, 2);
        assert_eq!(
            err.to_string(),
            "Version conflict on ws/sg-1: expected 1, found 2"
        );

        let err = StorageError::deleted("ws/sg-1");
        assert_eq!(err.to_string(), "Record is marked deleted: ws/sg-1");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("SecurityGroup", "a").is_not_found());
        assert!(StorageError::version_conflict("a", 1, 2).is_conflict());
        assert!(StorageError::deleted("a").is_conflict());
        assert!(!StorageError::already_exists("SecurityGroup", "a").is_conflict());
        assert!(StorageError::already_exists("SecurityGroup", "a").is_already_exists());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::deleted("a").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::from(DecodeError::missing_field("spec.status")).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::connection_error("refused").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }
}
