//! Error types for LinkDB core.

use crate::types::Version;
use linkdb_storage::Rid;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in LinkDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage substrate error.
    #[error("storage error: {0}")]
    Storage(#[from] linkdb_storage::StorageError),

    /// Malformed input: invalid field name, type mismatch, bad definition.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// A UNIQUE index already holds the key for a different record.
    #[error("duplicate key in index '{index}': {key}")]
    DuplicateKey {
        /// Name of the violated index.
        index: String,
        /// Display form of the duplicated key.
        key: String,
    },

    /// The stored version no longer matches the version observed at
    /// transaction checkout. Raised only at commit; aborts the whole
    /// transaction.
    #[error(
        "concurrent modification of {rid}: expected version {expected}, stored version {actual}"
    )]
    ConcurrentModification {
        /// The record that conflicted.
        rid: Rid,
        /// Version the transaction observed.
        expected: Version,
        /// Version currently stored.
        actual: Version,
    },

    /// Load of a deleted or nonexistent rid.
    #[error("record not found: {rid}")]
    RecordNotFound {
        /// The rid that was looked up.
        rid: Rid,
    },

    /// A tracked-collection view was invalidated by a field-type coercion
    /// or reassignment and can no longer be read or mutated.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// Description of the invalid access.
        message: String,
    },

    /// Operation not permitted in the current state (e.g. save outside an
    /// active transaction, commit of a finished transaction).
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Creates a concurrent modification error.
    #[must_use]
    pub fn concurrent_modification(rid: Rid, expected: Version, actual: Version) -> Self {
        Self::ConcurrentModification {
            rid,
            expected,
            actual,
        }
    }

    /// Creates a record not found error.
    #[must_use]
    pub fn record_not_found(rid: Rid) -> Self {
        Self::RecordNotFound { rid }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_modification_display() {
        let err = CoreError::concurrent_modification(
            Rid::new(2, 7),
            Version::new(3),
            Version::new(4),
        );
        assert_eq!(
            format!("{err}"),
            "concurrent modification of #2:7: expected version v:3, stored version v:4"
        );
    }

    #[test]
    fn helper_constructors() {
        assert!(matches!(
            CoreError::validation("bad name"),
            CoreError::Validation { .. }
        ));
        assert!(matches!(
            CoreError::duplicate_key("idx", "[a]"),
            CoreError::DuplicateKey { .. }
        ));
        assert!(matches!(
            CoreError::record_not_found(Rid::new(0, 0)),
            CoreError::RecordNotFound { .. }
        ));
    }
}
