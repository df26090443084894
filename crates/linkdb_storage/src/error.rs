//! Error types for the storage substrate.

use crate::rid::Rid;
use crate::tree::TreeHandle;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the storage substrate.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record is stored under the given rid.
    #[error("record not found: {rid}")]
    RecordNotFound {
        /// The rid that was looked up.
        rid: Rid,
    },

    /// A record already exists under the given rid.
    #[error("record already exists: {rid}")]
    RecordExists {
        /// The rid that collided.
        rid: Rid,
    },

    /// No cluster is registered under the given name.
    #[error("cluster not found: {name}")]
    ClusterNotFound {
        /// Name of the cluster.
        name: String,
    },

    /// No cluster is registered under the given id.
    #[error("cluster id not found: {id}")]
    ClusterIdNotFound {
        /// Id of the cluster.
        id: i32,
    },

    /// A cluster with the given name already exists.
    #[error("cluster already exists: {name}")]
    ClusterExists {
        /// Name of the cluster.
        name: String,
    },

    /// No tree collection exists under the given handle.
    #[error("tree collection not found: {handle}")]
    TreeNotFound {
        /// The handle that was looked up.
        handle: TreeHandle,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::RecordNotFound {
            rid: Rid::new(1, 2),
        };
        assert_eq!(format!("{err}"), "record not found: #1:2");

        let err = StorageError::ClusterNotFound {
            name: "person".to_string(),
        };
        assert_eq!(format!("{err}"), "cluster not found: person");
    }
}
