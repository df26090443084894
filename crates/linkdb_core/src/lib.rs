//! # LinkDB Core
//!
//! Embedded, transactional record store underlying a multi-model database.
//!
//! This crate provides:
//! - A dynamic document model with dirty-state and change-timeline tracking
//! - [`RidBag`], an adaptive multiset of record links
//! - Secondary indexes kept consistent with record mutations
//! - Session-scoped transactions with optimistic, version-based conflict
//!   detection and total rollback
//!
//! The storage substrate behind it lives in `linkdb_storage`; the query
//! language, wire protocols, serialization codecs and the schema layer are
//! external collaborators.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod document;
mod error;
mod index;
mod ridbag;
mod session;
mod tx;
mod types;

pub use config::Config;
pub use database::{ClassDescriptor, Database};
pub use document::{
    ChangeEvent, ChangeKind, ChangeTimeline, Document, EventKey, FieldType, TrackedList,
    TrackedMap, TrackedSet, Value,
};
pub use error::{CoreError, CoreResult};
pub use index::{
    Index, IndexBy, IndexDefinition, IndexKey, IndexManager, IndexType, KeyPart, KeyStream,
    ProgressListener, PropertyDefinition, RidStream,
};
pub use ridbag::{RidBag, RidBagIter};
pub use session::DatabaseSession;
pub use tx::{Transaction, TransactionState};
pub use types::{TransactionId, Version};

pub use linkdb_storage::{
    MemoryStorage, RecordStorage, Rid, StorageError, StorageResult, TreeHandle, VersionedRecord,
};
