//! # LinkDB Storage
//!
//! Storage substrate for LinkDB.
//!
//! This crate provides:
//! - Record identity ([`Rid`]: cluster id + position)
//! - The [`RecordStorage`] trait: cluster registration, rid allocation,
//!   versioned record persistence, and tree-collection persistence
//! - [`MemoryStorage`], an in-memory implementation
//!
//! The substrate is deliberately dumb: payloads are opaque bytes, versions
//! are stored verbatim, and all transaction semantics live above it in
//! `linkdb_core`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod rid;
mod tree;

pub use backend::{RecordStorage, VersionedRecord};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use rid::{Rid, CLUSTER_INVALID, POSITION_INVALID};
pub use tree::TreeHandle;
