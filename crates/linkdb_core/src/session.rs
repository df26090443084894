//! Database sessions.

use crate::database::DatabaseShared;
use crate::document::{decode_document, Document};
use crate::error::{CoreError, CoreResult};
use crate::ridbag::RidBag;
use crate::tx::{self, RecordOp, Transaction};
use crate::types::{TransactionId, Version};
use linkdb_storage::{Rid, StorageError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A session against a database.
///
/// Each session runs at most one transaction at a time; saves and deletes
/// require an active transaction, buffer into its write-set, and are
/// visible to reads in the same session but to no other session until
/// commit. Conflicts with concurrent sessions are detected only at
/// commit, by version comparison.
pub struct DatabaseSession {
    shared: Arc<DatabaseShared>,
    tx: Option<Transaction>,
}

impl DatabaseSession {
    pub(crate) fn new(shared: Arc<DatabaseShared>) -> Self {
        Self { shared, tx: None }
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidOperation` if one is already active; transactions
    /// do not nest.
    pub fn begin(&mut self) -> CoreResult<()> {
        if self.tx.is_some() {
            return Err(CoreError::invalid_operation("transaction already active"));
        }
        let id = TransactionId::new(self.shared.next_txid.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(%id, "transaction begun");
        self.tx = Some(Transaction::new(id));
        Ok(())
    }

    /// Commits the active transaction.
    ///
    /// On any failure - stale version, unique violation - the whole
    /// transaction is reverted and the session returns to the inactive
    /// state; the store is left exactly as before the transaction.
    pub fn commit(&mut self) -> CoreResult<()> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::invalid_operation("no active transaction"))?;
        tx::commit(&mut tx, &self.shared)
    }

    /// Rolls back the active transaction, discarding the write-set and
    /// restoring every touched record to its pre-transaction state.
    pub fn rollback(&mut self) -> CoreResult<()> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::invalid_operation("no active transaction"))?;
        tx::rollback(&mut tx, &self.shared);
        Ok(())
    }

    /// Returns true if a transaction is active.
    #[must_use]
    pub fn is_transaction_active(&self) -> bool {
        self.tx.as_ref().is_some_and(Transaction::is_active)
    }

    /// Returns the active transaction's id.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.tx.as_ref().map(Transaction::id)
    }

    /// Saves a document into the active transaction.
    ///
    /// A transient document gets its rid allocated here, in its class's
    /// cluster (or the default cluster when it has no class). Validation
    /// and unique-key failures abort the whole transaction.
    pub fn save(&mut self, doc: &Document) -> CoreResult<()> {
        let cluster = match self.resolve_cluster(doc) {
            Ok(cluster) => cluster,
            Err(err) => return self.abort_on_constraint_failure(Err(err)),
        };
        self.save_in(doc, cluster, None)
    }

    /// Saves a document into a named cluster.
    pub fn save_to_cluster(&mut self, doc: &Document, cluster_name: &str) -> CoreResult<()> {
        let cluster = self.shared.storage.cluster_id(cluster_name).ok_or_else(|| {
            CoreError::Storage(StorageError::ClusterNotFound {
                name: cluster_name.to_string(),
            })
        })?;
        self.save_in(doc, cluster, None)
    }

    /// Saves a document, overriding the version compared at commit.
    ///
    /// This bypasses the optimistic check for this record for one save;
    /// it is an escape hatch, not a default.
    pub fn save_with_version(&mut self, doc: &Document, version: Version) -> CoreResult<()> {
        let cluster = match self.resolve_cluster(doc) {
            Ok(cluster) => cluster,
            Err(err) => return self.abort_on_constraint_failure(Err(err)),
        };
        self.save_in(doc, cluster, Some(version))
    }

    /// Deletes a document in the active transaction.
    pub fn delete(&mut self, doc: &Document) -> CoreResult<()> {
        let result = {
            let tx = self
                .tx
                .as_mut()
                .ok_or_else(|| CoreError::invalid_operation("no active transaction"))?;
            tx::delete_record(tx, &self.shared, doc)
        };
        self.abort_on_constraint_failure(result)
    }

    /// Loads a record by rid.
    ///
    /// Within an active transaction, buffered records are returned
    /// (read-your-writes) and buffered deletes read as missing.
    pub fn load(&self, rid: Rid) -> CoreResult<Document> {
        if let Some(tx) = &self.tx {
            if let Some(slot) = tx.touched_index_of(rid) {
                let record = &tx.records[slot];
                return match record.op {
                    RecordOp::Delete { .. } => Err(CoreError::record_not_found(rid)),
                    _ => Ok(record.document.clone()),
                };
            }
        }
        let stored = self
            .shared
            .storage
            .read(rid)?
            .ok_or_else(|| CoreError::record_not_found(rid))?;
        decode_document(
            &stored.payload,
            rid,
            Version::new(stored.version),
            self.shared.storage.as_ref(),
            &self.shared.config,
        )
    }

    /// Returns true if a record exists under the rid, honoring buffered
    /// operations.
    #[must_use]
    pub fn exists(&self, rid: Rid) -> bool {
        if let Some(tx) = &self.tx {
            if let Some(slot) = tx.touched_index_of(rid) {
                return !matches!(tx.records[slot].op, RecordOp::Delete { .. });
            }
        }
        self.shared.storage.contains(rid)
    }

    /// Re-reads a record into this session.
    ///
    /// The returned document is a fresh handle with fresh collection
    /// wrappers bound to this session's transaction state; no mutable
    /// state is shared with the handle passed in.
    pub fn bind_to_session(&self, doc: &Document) -> CoreResult<Document> {
        self.load(doc.rid())
    }

    /// Creates a link bag with this database's thresholds.
    #[must_use]
    pub fn new_ridbag(&self) -> RidBag {
        RidBag::with_config(&self.shared.config)
    }

    fn save_in(
        &mut self,
        doc: &Document,
        cluster: i32,
        version_override: Option<Version>,
    ) -> CoreResult<()> {
        let result = {
            let tx = self
                .tx
                .as_mut()
                .ok_or_else(|| CoreError::invalid_operation("no active transaction"))?;
            tx::save_record(tx, &self.shared, doc, cluster, version_override)
        };
        self.abort_on_constraint_failure(result)
    }

    /// Validation and unique-key failures abort the enclosing transaction.
    fn abort_on_constraint_failure(&mut self, result: CoreResult<()>) -> CoreResult<()> {
        if let Err(err) = result {
            if matches!(
                err,
                CoreError::Validation { .. } | CoreError::DuplicateKey { .. }
            ) {
                if let Some(mut tx) = self.tx.take() {
                    tx::rollback(&mut tx, &self.shared);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn resolve_cluster(&self, doc: &Document) -> CoreResult<i32> {
        let rid = doc.rid();
        if rid.is_persistent() {
            return Ok(rid.cluster());
        }
        match doc.class_name() {
            Some(class) => self
                .shared
                .classes
                .read()
                .get(&class)
                .and_then(|descriptor| descriptor.cluster_ids.first().copied())
                .ok_or_else(|| CoreError::validation(format!("unknown class '{class}'"))),
            None => Ok(self.shared.default_cluster),
        }
    }
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("transaction", &self.transaction_id())
            .finish()
    }
}
